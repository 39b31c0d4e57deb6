//! Core types, identifiers, and errors for the sediment document layer.
//!
//! This crate provides the foundational pieces shared by the query compiler
//! and the store:
//! - Version and id generation (monotonic versions, random ids, sortable ids)
//! - Row types for documents, relationship edges, and transaction records
//! - The error taxonomy (snafu)
//! - Identifier validation

#![forbid(unsafe_code)]

pub mod error;
pub mod ids;
pub mod types;
pub mod validation;

pub use error::{Result, StoreError};
pub use ids::{IdKind, next_id, next_sortable_id, next_version};
pub use types::{
    DocumentKey, DocumentRow, LogicalDocument, RelationshipEdge, TransactionRecord, TxnStatus,
};
pub use validation::validate_identifier;
