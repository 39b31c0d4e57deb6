//! Error taxonomy for the sediment document layer.
//!
//! Four families, deliberately small:
//! - [`StoreError::NotConnected`] — backend handle absent; operations fail
//!   fast instead of dereferencing a missing client
//! - [`StoreError::NotFound`] — point lookup addressed a key with no live row
//! - [`StoreError::InvalidArgument`] — malformed identifiers, rejected before
//!   any network call
//! - [`StoreError::Backend`] — backend/network errors, propagated unchanged;
//!   retry policy belongs to the host
//!
//! Malformed *filter* input is intentionally not represented here: the query
//! compiler degrades it to an always-true predicate instead of raising.

use snafu::{Location, Snafu};

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the sediment store.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// No backend client is attached to the store.
    #[snafu(display("no backend connection available"))]
    NotConnected,

    /// A point lookup found no live row for the key.
    #[snafu(display("no live document {collection}/{id}"))]
    NotFound {
        /// Collection the lookup addressed.
        collection: String,
        /// Logical document id.
        id: String,
    },

    /// An identifier failed eager validation.
    #[snafu(display("invalid {field}: {constraint}"))]
    InvalidArgument {
        /// The offending field (e.g. `namespace`, `collection`).
        field: String,
        /// Description of the violated constraint.
        constraint: String,
    },

    /// The backend reported an error (network, syntax, timeout).
    #[snafu(display("backend error at {location}: {message}"))]
    Backend {
        /// Error description from the backend client.
        message: String,
        /// Source location of the failed call.
        #[snafu(implicit)]
        location: Location,
    },
}

impl StoreError {
    /// True for errors a caller may reasonably handle by creating the
    /// document instead (the upsert fallback).
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
