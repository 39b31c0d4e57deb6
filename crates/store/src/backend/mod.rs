//! The backend client abstraction.
//!
//! The store talks to its OLAP backend through [`Backend`]: parameterized
//! mutations, parameterized queries returning self-describing rows, and
//! bulk array-inserts into a named table. Every call is one non-blocking
//! network round trip; the store never retries (retry policy belongs to the
//! host) and never relies on the backend's asynchronous background
//! deduplication for read correctness.

mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use sediment_query::SqlValue;
use sediment_types::Result;

pub use memory::{MemoryBackend, Statement, StatementKind, to_row};

/// One self-describing row: column name → JSON value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Placeholder name → bound value for one statement.
pub type Params = BTreeMap<String, SqlValue>;

/// A client for an append-only OLAP backend.
///
/// Implementations wrap a concrete driver (HTTP or native protocol). Errors
/// map to [`sediment_types::StoreError::Backend`] and propagate unchanged.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Submits a parameterized mutation statement (DDL or insert-select).
    async fn execute(&self, sql: &str, params: &Params) -> Result<()>;

    /// Submits a parameterized query and returns its rows.
    async fn query(&self, sql: &str, params: &Params) -> Result<Vec<Row>>;

    /// Bulk-inserts an array of rows into a named table.
    ///
    /// Durable as a set, but with no cross-row isolation against concurrent
    /// readers.
    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<()>;
}
