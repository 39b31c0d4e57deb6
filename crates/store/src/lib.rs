//! Versioned document store over an append-only OLAP backend.
//!
//! The backend offers inserts, parameterized queries, and asynchronous
//! background deduplication — no row updates, deletes, or transactions.
//! This crate reconciles that with ordinary document-store expectations
//! entirely on the read path:
//!
//! - [`documents`] — insert-as-update, soft-delete-as-insert, and the
//!   shared rank-and-filter read (max version per logical key, tombstones
//!   excluded, caller filter applied after ranking)
//! - [`relationships`] — the append-only edge index with reverse lookups
//!   and two-sided soft-delete propagation
//! - [`joins`] — paginated reverse-lookup resolution for parent batches
//! - [`txn`] — begin/commit/rollback emulated with staging-table markers
//! - [`backend`] — the minimal client trait plus a recording mock
//! - [`tables`] — physical layout for a ReplacingMergeTree-family target
//!
//! Everything hangs off [`SedimentStore`], the host-facing facade.

#![forbid(unsafe_code)]

use std::sync::Arc;

use sediment_types::{Result, StoreError};
use tracing::info;

pub mod backend;
pub mod documents;
pub mod joins;
pub mod relationships;
pub mod tables;
pub mod txn;

pub use backend::{Backend, MemoryBackend, Params, Row};
pub use documents::{DocumentInput, ListRange, merge_patch};
pub use joins::{CURRENT_VERSION_KEY, HISTORY_PARENT_FIELD, JoinPage, JoinSpec};
pub use relationships::{RelationField, ReverseRelation, SchemaProvider, StaticSchema};

/// Host-facing facade over the backend and the collection schema.
///
/// Cheap to clone; all state is shared. A store built without a backend
/// fails every operation fast with [`StoreError::NotConnected`] instead of
/// surfacing confusing transport errors later.
#[derive(Clone)]
pub struct SedimentStore {
    backend: Option<Arc<dyn Backend>>,
    schema: Arc<dyn SchemaProvider>,
}

impl SedimentStore {
    /// Creates a connected store.
    pub fn new(backend: Arc<dyn Backend>, schema: Arc<dyn SchemaProvider>) -> Self {
        Self { backend: Some(backend), schema }
    }

    /// Creates a store without a backend; every operation returns
    /// [`StoreError::NotConnected`]. Useful while the host wires startup
    /// ordering.
    pub fn disconnected(schema: Arc<dyn SchemaProvider>) -> Self {
        Self { backend: None, schema }
    }

    /// The backend, or a fail-fast error when none is attached.
    pub(crate) fn backend(&self) -> Result<&dyn Backend> {
        self.backend.as_deref().ok_or(StoreError::NotConnected)
    }

    pub(crate) fn schema(&self) -> &dyn SchemaProvider {
        self.schema.as_ref()
    }

    /// Creates the document, relationship, and staging tables when absent.
    pub async fn install_schema(&self) -> Result<()> {
        let backend = self.backend()?;
        let empty = Params::new();
        for ddl in [tables::documents_ddl(), tables::edges_ddl(), tables::staging_ddl()] {
            backend.execute(&ddl, &empty).await?;
        }
        info!("storage schema installed");
        Ok(())
    }

    /// Raw parameterized-query escape hatch.
    ///
    /// The caller owns the SQL; no ranking, liveness filtering, or
    /// identifier validation is applied.
    pub async fn raw_query(&self, sql: &str, params: &Params) -> Result<Vec<Row>> {
        self.backend()?.query(sql, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationships::StaticSchema;

    #[tokio::test]
    async fn test_install_schema_runs_all_ddl() {
        let backend = Arc::new(MemoryBackend::new());
        let store = SedimentStore::new(backend.clone(), Arc::new(StaticSchema::default()));
        store.install_schema().await.expect("install");

        let statements = backend.statements();
        assert_eq!(statements.len(), 3);
        assert!(statements.iter().all(|s| s.sql.starts_with("CREATE TABLE IF NOT EXISTS")));
    }

    #[tokio::test]
    async fn test_raw_query_passes_through() {
        let backend = Arc::new(MemoryBackend::new());
        let store = SedimentStore::new(backend.clone(), Arc::new(StaticSchema::default()));
        backend.enqueue(vec![]);

        let rows = store
            .raw_query("SELECT count() FROM documents", &Params::new())
            .await
            .expect("raw query");
        assert!(rows.is_empty());
        assert_eq!(backend.statements()[0].sql, "SELECT count() FROM documents");
    }

    #[tokio::test]
    async fn test_disconnected_raw_query_fails_fast() {
        let store = SedimentStore::disconnected(Arc::new(StaticSchema::default()));
        let err = store.raw_query("SELECT 1", &Params::new()).await.expect_err("no backend");
        assert!(matches!(err, StoreError::NotConnected));
    }
}
