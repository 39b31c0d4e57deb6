//! Versioned document operations: insert-as-write, rank-and-filter read.
//!
//! Every logical mutation appends a physical row; nothing is ever updated
//! or deleted in place. Read correctness comes entirely from the ranking
//! projection: partition rows by logical key, order by version descending,
//! keep rank 1, then apply liveness and caller filters. Caller filters are
//! applied strictly **after** ranking — filtering inside the partition scan
//! could wrongly exclude the true current row via a superseded older row
//! that happens to match.

use chrono::Utc;
use sediment_query::{Compiler, Filter, SqlValue, combine_where};
use sediment_types::error::BackendSnafu;
use sediment_types::{
    DocumentRow, IdKind, LogicalDocument, Result, StoreError, next_id, next_version,
    validate_identifier,
};
use serde_json::Value;
use tracing::debug;

use crate::SedimentStore;
use crate::backend::{Row, to_row};
use crate::tables::{DOCUMENTS_TABLE, STAGING_TABLE};

/// Column list for document selects, kept explicit so the ranking column
/// never leaks into results.
pub(crate) const DOC_COLUMNS: &str = "namespace, collection, id, version, title, payload, \
     created_at, updated_at, deleted_at, created_by, updated_by";

/// Caller input for create/update: a partial document.
#[derive(Debug, Clone, Default)]
pub struct DocumentInput {
    /// Explicit id; allocated when absent (create only).
    pub id: Option<String>,
    /// Display title.
    pub title: Option<String>,
    /// Payload (partial on update; merged recursively).
    pub payload: Value,
    /// Actor reference recorded on the written row.
    pub actor: Option<String>,
}

/// Pagination for list reads. `limit == 0` means no limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListRange {
    /// Maximum rows to return; 0 = all.
    pub limit: usize,
    /// Rows to skip.
    pub offset: usize,
}

/// Recursively merges a partial payload into an existing one.
///
/// Object fields merge key-by-key; every non-object value (including
/// arrays and explicit nulls) overwrites.
#[must_use]
pub fn merge_patch(existing: &Value, patch: &Value) -> Value {
    match (existing, patch) {
        (Value::Object(base), Value::Object(overlay)) => {
            let mut merged = base.clone();
            for (key, value) in overlay {
                let prior = merged.get(key).cloned().unwrap_or(Value::Null);
                merged.insert(key.clone(), merge_patch(&prior, value));
            }
            Value::Object(merged)
        }
        (_, replacement) => replacement.clone(),
    }
}

/// Deserializes a backend row into a [`DocumentRow`].
pub(crate) fn document_from_row(row: Row) -> Result<DocumentRow> {
    serde_json::from_value(Value::Object(row))
        .map_err(|e| BackendSnafu { message: format!("malformed document row: {e}") }.build())
}

impl SedimentStore {
    /// Creates a document: allocates id and version, inserts one row.
    ///
    /// Inside a transaction the row lands in the staging table instead; the
    /// relationship index is updated when the transaction commits.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidArgument`] for malformed identifiers,
    /// [`StoreError::NotConnected`] without a backend, and backend errors
    /// unchanged.
    pub async fn create(
        &self,
        namespace: &str,
        collection: &str,
        input: DocumentInput,
        txn: Option<&str>,
    ) -> Result<LogicalDocument> {
        validate_identifier(namespace, "namespace")?;
        validate_identifier(collection, "collection")?;

        let now = Utc::now();
        let row = DocumentRow {
            namespace: namespace.to_string(),
            collection: collection.to_string(),
            id: input.id.unwrap_or_else(|| next_id(IdKind::Short)),
            version: next_version(),
            title: input.title,
            payload: input.payload,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            created_by: input.actor.clone(),
            updated_by: input.actor,
        };
        debug!(key = %row.key(), version = row.version, "creating document");
        self.write_document_row(&row, txn).await?;
        Ok(row.into())
    }

    /// Point lookup of the current live document.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the key has no live row.
    pub async fn read_one(
        &self,
        namespace: &str,
        collection: &str,
        id: &str,
        filter: Option<&Value>,
    ) -> Result<LogicalDocument> {
        self.try_read_one(namespace, collection, id, filter)
            .await?
            .map(LogicalDocument::from)
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })
    }

    /// List read over the current live documents matching an optional
    /// caller filter.
    pub async fn read_many(
        &self,
        namespace: &str,
        collection: &str,
        filter: Option<&Value>,
        range: ListRange,
    ) -> Result<Vec<LogicalDocument>> {
        validate_identifier(namespace, "namespace")?;
        validate_identifier(collection, "collection")?;
        let rows = self.ranked_read(namespace, collection, None, filter, Some(range)).await?;
        rows.into_iter()
            .map(|row| document_from_row(row).map(LogicalDocument::from))
            .collect()
    }

    /// Updates a document by merging a partial payload into the current
    /// live payload and appending a fresh-version row.
    ///
    /// With `upsert`, a missing document falls back to create (keeping the
    /// addressed id).
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when no live row matches and `upsert` is
    /// false.
    pub async fn update(
        &self,
        namespace: &str,
        collection: &str,
        id: &str,
        patch: DocumentInput,
        filter: Option<&Value>,
        upsert: bool,
        txn: Option<&str>,
    ) -> Result<LogicalDocument> {
        validate_identifier(namespace, "namespace")?;
        validate_identifier(collection, "collection")?;

        let Some(current) = self.try_read_one(namespace, collection, id, filter).await? else {
            if upsert {
                let input = DocumentInput { id: Some(id.to_string()), ..patch };
                return self.create(namespace, collection, input, txn).await;
            }
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        };

        let now = Utc::now();
        let row = DocumentRow {
            namespace: namespace.to_string(),
            collection: collection.to_string(),
            id: id.to_string(),
            version: next_version(),
            title: patch.title.or(current.title),
            payload: merge_patch(&current.payload, &patch.payload),
            created_at: current.created_at,
            updated_at: now,
            deleted_at: None,
            created_by: current.created_by,
            updated_by: patch.actor,
        };
        debug!(key = %row.key(), version = row.version, "updating document");
        match txn {
            Some(txn_id) => self.stage_row(&row, txn_id).await?,
            None => {
                self.insert_rows(DOCUMENTS_TABLE, std::slice::from_ref(&row)).await?;
                // An update can drop or retarget references; plain edge
                // appends would leave the stale ones live.
                self.reconcile_edges(&row).await?;
            }
        }
        Ok(row.into())
    }

    /// Soft-deletes a document by appending a tombstone row.
    ///
    /// The tombstone's version is `max(next_version(), prev + 1)`, so it
    /// always outranks the prior live row even when the wall-clock
    /// generator would tie or regress (the create-then-delete race).
    /// A missing or empty id is a silent no-op.
    pub async fn soft_delete(
        &self,
        namespace: &str,
        collection: &str,
        id: &str,
        filter: Option<&Value>,
        txn: Option<&str>,
    ) -> Result<()> {
        validate_identifier(namespace, "namespace")?;
        validate_identifier(collection, "collection")?;
        if id.is_empty() {
            return Ok(());
        }

        let Some(current) = self.try_read_one(namespace, collection, id, filter).await? else {
            debug!(namespace, collection, id, "soft-delete of missing document is a no-op");
            return Ok(());
        };

        let version = next_version().max(current.version + 1);
        let row = DocumentRow {
            namespace: namespace.to_string(),
            collection: collection.to_string(),
            id: id.to_string(),
            version,
            title: current.title,
            payload: current.payload,
            created_at: current.created_at,
            updated_at: Utc::now(),
            deleted_at: Some(version),
            created_by: current.created_by,
            updated_by: None,
        };
        debug!(key = %row.key(), version, "soft-deleting document");

        if let Some(txn_id) = txn {
            self.stage_row(&row, txn_id).await
        } else {
            self.insert_rows(DOCUMENTS_TABLE, std::slice::from_ref(&row)).await?;
            self.propagate_edge_tombstones(namespace, collection, id).await
        }
    }

    /// Appends documents without a prior read.
    ///
    /// One array-insert call for the rows (plus one for their relationship
    /// edges when any exist); reconciliation happens entirely on the
    /// ranking read path. Returns the number of documents written.
    pub async fn append_many(
        &self,
        namespace: &str,
        collection: &str,
        inputs: Vec<DocumentInput>,
    ) -> Result<usize> {
        validate_identifier(namespace, "namespace")?;
        validate_identifier(collection, "collection")?;
        if inputs.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let rows: Vec<DocumentRow> = inputs
            .into_iter()
            .map(|input| DocumentRow {
                namespace: namespace.to_string(),
                collection: collection.to_string(),
                id: input.id.unwrap_or_else(|| next_id(IdKind::Short)),
                version: next_version(),
                title: input.title,
                payload: input.payload,
                created_at: now,
                updated_at: now,
                deleted_at: None,
                created_by: input.actor.clone(),
                updated_by: input.actor,
            })
            .collect();

        debug!(namespace, collection, count = rows.len(), "bulk append");
        self.insert_rows(DOCUMENTS_TABLE, &rows).await?;
        self.record_edges_bulk(&rows).await?;
        Ok(rows.len())
    }

    /// Point read returning `None` instead of an error for a missing row.
    pub(crate) async fn try_read_one(
        &self,
        namespace: &str,
        collection: &str,
        id: &str,
        filter: Option<&Value>,
    ) -> Result<Option<DocumentRow>> {
        validate_identifier(namespace, "namespace")?;
        validate_identifier(collection, "collection")?;
        let rows = self.ranked_read(namespace, collection, Some(id), filter, None).await?;
        rows.into_iter().next().map(document_from_row).transpose()
    }

    /// Executes the rank-and-filter read over the document table.
    async fn ranked_read(
        &self,
        namespace: &str,
        collection: &str,
        id: Option<&str>,
        filter: Option<&Value>,
        range: Option<ListRange>,
    ) -> Result<Vec<Row>> {
        let backend = self.backend()?;
        let mut compiler = Compiler::new();

        let ns_ph = compiler.bind(SqlValue::Text(namespace.to_string()));
        let col_ph = compiler.bind(SqlValue::Text(collection.to_string()));
        let mut scope = format!("namespace = {ns_ph} AND collection = {col_ph}");
        if let Some(id) = id {
            let id_ph = compiler.bind(SqlValue::Text(id.to_string()));
            scope.push_str(&format!(" AND id = {id_ph}"));
        }

        // The caller filter joins the *outer* WHERE only: it must see the
        // ranked winner, never pre-filter the partition scan.
        let caller_sql = match filter {
            Some(raw) => compiler.predicate(&Filter::from_json(raw)),
            None => String::new(),
        };
        let outer = combine_where("_rank = 1 AND deleted_at IS NULL", &caller_sql);

        let mut sql = format!(
            "SELECT {DOC_COLUMNS} FROM (\
             SELECT {DOC_COLUMNS}, row_number() OVER (\
             PARTITION BY namespace, collection, id ORDER BY version DESC\
             ) AS _rank FROM {DOCUMENTS_TABLE} WHERE {scope}\
             ) WHERE {outer} ORDER BY id"
        );
        if let Some(range) = range {
            if range.limit > 0 {
                let limit_ph = compiler.bind(SqlValue::Int(range.limit as i64));
                sql.push_str(&format!(" LIMIT {limit_ph}"));
            }
            if range.offset > 0 {
                let offset_ph = compiler.bind(SqlValue::Int(range.offset as i64));
                sql.push_str(&format!(" OFFSET {offset_ph}"));
            }
        }

        backend.query(&sql, &compiler.finish()).await
    }

    /// Routes a document row to the main table or the staging table.
    pub(crate) async fn write_document_row(
        &self,
        row: &DocumentRow,
        txn: Option<&str>,
    ) -> Result<()> {
        match txn {
            Some(txn_id) => self.stage_row(row, txn_id).await,
            None => {
                self.insert_rows(DOCUMENTS_TABLE, std::slice::from_ref(row)).await?;
                self.record_edges(row).await
            }
        }
    }

    /// Appends a staged copy of a document row, tagged with the
    /// transaction id.
    async fn stage_row(&self, row: &DocumentRow, txn_id: &str) -> Result<()> {
        let Some(mut staged) = to_row(row) else {
            return Err(BackendSnafu { message: "unserializable row".to_string() }.build());
        };
        staged.insert("txn_id".to_string(), Value::String(txn_id.to_string()));
        debug!(key = %row.key(), txn_id, "staging document write");
        self.backend()?.insert(STAGING_TABLE, vec![staged]).await
    }

    /// Bulk-inserts serialized rows into a table.
    pub(crate) async fn insert_rows<T: serde::Serialize>(
        &self,
        table: &str,
        rows: &[T],
    ) -> Result<()> {
        let backend = self.backend()?;
        let serialized: Vec<Row> = rows.iter().filter_map(to_row).collect();
        backend.insert(table, serialized).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use sediment_types::RelationshipEdge;

    use super::*;
    use crate::backend::{MemoryBackend, StatementKind};
    use crate::relationships::{RelationField, StaticSchema};
    use crate::tables::EDGES_TABLE;

    fn store_with_backend() -> (SedimentStore, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let store =
            SedimentStore::new(backend.clone(), Arc::new(StaticSchema::default()));
        (store, backend)
    }

    fn store_with_author_relation() -> (SedimentStore, Arc<MemoryBackend>) {
        let schema = StaticSchema::default().with_relation(
            "articles",
            RelationField { field: "author".into(), targets: vec!["people".into()], many: false },
        );
        let backend = Arc::new(MemoryBackend::new());
        let store = SedimentStore::new(backend.clone(), Arc::new(schema));
        (store, backend)
    }

    fn live_row(namespace: &str, collection: &str, id: &str, version: i64) -> DocumentRow {
        DocumentRow {
            namespace: namespace.into(),
            collection: collection.into(),
            id: id.into(),
            version,
            title: None,
            payload: json!({"status": "draft", "meta": {"views": 1}}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
            created_by: None,
            updated_by: None,
        }
    }

    #[tokio::test]
    async fn test_create_inserts_live_row() {
        let (store, backend) = store_with_backend();
        let doc = store
            .create(
                "main",
                "articles",
                DocumentInput { payload: json!({"a": 1}), ..Default::default() },
                None,
            )
            .await
            .expect("create");

        assert!(!doc.id.is_empty(), "id should be allocated");
        let rows = backend.table_rows(DOCUMENTS_TABLE);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["deleted_at"], Value::Null);
        assert_eq!(rows[0]["payload"], json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_create_inside_txn_goes_to_staging() {
        let (store, backend) = store_with_backend();
        store
            .create(
                "main",
                "articles",
                DocumentInput { payload: json!({"a": 1}), ..Default::default() },
                Some("tx-1"),
            )
            .await
            .expect("create");

        assert!(backend.table_rows(DOCUMENTS_TABLE).is_empty());
        let staged = backend.table_rows(STAGING_TABLE);
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0]["txn_id"], json!("tx-1"));
    }

    #[tokio::test]
    async fn test_update_merges_payload_recursively() {
        let (store, backend) = store_with_backend();
        backend.enqueue_rows(&[live_row("main", "articles", "a1", 100 << 10)]);

        let doc = store
            .update(
                "main",
                "articles",
                "a1",
                DocumentInput { payload: json!({"meta": {"likes": 2}}), ..Default::default() },
                None,
                false,
                None,
            )
            .await
            .expect("update");

        assert_eq!(
            doc.payload,
            json!({"status": "draft", "meta": {"views": 1, "likes": 2}}),
        );
        assert!(doc.version > 100 << 10, "fresh version must outrank");
        assert_eq!(backend.table_rows(DOCUMENTS_TABLE).len(), 1);
    }

    #[tokio::test]
    async fn test_update_chain_keeps_one_logical_row() {
        let (store, backend) = store_with_backend();
        let created = store
            .create(
                "main",
                "articles",
                DocumentInput { payload: json!({"a": 1}), ..Default::default() },
                None,
            )
            .await
            .expect("create");

        // Each update sees the row the previous write produced, as the
        // ranking read would surface it.
        let mut current = backend.table_rows(DOCUMENTS_TABLE)[0].clone();
        for (patch, expected) in [
            (json!({"b": 2}), json!({"a": 1, "b": 2})),
            (json!({"a": 9}), json!({"a": 9, "b": 2})),
        ] {
            backend.enqueue(vec![current.clone()]);
            let doc = store
                .update(
                    "main",
                    "articles",
                    &created.id,
                    DocumentInput { payload: patch, ..Default::default() },
                    None,
                    false,
                    None,
                )
                .await
                .expect("update");
            assert_eq!(doc.payload, expected);
            current = backend.table_rows(DOCUMENTS_TABLE).last().cloned().expect("row");
        }

        // Three physical rows, one logical key, strictly increasing versions.
        let rows = backend.table_rows(DOCUMENTS_TABLE);
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r["id"] == json!(created.id)));
        let versions: Vec<i64> =
            rows.iter().map(|r| r["version"].as_i64().expect("version")).collect();
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_update_tombstones_retargeted_reference() {
        let (store, backend) = store_with_author_relation();
        let mut current = live_row("main", "articles", "a1", 100);
        current.payload = json!({"author": "p1"});
        backend.enqueue_rows(&[current]);
        // The live edge the prior version declared.
        backend.enqueue_rows(&[RelationshipEdge {
            namespace: "main".into(),
            source_collection: "articles".into(),
            source_id: "a1".into(),
            field: "author".into(),
            target_collection: "people".into(),
            target_id: "p1".into(),
            position: 0,
            locale: None,
            version: 100,
            deleted_at: None,
        }]);

        let doc = store
            .update(
                "main",
                "articles",
                "a1",
                DocumentInput { payload: json!({"author": "p2"}), ..Default::default() },
                None,
                false,
                None,
            )
            .await
            .expect("update");

        let edges = backend.table_rows(EDGES_TABLE);
        assert_eq!(edges.len(), 2);

        let fresh = edges.iter().find(|e| e["target_id"] == json!("p2")).expect("new edge");
        assert_eq!(fresh["deleted_at"], json!(null));
        assert_eq!(fresh["version"], json!(doc.version));

        let stale = edges.iter().find(|e| e["target_id"] == json!("p1")).expect("tombstone");
        assert_eq!(stale["deleted_at"], stale["version"]);
        assert!(stale["version"].as_i64().expect("version") > 100);
    }

    #[tokio::test]
    async fn test_update_and_delete_carry_creating_actor() {
        let (store, backend) = store_with_backend();
        let mut current = live_row("main", "articles", "a1", 100);
        current.created_by = Some("user-1".into());
        backend.enqueue_rows(&[current.clone()]);

        store
            .update(
                "main",
                "articles",
                "a1",
                DocumentInput { actor: Some("user-2".into()), ..Default::default() },
                None,
                false,
                None,
            )
            .await
            .expect("update");

        backend.enqueue_rows(&[current]);
        store.soft_delete("main", "articles", "a1", None, None).await.expect("delete");

        let rows = backend.table_rows(DOCUMENTS_TABLE);
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row["created_by"], json!("user-1"), "creating actor must persist");
        }
        assert_eq!(rows[0]["updated_by"], json!("user-2"));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let (store, _backend) = store_with_backend();
        let err = store
            .update("main", "articles", "ghost", DocumentInput::default(), None, false, None)
            .await
            .expect_err("missing");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_upsert_falls_back_to_create() {
        let (store, backend) = store_with_backend();
        let doc = store
            .update(
                "main",
                "articles",
                "fresh",
                DocumentInput { payload: json!({"a": 1}), ..Default::default() },
                None,
                true,
                None,
            )
            .await
            .expect("upsert");
        assert_eq!(doc.id, "fresh");
        assert_eq!(backend.table_rows(DOCUMENTS_TABLE).len(), 1);
    }

    #[tokio::test]
    async fn test_soft_delete_outranks_prior_version() {
        let (store, backend) = store_with_backend();
        // A prior version far in the future: the wall-clock generator
        // cannot outrank it on its own.
        let future_version = (i64::MAX >> 12) << 10;
        backend.enqueue_rows(&[live_row("main", "articles", "a1", future_version)]);

        store
            .soft_delete("main", "articles", "a1", None, None)
            .await
            .expect("soft delete");

        let rows = backend.table_rows(DOCUMENTS_TABLE);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["version"], json!(future_version + 1));
        assert_eq!(rows[0]["deleted_at"], json!(future_version + 1));
    }

    #[tokio::test]
    async fn test_soft_delete_missing_is_noop() {
        let (store, backend) = store_with_backend();
        store.soft_delete("main", "articles", "ghost", None, None).await.expect("no-op");
        store.soft_delete("main", "articles", "", None, None).await.expect("empty id no-op");
        assert!(backend.table_rows(DOCUMENTS_TABLE).is_empty());
    }

    #[tokio::test]
    async fn test_read_filter_applies_after_ranking() {
        let (store, backend) = store_with_backend();
        store
            .read_many(
                "main",
                "articles",
                Some(&json!({"status": {"equals": "published"}})),
                ListRange::default(),
            )
            .await
            .expect("read");

        let statements = backend.statements();
        assert_eq!(statements.len(), 1);
        let sql = &statements[0].sql;
        assert_eq!(statements[0].kind, StatementKind::Query);

        let rank_pos = sql.find("row_number() OVER").expect("ranking window");
        let outer_pos = sql.find("_rank = 1 AND deleted_at IS NULL").expect("liveness");
        let filter_pos = sql.find("JSON_VALUE(payload, '$.status')").expect("caller filter");
        assert!(rank_pos < outer_pos, "ranking must precede the outer WHERE");
        assert!(outer_pos < filter_pos, "caller filter must join the outer WHERE: {sql}");
        // The inner scope holds only namespace/collection bindings.
        let inner = &sql[..rank_pos];
        assert!(!inner.contains("$.status"), "filter leaked into partition scan: {sql}");
    }

    #[tokio::test]
    async fn test_offset_applies_without_a_limit() {
        let (store, backend) = store_with_backend();
        store
            .read_many("main", "articles", None, ListRange { limit: 0, offset: 5 })
            .await
            .expect("read");

        let sql = &backend.statements()[0].sql;
        assert!(!sql.contains(" LIMIT "), "limit 0 means unbounded: {sql}");
        assert!(sql.ends_with(" OFFSET {p2:Int64}"), "offset must still apply: {sql}");
    }

    #[tokio::test]
    async fn test_read_one_round_trips_row() {
        let (store, backend) = store_with_backend();
        backend.enqueue_rows(&[live_row("main", "articles", "a1", 7)]);
        let doc = store.read_one("main", "articles", "a1", None).await.expect("read");
        assert_eq!(doc.id, "a1");
        assert_eq!(doc.version, 7);

        let err = store.read_one("main", "articles", "a1", None).await.expect_err("empty");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_append_many_is_one_insert_call() {
        let (store, backend) = store_with_backend();
        let inputs = (0..5)
            .map(|i| DocumentInput { payload: json!({"n": i}), ..Default::default() })
            .collect();
        let written = store.append_many("main", "articles", inputs).await.expect("append");

        assert_eq!(written, 5);
        assert_eq!(backend.insert_count(), 1, "bulk append must be a single insert");
        assert_eq!(backend.table_rows(DOCUMENTS_TABLE).len(), 5);
        assert_eq!(backend.query_count(), 0, "bulk append must not read");
    }

    #[tokio::test]
    async fn test_invalid_identifiers_rejected_before_network() {
        let (store, backend) = store_with_backend();
        let err = store
            .create("bad namespace", "articles", DocumentInput::default(), None)
            .await
            .expect_err("invalid namespace");
        assert!(matches!(err, StoreError::InvalidArgument { .. }));
        assert_eq!(backend.insert_count() + backend.query_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnected_store_fails_fast() {
        let store = SedimentStore::disconnected(Arc::new(StaticSchema::default()));
        let err = store
            .read_one("main", "articles", "a1", None)
            .await
            .expect_err("not connected");
        assert!(matches!(err, StoreError::NotConnected));
    }

    #[tokio::test]
    async fn test_backend_errors_propagate_unchanged() {
        let (store, backend) = store_with_backend();
        backend.inject_failures(1);
        let err = store
            .read_one("main", "articles", "a1", None)
            .await
            .expect_err("injected");
        assert!(matches!(err, StoreError::Backend { .. }));
    }

    #[test]
    fn test_merge_patch_semantics() {
        let existing = json!({"a": {"x": 1, "y": 2}, "b": [1, 2], "c": "keep"});
        let patch = json!({"a": {"y": 3}, "b": [9], "d": null});
        let merged = merge_patch(&existing, &patch);
        assert_eq!(
            merged,
            json!({"a": {"x": 1, "y": 3}, "b": [9], "c": "keep", "d": null}),
        );

        // Non-object existing values are overwritten wholesale.
        assert_eq!(merge_patch(&json!(1), &json!({"a": 1})), json!({"a": 1}));
    }

    mod property_tests {
        use proptest::prelude::*;
        use sediment_test_utils::strategies::{arb_document_row, arb_payload};

        use super::*;

        proptest! {
            /// Rows survive the trip through the backend's self-describing
            /// row shape unchanged.
            #[test]
            fn document_rows_round_trip(row in arb_document_row()) {
                let serialized = crate::backend::to_row(&row).expect("object shape");
                let parsed = document_from_row(serialized).expect("well-formed");
                prop_assert_eq!(parsed, row);
            }

            /// Merging keeps every untouched existing field and lands every
            /// patch field at its patched value.
            #[test]
            fn merge_keeps_base_and_applies_patch(
                existing in arb_payload(),
                patch in arb_payload(),
            ) {
                let merged = merge_patch(&existing, &patch);
                let merged_map = merged.as_object().expect("object");
                let patch_map = patch.as_object().expect("object");
                for (key, value) in existing.as_object().expect("object") {
                    if !patch_map.contains_key(key) {
                        prop_assert_eq!(&merged_map[key], value);
                    }
                }
                for (key, value) in patch_map {
                    prop_assert_eq!(&merged_map[key], value);
                }
            }
        }
    }
}
