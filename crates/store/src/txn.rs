//! Transaction staging: begin/commit/rollback over an append-only table.
//!
//! A transaction is a marker row in the staging table under the reserved
//! `_transaction` collection; status "changes" append a new marker with a
//! higher version, ranked exactly like document rows. Writes carrying the
//! transaction id accumulate as staged document rows; commit copies them
//! into the main table in one bulk insert, rollback simply never does.
//! There is no isolation claim here: staged rows become visible as a set
//! once the copy lands, and half-landed batches are the backend's durability
//! problem, not ours.

use chrono::{Duration, Utc};
use sediment_query::{Compiler, SqlValue};
use sediment_types::error::BackendSnafu;
use sediment_types::{
    Result, TransactionRecord, TxnStatus, next_sortable_id, next_version, validate_identifier,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::SedimentStore;
use crate::backend::to_row;
use crate::documents::{DOC_COLUMNS, document_from_row};
use crate::tables::{DOCUMENTS_TABLE, STAGING_TABLE, TXN_MARKER_COLLECTION};

const MARKER_COLUMNS: &str = "namespace, txn_id, status, expires_at, created_at, version";

impl SedimentStore {
    /// Opens a transaction: allocates a sortable id and appends a Pending
    /// marker. `timeout` records an advisory expiry; it is never enforced
    /// here (an external janitor sweeps expired transactions).
    ///
    /// # Errors
    ///
    /// [`sediment_types::StoreError::InvalidArgument`] for a malformed
    /// namespace; backend errors unchanged.
    pub async fn begin(&self, namespace: &str, timeout: Option<Duration>) -> Result<String> {
        validate_identifier(namespace, "namespace")?;
        let now = Utc::now();
        let record = TransactionRecord {
            namespace: namespace.to_string(),
            txn_id: next_sortable_id(),
            status: TxnStatus::Pending,
            expires_at: timeout.map(|t| now + t),
            created_at: now,
            version: next_version(),
        };
        info!(namespace, txn_id = %record.txn_id, "beginning transaction");
        self.append_marker(&record).await?;
        Ok(record.txn_id)
    }

    /// Commits a transaction: copies every staged row unchanged into the
    /// documents table (one bulk insert), updates the relationship index,
    /// and appends a Committed marker.
    ///
    /// Unknown ids and already-terminal transactions are silent no-ops. An
    /// expired-but-pending transaction still commits; expiry is advisory.
    pub async fn commit(&self, txn_id: &str) -> Result<()> {
        let Some(marker) = self.current_marker(txn_id).await? else {
            debug!(txn_id, "commit of unknown transaction is a no-op");
            return Ok(());
        };
        if marker.status.is_terminal() {
            debug!(txn_id, status = marker.status.as_str(), "transaction already settled");
            return Ok(());
        }

        let staged = self.staged_rows(&marker.namespace, txn_id).await?;
        if !staged.is_empty() {
            self.insert_rows(DOCUMENTS_TABLE, &staged).await?;
            for row in &staged {
                if row.is_tombstone() {
                    self.propagate_edge_tombstones(&row.namespace, &row.collection, &row.id)
                        .await?;
                } else {
                    // A staged update may have dropped or retargeted
                    // references; reconcile rather than blindly append.
                    self.reconcile_edges(row).await?;
                }
            }
        }
        info!(txn_id, rows = staged.len(), "transaction committed");
        self.append_marker(&TransactionRecord {
            status: TxnStatus::Committed,
            created_at: Utc::now(),
            version: next_version(),
            ..marker
        })
        .await
    }

    /// Rolls a transaction back by appending an Aborted marker. Staged rows
    /// stay in the staging table until partition expiry; they are never
    /// copied.
    ///
    /// Unknown ids and already-terminal transactions are silent no-ops.
    pub async fn rollback(&self, txn_id: &str) -> Result<()> {
        let Some(marker) = self.current_marker(txn_id).await? else {
            debug!(txn_id, "rollback of unknown transaction is a no-op");
            return Ok(());
        };
        if marker.status.is_terminal() {
            debug!(txn_id, status = marker.status.as_str(), "transaction already settled");
            return Ok(());
        }
        info!(txn_id, "transaction rolled back");
        self.append_marker(&TransactionRecord {
            status: TxnStatus::Aborted,
            created_at: Utc::now(),
            version: next_version(),
            ..marker
        })
        .await
    }

    /// Appends a marker row for the record's current status.
    async fn append_marker(&self, record: &TransactionRecord) -> Result<()> {
        let Some(mut row) = to_row(record) else {
            return Err(BackendSnafu { message: "unserializable marker".to_string() }.build());
        };
        // Markers live in the reserved collection, keyed by their txn id.
        row.insert("collection".to_string(), Value::String(TXN_MARKER_COLLECTION.to_string()));
        row.insert("id".to_string(), Value::String(record.txn_id.clone()));
        self.backend()?.insert(STAGING_TABLE, vec![row]).await
    }

    /// The max-version marker for a transaction id, or `None` when the id
    /// was never begun.
    async fn current_marker(&self, txn_id: &str) -> Result<Option<TransactionRecord>> {
        let mut compiler = Compiler::new();
        let id_ph = compiler.bind(SqlValue::Text(txn_id.to_string()));
        let col_ph = compiler.bind(SqlValue::Text(TXN_MARKER_COLLECTION.to_string()));
        let sql = format!(
            "SELECT {MARKER_COLUMNS} FROM (\
             SELECT {MARKER_COLUMNS}, row_number() OVER (\
             PARTITION BY namespace, txn_id ORDER BY version DESC\
             ) AS _rank FROM {STAGING_TABLE} \
             WHERE txn_id = {id_ph} AND collection = {col_ph}\
             ) WHERE _rank = 1"
        );
        let rows = self.backend()?.query(&sql, &compiler.finish()).await?;
        rows.into_iter()
            .next()
            .map(|row| {
                serde_json::from_value(Value::Object(row)).map_err(|e| {
                    BackendSnafu { message: format!("malformed marker row: {e}") }.build()
                })
            })
            .transpose()
    }

    /// Every staged document row of a transaction, in staging order.
    /// Duplicate (collection, id) stagings are copied as-is; the ranking
    /// read path resolves them.
    async fn staged_rows(
        &self,
        namespace: &str,
        txn_id: &str,
    ) -> Result<Vec<sediment_types::DocumentRow>> {
        let mut compiler = Compiler::new();
        let ns_ph = compiler.bind(SqlValue::Text(namespace.to_string()));
        let id_ph = compiler.bind(SqlValue::Text(txn_id.to_string()));
        let col_ph = compiler.bind(SqlValue::Text(TXN_MARKER_COLLECTION.to_string()));
        let sql = format!(
            "SELECT {DOC_COLUMNS} FROM {STAGING_TABLE} \
             WHERE namespace = {ns_ph} AND txn_id = {id_ph} AND collection != {col_ph} \
             ORDER BY version"
        );
        let rows = self.backend()?.query(&sql, &compiler.finish()).await?;
        rows.into_iter().map(document_from_row).collect()
    }
}
