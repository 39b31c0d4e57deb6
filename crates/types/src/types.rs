//! Core row types for the sediment document layer.
//!
//! All persisted shapes are append-only: a logical mutation is a new
//! physical row with a higher version, and a deletion is a new row carrying
//! a tombstone mark. The shared liveness rule — the max-version row per
//! logical key, with no tombstone — is applied identically to documents,
//! relationship edges, and transaction records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Logical address of a document: everything callers may reference.
///
/// Physical rows are owned exclusively by the store; callers never address a
/// specific version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentKey {
    /// Tenant namespace.
    pub namespace: String,
    /// Entity type (collection) within the namespace.
    pub collection: String,
    /// Logical document id.
    pub id: String,
}

impl DocumentKey {
    /// Creates a key from its parts.
    pub fn new(
        namespace: impl Into<String>,
        collection: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self { namespace: namespace.into(), collection: collection.into(), id: id.into() }
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.collection, self.id)
    }
}

/// One physical document row as stored in the backend.
///
/// Rows are never mutated or deleted by normal operations. For a given
/// (namespace, collection, id) the max-version row is logically current; it
/// is *live* only when `deleted_at` is also unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRow {
    /// Tenant namespace.
    pub namespace: String,
    /// Entity type within the namespace.
    pub collection: String,
    /// Logical document id.
    pub id: String,
    /// Monotonic version; the dedup key for the backend's merge engine.
    pub version: i64,
    /// Optional display title, kept as a physical column for sorting.
    #[serde(default)]
    pub title: Option<String>,
    /// The document body.
    pub payload: Value,
    /// Wall-clock creation time of the logical document.
    pub created_at: DateTime<Utc>,
    /// Wall-clock time this row was written.
    pub updated_at: DateTime<Utc>,
    /// Tombstone mark, in version units. Unset on live rows.
    #[serde(default)]
    pub deleted_at: Option<i64>,
    /// Actor reference for the creating write, if known.
    #[serde(default)]
    pub created_by: Option<String>,
    /// Actor reference for this row's write, if known.
    #[serde(default)]
    pub updated_by: Option<String>,
}

impl DocumentRow {
    /// The logical key this row belongs to.
    #[must_use]
    pub fn key(&self) -> DocumentKey {
        DocumentKey::new(&self.namespace, &self.collection, &self.id)
    }

    /// True when this row carries a tombstone mark.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// The deduplicated view of a document returned to callers.
///
/// Derived from the current live [`DocumentRow`]; never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalDocument {
    /// Logical document id.
    pub id: String,
    /// Entity type within the namespace.
    pub collection: String,
    /// Optional display title.
    #[serde(default)]
    pub title: Option<String>,
    /// The document body.
    pub payload: Value,
    /// Version of the underlying live row.
    pub version: i64,
    /// Wall-clock creation time.
    pub created_at: DateTime<Utc>,
    /// Wall-clock time of the latest write.
    pub updated_at: DateTime<Utc>,
}

impl From<DocumentRow> for LogicalDocument {
    fn from(row: DocumentRow) -> Self {
        Self {
            id: row.id,
            collection: row.collection,
            title: row.title,
            payload: row.payload,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// One relationship-index row: a single reference from a source field to a
/// target document.
///
/// Same liveness rule as documents, partitioned by the full tuple excluding
/// version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    /// Tenant namespace.
    pub namespace: String,
    /// Collection of the referencing document.
    pub source_collection: String,
    /// Id of the referencing document.
    pub source_id: String,
    /// Field on the source document holding the reference.
    pub field: String,
    /// Collection of the referenced document.
    pub target_collection: String,
    /// Id of the referenced document.
    pub target_id: String,
    /// Ordinal position within a list-valued field; 0 for single references.
    #[serde(default)]
    pub position: i64,
    /// Locale of the reference, for translation fields.
    #[serde(default)]
    pub locale: Option<String>,
    /// Monotonic version, shared with the document write that produced it.
    pub version: i64,
    /// Tombstone mark, in version units.
    #[serde(default)]
    pub deleted_at: Option<i64>,
}

/// Terminal and non-terminal transaction states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxnStatus {
    /// Transaction is open; staged rows accumulate under its id.
    Pending,
    /// Staged rows were copied into the main store.
    Committed,
    /// Staged rows were discarded in place.
    Aborted,
}

impl TxnStatus {
    /// True for states that admit no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, TxnStatus::Committed | TxnStatus::Aborted)
    }

    /// Wire-format string for this status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TxnStatus::Pending => "pending",
            TxnStatus::Committed => "committed",
            TxnStatus::Aborted => "aborted",
        }
    }

    /// Parses the wire-format string; unknown strings yield `None`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(TxnStatus::Pending),
            "committed" => Some(TxnStatus::Committed),
            "aborted" => Some(TxnStatus::Aborted),
            _ => None,
        }
    }
}

/// A transaction marker row in the staging table.
///
/// Status "changes" append a new record with a higher version; readers rank
/// by version exactly as they do for documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Tenant namespace.
    pub namespace: String,
    /// Transaction id (sortable; see `ids::next_sortable_id`).
    pub txn_id: String,
    /// Current status according to this record.
    pub status: TxnStatus,
    /// Optional absolute expiry. `None` means no expiry (long-running jobs).
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Wall-clock time this record was written.
    pub created_at: DateTime<Utc>,
    /// Monotonic version for status ranking.
    pub version: i64,
}
