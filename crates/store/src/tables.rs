//! Physical table registry and DDL.
//!
//! One place for table names and their create statements, targeting a
//! ReplacingMergeTree-family backend. The sort keys implement the access
//! paths the store relies on:
//! - documents: point and list reads partition on (namespace, collection,
//!   id) and rank by version
//! - relationships: reverse lookups range-scan on the target tuple
//! - staging: commit/rollback scan one transaction id at a time

/// Main document table.
pub const DOCUMENTS_TABLE: &str = "documents";

/// Relationship edge table.
pub const EDGES_TABLE: &str = "relationships";

/// Transaction staging table (markers and staged writes).
pub const STAGING_TABLE: &str = "document_staging";

/// Reserved collection name for transaction marker rows inside the staging
/// table.
pub const TXN_MARKER_COLLECTION: &str = "_transaction";

/// DDL for the document table. Version is the dedup key; background merges
/// are an optimization only and never load-bearing for reads.
#[must_use]
pub fn documents_ddl() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {DOCUMENTS_TABLE} (\
         namespace String, \
         collection String, \
         id String, \
         version Int64, \
         title Nullable(String), \
         payload String, \
         created_at DateTime64(3), \
         updated_at DateTime64(3), \
         deleted_at Nullable(Int64), \
         created_by Nullable(String), \
         updated_by Nullable(String)\
         ) ENGINE = ReplacingMergeTree(version) \
         PARTITION BY namespace \
         ORDER BY (namespace, collection, id, version)"
    )
}

/// DDL for the relationship edge table, ordered for reverse-lookup range
/// scans (target first).
#[must_use]
pub fn edges_ddl() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {EDGES_TABLE} (\
         namespace String, \
         source_collection String, \
         source_id String, \
         field String, \
         target_collection String, \
         target_id String, \
         position Int64, \
         locale Nullable(String), \
         version Int64, \
         deleted_at Nullable(Int64)\
         ) ENGINE = ReplacingMergeTree(version) \
         PARTITION BY namespace \
         ORDER BY (namespace, target_collection, target_id, \
         source_collection, source_id, field, position)"
    )
}

/// DDL for the staging table, partitioned by creation month so expired
/// transactions age out with cheap partition drops by the external janitor.
#[must_use]
pub fn staging_ddl() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {STAGING_TABLE} (\
         namespace String, \
         txn_id String, \
         collection String, \
         id String, \
         version Int64, \
         status Nullable(String), \
         expires_at Nullable(DateTime64(3)), \
         title Nullable(String), \
         payload Nullable(String), \
         created_at DateTime64(3), \
         updated_at Nullable(DateTime64(3)), \
         deleted_at Nullable(Int64), \
         created_by Nullable(String), \
         updated_by Nullable(String)\
         ) ENGINE = MergeTree \
         PARTITION BY toYYYYMM(created_at) \
         ORDER BY (namespace, txn_id, collection, id)"
    )
}
