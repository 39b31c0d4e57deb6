//! Relationship index: append-only edges with reverse lookups.
//!
//! Edges follow the same liveness discipline as documents — one row per
//! (source field, target) reference, max version wins, tombstones mark
//! removal. The host supplies collection metadata through
//! [`SchemaProvider`]; extraction is shape-driven on top of it, so a field
//! declared as a relation accepts a bare id, a reference object, or an
//! array of either.

use std::collections::{HashMap, HashSet};

use sediment_query::{Compiler, SqlValue};
use sediment_types::error::BackendSnafu;
use sediment_types::{DocumentRow, RelationshipEdge, Result, next_version};
use serde_json::Value;
use tracing::debug;

use crate::SedimentStore;
use crate::backend::Row;
use crate::tables::EDGES_TABLE;

const EDGE_COLUMNS: &str = "namespace, source_collection, source_id, field, \
     target_collection, target_id, position, locale, version, deleted_at";

/// A relation-bearing field on a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationField {
    /// Payload field holding the reference(s).
    pub field: String,
    /// Collections the reference may point at; the first is the default
    /// when a value does not declare one.
    pub targets: Vec<String>,
    /// True for list-valued fields.
    pub many: bool,
}

/// The inverse of a relation, resolved from the parent's side for joins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReverseRelation {
    /// Collection whose documents carry the back-reference.
    pub source_collection: String,
    /// Field on that collection pointing at the parent.
    pub field: String,
}

/// Host-supplied collection metadata.
///
/// Drives both edge extraction on writes and reverse lookups during join
/// resolution. Implementations must be cheap; these are called on every
/// write.
pub trait SchemaProvider: Send + Sync {
    /// Relation fields declared on a collection. Empty for collections
    /// without references.
    fn relation_fields(&self, namespace: &str, collection: &str) -> Vec<RelationField>;

    /// Resolves a join path on a parent collection to the back-referencing
    /// relation, or `None` when the path is not a known join.
    fn reverse_relation(
        &self,
        namespace: &str,
        parent_collection: &str,
        join_path: &str,
    ) -> Option<ReverseRelation>;
}

/// In-memory [`SchemaProvider`] built up-front; ignores namespaces.
///
/// Suitable for hosts with a fixed schema and for tests.
#[derive(Debug, Default)]
pub struct StaticSchema {
    relations: HashMap<String, Vec<RelationField>>,
    reverses: HashMap<(String, String), ReverseRelation>,
}

impl StaticSchema {
    /// Declares a relation field on a collection.
    #[must_use]
    pub fn with_relation(mut self, collection: &str, field: RelationField) -> Self {
        self.relations.entry(collection.to_string()).or_default().push(field);
        self
    }

    /// Declares the reverse of a relation for join resolution.
    #[must_use]
    pub fn with_reverse(
        mut self,
        parent_collection: &str,
        join_path: &str,
        reverse: ReverseRelation,
    ) -> Self {
        self.reverses
            .insert((parent_collection.to_string(), join_path.to_string()), reverse);
        self
    }
}

impl SchemaProvider for StaticSchema {
    fn relation_fields(&self, _namespace: &str, collection: &str) -> Vec<RelationField> {
        self.relations.get(collection).cloned().unwrap_or_default()
    }

    fn reverse_relation(
        &self,
        _namespace: &str,
        parent_collection: &str,
        join_path: &str,
    ) -> Option<ReverseRelation> {
        self.reverses
            .get(&(parent_collection.to_string(), join_path.to_string()))
            .cloned()
    }
}

/// Extracts relationship edges from a document row per the collection's
/// declared relation fields.
///
/// Accepted value shapes per field: bare id string, reference object
/// (`{"id", "collection", "locale"}`), or an array of either (ordinal
/// positions follow array order). Anything else yields no edge.
pub(crate) fn extract_edges(
    schema: &dyn SchemaProvider,
    row: &DocumentRow,
) -> Vec<RelationshipEdge> {
    let mut edges = Vec::new();
    for relation in schema.relation_fields(&row.namespace, &row.collection) {
        let Some(value) = row.payload.get(&relation.field) else { continue };
        match value {
            Value::Array(items) => {
                for (position, item) in items.iter().enumerate() {
                    if let Some(edge) = edge_from_value(row, &relation, item, position as i64) {
                        edges.push(edge);
                    }
                }
            }
            other => {
                if let Some(edge) = edge_from_value(row, &relation, other, 0) {
                    edges.push(edge);
                }
            }
        }
    }
    edges
}

fn edge_from_value(
    row: &DocumentRow,
    relation: &RelationField,
    value: &Value,
    position: i64,
) -> Option<RelationshipEdge> {
    let default_target = relation.targets.first()?;
    let (target_id, target_collection, locale) = match value {
        Value::String(id) if !id.is_empty() => (id.clone(), default_target.clone(), None),
        Value::Object(obj) => {
            let id = obj.get("id")?.as_str()?.to_string();
            if id.is_empty() {
                return None;
            }
            let collection = obj
                .get("collection")
                .and_then(Value::as_str)
                .map_or_else(|| default_target.clone(), str::to_string);
            let locale = obj.get("locale").and_then(Value::as_str).map(str::to_string);
            (id, collection, locale)
        }
        _ => return None,
    };
    Some(RelationshipEdge {
        namespace: row.namespace.clone(),
        source_collection: row.collection.clone(),
        source_id: row.id.clone(),
        field: relation.field.clone(),
        target_collection,
        target_id,
        position,
        locale,
        version: row.version,
        deleted_at: None,
    })
}

pub(crate) fn edge_from_row(row: Row) -> Result<RelationshipEdge> {
    serde_json::from_value(Value::Object(row))
        .map_err(|e| BackendSnafu { message: format!("malformed edge row: {e}") }.build())
}

/// Which side of the edge a propagation scopes on.
#[derive(Debug, Clone, Copy)]
enum EdgeSide {
    Source,
    Target,
}

impl EdgeSide {
    fn columns(self) -> (&'static str, &'static str) {
        match self {
            EdgeSide::Source => ("source_collection", "source_id"),
            EdgeSide::Target => ("target_collection", "target_id"),
        }
    }
}

impl SedimentStore {
    /// Appends the edges a live document row declares. No-op for rows
    /// without relation values.
    pub(crate) async fn record_edges(&self, row: &DocumentRow) -> Result<()> {
        let edges = extract_edges(self.schema(), row);
        if edges.is_empty() {
            return Ok(());
        }
        debug!(key = %row.key(), count = edges.len(), "recording relationship edges");
        self.insert_rows(EDGES_TABLE, &edges).await
    }

    /// Brings the edge index in line with an updated document row.
    ///
    /// Appends the edges the new payload declares and, in the same batch,
    /// tombstones every live source-side edge the payload no longer
    /// declares — a retargeted or removed reference lands in a different
    /// partition than its replacement, so appending alone would leave the
    /// stale edge live forever.
    pub(crate) async fn reconcile_edges(&self, row: &DocumentRow) -> Result<()> {
        if self.schema().relation_fields(&row.namespace, &row.collection).is_empty() {
            return Ok(());
        }
        let mut writes = extract_edges(self.schema(), row);
        let declared: HashSet<(String, String, String, i64, Option<String>)> = writes
            .iter()
            .map(|edge| {
                (
                    edge.field.clone(),
                    edge.target_collection.clone(),
                    edge.target_id.clone(),
                    edge.position,
                    edge.locale.clone(),
                )
            })
            .collect();

        let live = self
            .live_edges_for(EdgeSide::Source, &row.namespace, &row.collection, &row.id)
            .await?;
        for edge in live {
            let key = (
                edge.field.clone(),
                edge.target_collection.clone(),
                edge.target_id.clone(),
                edge.position,
                edge.locale.clone(),
            );
            if !declared.contains(&key) {
                let version = next_version().max(edge.version + 1);
                writes.push(RelationshipEdge {
                    version,
                    deleted_at: Some(version),
                    ..edge
                });
            }
        }

        if writes.is_empty() {
            return Ok(());
        }
        debug!(key = %row.key(), count = writes.len(), "reconciling relationship edges");
        self.insert_rows(EDGES_TABLE, &writes).await
    }

    /// Appends edges for a batch of rows in a single insert.
    pub(crate) async fn record_edges_bulk(&self, rows: &[DocumentRow]) -> Result<()> {
        let edges: Vec<RelationshipEdge> =
            rows.iter().flat_map(|row| extract_edges(self.schema(), row)).collect();
        if edges.is_empty() {
            return Ok(());
        }
        self.insert_rows(EDGES_TABLE, &edges).await
    }

    /// Soft-deletes every live edge touching a document, on both sides.
    ///
    /// Two independent rank-and-filter reads (document as source, document
    /// as target), each parameterized only by the document key, followed by
    /// one tombstone insert. Unrelated concurrent propagations cannot
    /// interfere: each only ever outranks edges of its own document.
    pub(crate) async fn propagate_edge_tombstones(
        &self,
        namespace: &str,
        collection: &str,
        id: &str,
    ) -> Result<()> {
        let mut tombstones = Vec::new();
        for side in [EdgeSide::Source, EdgeSide::Target] {
            for edge in self.live_edges_for(side, namespace, collection, id).await? {
                let version = next_version().max(edge.version + 1);
                tombstones.push(RelationshipEdge {
                    version,
                    deleted_at: Some(version),
                    ..edge
                });
            }
        }
        if tombstones.is_empty() {
            return Ok(());
        }
        debug!(namespace, collection, id, count = tombstones.len(), "tombstoning edges");
        self.insert_rows(EDGES_TABLE, &tombstones).await
    }

    /// Rank-and-filter read of live edges scoped to one side of the key.
    async fn live_edges_for(
        &self,
        side: EdgeSide,
        namespace: &str,
        collection: &str,
        id: &str,
    ) -> Result<Vec<RelationshipEdge>> {
        let (collection_col, id_col) = side.columns();
        let mut compiler = Compiler::new();
        let ns_ph = compiler.bind(SqlValue::Text(namespace.to_string()));
        let col_ph = compiler.bind(SqlValue::Text(collection.to_string()));
        let id_ph = compiler.bind(SqlValue::Text(id.to_string()));
        let sql = format!(
            "SELECT {EDGE_COLUMNS} FROM (\
             SELECT {EDGE_COLUMNS}, row_number() OVER (\
             PARTITION BY namespace, source_collection, source_id, field, \
             target_collection, target_id, position, locale ORDER BY version DESC\
             ) AS _rank FROM {EDGES_TABLE} \
             WHERE namespace = {ns_ph} AND {collection_col} = {col_ph} AND {id_col} = {id_ph}\
             ) WHERE _rank = 1 AND deleted_at IS NULL"
        );
        let rows = self.backend()?.query(&sql, &compiler.finish()).await?;
        rows.into_iter().map(edge_from_row).collect()
    }

    /// Queries live edges whose target is any of the given parent ids,
    /// scoped to one (source collection, field) relation. Used by the join
    /// resolver.
    pub(crate) async fn live_edges_targeting(
        &self,
        namespace: &str,
        source_collection: &str,
        field: &str,
        target_collection: &str,
        target_ids: &[String],
    ) -> Result<Vec<RelationshipEdge>> {
        if target_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut compiler = Compiler::new();
        let ns_ph = compiler.bind(SqlValue::Text(namespace.to_string()));
        let src_ph = compiler.bind(SqlValue::Text(source_collection.to_string()));
        let field_ph = compiler.bind(SqlValue::Text(field.to_string()));
        let tgt_ph = compiler.bind(SqlValue::Text(target_collection.to_string()));
        let id_phs: Vec<String> = target_ids
            .iter()
            .map(|id| compiler.bind(SqlValue::Text(id.clone())))
            .collect();
        let sql = format!(
            "SELECT {EDGE_COLUMNS} FROM (\
             SELECT {EDGE_COLUMNS}, row_number() OVER (\
             PARTITION BY namespace, source_collection, source_id, field, \
             target_collection, target_id, position, locale ORDER BY version DESC\
             ) AS _rank FROM {EDGES_TABLE} \
             WHERE namespace = {ns_ph} AND target_collection = {tgt_ph} \
             AND target_id IN ({ids}) \
             AND source_collection = {src_ph} AND field = {field_ph}\
             ) WHERE _rank = 1 AND deleted_at IS NULL \
             ORDER BY target_id, position, source_id",
            ids = id_phs.join(", "),
        );
        let rows = self.backend()?.query(&sql, &compiler.finish()).await?;
        rows.into_iter().map(edge_from_row).collect()
    }
}
