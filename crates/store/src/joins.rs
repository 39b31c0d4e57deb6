//! Join resolution: paginated reverse lookups over the relationship index.
//!
//! One edge query per join path covers the whole parent batch; results are
//! grouped per parent and paginated independently, then attached into each
//! parent's payload at the (possibly nested) join path.

use std::collections::{BTreeMap, HashMap};

use sediment_types::{LogicalDocument, Result};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::SedimentStore;

/// Payload field a version-history document uses to declare the id of the
/// document it is a version of. Joins key the lookup on it instead of the
/// row's own id.
pub const HISTORY_PARENT_FIELD: &str = "_parent_id";

/// Payload sub-object join results nest under for version-history parents.
pub const CURRENT_VERSION_KEY: &str = "_current";

/// Per-join pagination request.
#[derive(Debug, Clone, Copy)]
pub struct JoinSpec {
    /// Page size; 0 means all results on one page.
    pub limit: usize,
    /// 1-indexed page; 0 is treated as 1.
    pub page: usize,
    /// Whether to compute the per-parent total.
    pub with_count: bool,
}

impl Default for JoinSpec {
    fn default() -> Self {
        Self { limit: 0, page: 1, with_count: false }
    }
}

/// One parent's slice of a resolved join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinPage {
    /// Referencing document ids on this page, in edge order.
    pub ids: Vec<String>,
    /// True when more items exist beyond this page.
    pub has_next_page: bool,
    /// Total referencing documents, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl JoinPage {
    fn paginate(group: &[String], spec: JoinSpec) -> Self {
        let count = spec.with_count.then_some(group.len());
        if spec.limit == 0 {
            return Self { ids: group.to_vec(), has_next_page: false, count };
        }
        let page = spec.page.max(1);
        let start = (page - 1) * spec.limit;
        let ids = group.iter().skip(start).take(spec.limit).cloned().collect();
        Self { ids, has_next_page: group.len() > page * spec.limit, count }
    }
}

/// Sets a value at a dot-separated path inside a JSON object, creating
/// intermediate objects; non-object intermediates are replaced.
fn attach_at_path(root: &mut Value, path: &str, value: Value) {
    if !root.is_object() {
        *root = Value::Object(Map::new());
    }
    match path.split_once('.') {
        None => {
            root[path] = value;
        }
        Some((head, rest)) => {
            if !root[head].is_object() {
                root[head] = Value::Object(Map::new());
            }
            attach_at_path(&mut root[head], rest, value);
        }
    }
}

/// The lookup key for a parent: its declared history parent when present,
/// otherwise its own id.
fn lookup_key(parent: &LogicalDocument) -> (String, bool) {
    match parent.payload.get(HISTORY_PARENT_FIELD).and_then(Value::as_str) {
        Some(parent_id) if !parent_id.is_empty() => (parent_id.to_string(), true),
        _ => (parent.id.clone(), false),
    }
}

impl SedimentStore {
    /// Resolves joins for a batch of parents, attaching a [`JoinPage`]
    /// into each parent's payload at the join path.
    ///
    /// Join paths without a known reverse relation are skipped. Parents
    /// carrying a history parent id key the lookup by that id and receive
    /// results under the current-version sub-object.
    pub async fn resolve_joins(
        &self,
        namespace: &str,
        collection: &str,
        parents: &mut [LogicalDocument],
        joins: &BTreeMap<String, JoinSpec>,
    ) -> Result<()> {
        if parents.is_empty() || joins.is_empty() {
            return Ok(());
        }

        let keys: Vec<String> = {
            let mut seen = Vec::new();
            for parent in parents.iter() {
                let (key, _) = lookup_key(parent);
                if !seen.contains(&key) {
                    seen.push(key);
                }
            }
            seen
        };

        let schema = self.schema();
        for (path, spec) in joins {
            let Some(reverse) = schema.reverse_relation(namespace, collection, path) else {
                debug!(collection, path, "join path has no reverse relation, skipping");
                continue;
            };

            let edges = self
                .live_edges_targeting(
                    namespace,
                    &reverse.source_collection,
                    &reverse.field,
                    collection,
                    &keys,
                )
                .await?;

            let mut groups: HashMap<String, Vec<String>> = HashMap::new();
            for edge in edges {
                groups.entry(edge.target_id).or_default().push(edge.source_id);
            }

            for parent in parents.iter_mut() {
                let (key, is_history) = lookup_key(parent);
                let group = groups.get(&key).map_or(&[][..], Vec::as_slice);
                let page = JoinPage::paginate(group, *spec);
                let mut resolved = json!({
                    "ids": page.ids,
                    "has_next_page": page.has_next_page,
                });
                if let Some(count) = page.count {
                    resolved["count"] = json!(count);
                }
                let target_path = if is_history {
                    format!("{CURRENT_VERSION_KEY}.{path}")
                } else {
                    path.clone()
                };
                attach_at_path(&mut parent.payload, &target_path, resolved);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use sediment_types::RelationshipEdge;

    use super::*;
    use crate::backend::MemoryBackend;
    use crate::relationships::{ReverseRelation, StaticSchema};

    fn parent(id: &str, payload: Value) -> LogicalDocument {
        LogicalDocument {
            id: id.into(),
            collection: "articles".into(),
            title: None,
            payload,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn comment_edge(target_id: &str, source_id: &str, position: i64) -> RelationshipEdge {
        RelationshipEdge {
            namespace: "main".into(),
            source_collection: "comments".into(),
            source_id: source_id.into(),
            field: "article".into(),
            target_collection: "articles".into(),
            target_id: target_id.into(),
            position,
            locale: None,
            version: 1,
            deleted_at: None,
        }
    }

    fn comment_schema() -> StaticSchema {
        StaticSchema::default().with_reverse(
            "articles",
            "comments",
            ReverseRelation { source_collection: "comments".into(), field: "article".into() },
        )
    }

    fn join_map(limit: usize, page: usize, with_count: bool) -> BTreeMap<String, JoinSpec> {
        BTreeMap::from([("comments".to_string(), JoinSpec { limit, page, with_count })])
    }

    async fn resolve_five_edges(limit: usize, page: usize) -> JoinPage {
        let backend = Arc::new(MemoryBackend::new());
        let store = SedimentStore::new(backend.clone(), Arc::new(comment_schema()));
        let edges: Vec<RelationshipEdge> =
            (0..5).map(|i| comment_edge("a1", &format!("c{i}"), i)).collect();
        backend.enqueue_rows(&edges);

        let mut parents = vec![parent("a1", json!({}))];
        store
            .resolve_joins("main", "articles", &mut parents, &join_map(limit, page, false))
            .await
            .expect("resolve");

        let attached = &parents[0].payload["comments"];
        JoinPage {
            ids: attached["ids"]
                .as_array()
                .expect("ids")
                .iter()
                .map(|v| v.as_str().expect("id").to_string())
                .collect(),
            has_next_page: attached["has_next_page"].as_bool().expect("has_next_page"),
            count: None,
        }
    }

    #[tokio::test]
    async fn test_pagination_first_page_has_next() {
        let page = resolve_five_edges(2, 1).await;
        assert_eq!(page.ids, vec!["c0", "c1"]);
        assert!(page.has_next_page);
    }

    #[tokio::test]
    async fn test_pagination_last_partial_page() {
        let page = resolve_five_edges(2, 3).await;
        assert_eq!(page.ids, vec!["c4"]);
        assert!(!page.has_next_page);
    }

    #[tokio::test]
    async fn test_limit_zero_returns_all() {
        let page = resolve_five_edges(0, 1).await;
        assert_eq!(page.ids.len(), 5);
        assert!(!page.has_next_page);
    }

    #[tokio::test]
    async fn test_groups_are_per_parent() {
        let backend = Arc::new(MemoryBackend::new());
        let store = SedimentStore::new(backend.clone(), Arc::new(comment_schema()));
        backend.enqueue_rows(&[
            comment_edge("a1", "c1", 0),
            comment_edge("a2", "c2", 0),
            comment_edge("a2", "c3", 1),
        ]);

        let mut parents = vec![parent("a1", json!({})), parent("a2", json!({}))];
        store
            .resolve_joins("main", "articles", &mut parents, &join_map(0, 1, true))
            .await
            .expect("resolve");

        assert_eq!(parents[0].payload["comments"]["ids"], json!(["c1"]));
        assert_eq!(parents[0].payload["comments"]["count"], json!(1));
        assert_eq!(parents[1].payload["comments"]["ids"], json!(["c2", "c3"]));
        assert_eq!(parents[1].payload["comments"]["count"], json!(2));
        assert_eq!(backend.query_count(), 1, "one edge query per join path");
    }

    #[tokio::test]
    async fn test_nested_join_path_creates_intermediates() {
        let backend = Arc::new(MemoryBackend::new());
        let schema = StaticSchema::default().with_reverse(
            "articles",
            "meta.comments",
            ReverseRelation { source_collection: "comments".into(), field: "article".into() },
        );
        let store = SedimentStore::new(backend.clone(), Arc::new(schema));
        backend.enqueue_rows(&[comment_edge("a1", "c1", 0)]);

        let mut parents = vec![parent("a1", json!({"meta": {"kept": true}}))];
        let joins = BTreeMap::from([("meta.comments".to_string(), JoinSpec::default())]);
        store
            .resolve_joins("main", "articles", &mut parents, &joins)
            .await
            .expect("resolve");

        assert_eq!(parents[0].payload["meta"]["kept"], json!(true));
        assert_eq!(parents[0].payload["meta"]["comments"]["ids"], json!(["c1"]));
    }

    #[tokio::test]
    async fn test_history_parent_keys_lookup_and_nests_results() {
        let backend = Arc::new(MemoryBackend::new());
        let store = SedimentStore::new(backend.clone(), Arc::new(comment_schema()));
        backend.enqueue_rows(&[comment_edge("orig1", "c1", 0)]);

        let mut parents =
            vec![parent("rev9", json!({HISTORY_PARENT_FIELD: "orig1"}))];
        store
            .resolve_joins("main", "articles", &mut parents, &join_map(0, 1, false))
            .await
            .expect("resolve");

        // The lookup was keyed by the declared parent id.
        let statement = &backend.statements()[0];
        assert!(statement.params.values().any(|v| v.as_json() == json!("orig1")));
        assert!(!statement.params.values().any(|v| v.as_json() == json!("rev9")));

        let nested = &parents[0].payload[CURRENT_VERSION_KEY]["comments"];
        assert_eq!(nested["ids"], json!(["c1"]));
    }

    #[tokio::test]
    async fn test_unknown_join_path_is_skipped() {
        let backend = Arc::new(MemoryBackend::new());
        let store = SedimentStore::new(backend.clone(), Arc::new(StaticSchema::default()));
        let mut parents = vec![parent("a1", json!({}))];
        store
            .resolve_joins("main", "articles", &mut parents, &join_map(2, 1, false))
            .await
            .expect("resolve");
        assert_eq!(backend.query_count(), 0);
        assert_eq!(parents[0].payload, json!({}));
    }

    #[test]
    fn test_attach_replaces_non_object_intermediate() {
        let mut root = json!({"meta": 3});
        attach_at_path(&mut root, "meta.inner", json!(1));
        assert_eq!(root, json!({"meta": {"inner": 1}}));
    }
}
