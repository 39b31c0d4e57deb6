//! Proptest strategies for sediment domain values.
//!
//! Reusable generators for property-based testing across crates. Strategies
//! produce well-formed domain values while exploring edge cases through
//! random variation.
//!
//! # Usage
//!
//! ```no_run
//! use proptest::prelude::*;
//! use sediment_test_utils::strategies;
//!
//! proptest! {
//!     #[test]
//!     fn my_property(ns in strategies::arb_namespace()) {
//!         // test invariant with a randomly generated namespace
//!     }
//! }
//! ```

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use sediment_types::{DocumentRow, ids};
use serde_json::{Value, json};

/// Generates a valid namespace identifier: `[a-z][a-z0-9_-]{0,15}`.
pub fn arb_namespace() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,15}"
}

/// Generates a valid collection identifier from a small fixed pool.
pub fn arb_collection() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "articles".to_string(),
        "authors".to_string(),
        "comments".to_string(),
        "tags".to_string(),
        "media".to_string(),
    ])
}

/// Generates a document id: 1-32 characters of `[A-Za-z0-9_-]`.
pub fn arb_document_id() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_-]{1,32}"
}

/// Generates a flat JSON payload with 0-6 scalar fields.
pub fn arb_payload() -> impl Strategy<Value = Value> {
    let scalar = prop_oneof![
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        "[a-z ]{0,24}".prop_map(Value::from),
        Just(Value::Null),
    ];
    prop::collection::btree_map("[a-z][a-z0-9_]{0,11}", scalar, 0..6)
        .prop_map(|fields| Value::Object(fields.into_iter().collect()))
}

/// Generates a timestamp within 2020-2030.
pub fn arb_timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (1_577_836_800i64..1_893_456_000i64)
        .prop_map(|secs| Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now))
}

/// Generates a complete live document row with a freshly issued version.
pub fn arb_document_row() -> impl Strategy<Value = DocumentRow> {
    (arb_namespace(), arb_collection(), arb_document_id(), arb_payload(), arb_timestamp())
        .prop_map(|(namespace, collection, id, payload, at)| DocumentRow {
            namespace,
            collection,
            id,
            version: ids::next_version(),
            title: None,
            payload,
            created_at: at,
            updated_at: at,
            deleted_at: None,
            created_by: None,
            updated_by: None,
        })
}

/// Generates a raw filter tree of scalar conditions, as a caller would
/// submit it: one or two fields with a random known operator each.
pub fn arb_raw_filter() -> impl Strategy<Value = Value> {
    let operator = prop::sample::select(vec![
        "equals",
        "not_equals",
        "greater_than",
        "less_than",
        "like",
        "contains",
        "exists",
    ]);
    let condition = ("[a-z][a-z0-9_]{0,11}", operator, "[a-z0-9]{0,12}").prop_map(
        |(field, op, operand)| {
            let operand: Value =
                if op == "exists" { json!(true) } else { Value::String(operand) };
            json!({ field: { op: operand } })
        },
    );
    prop::collection::vec(condition, 1..3).prop_map(|conditions| {
        if conditions.len() == 1 {
            conditions.into_iter().next().unwrap_or_default()
        } else {
            json!({ "and": conditions })
        }
    })
}
