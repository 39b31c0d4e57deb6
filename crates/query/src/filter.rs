//! The filter tree model and its boundary parser.
//!
//! Callers hand the store dynamically-shaped JSON filter trees. At the
//! boundary those are converted into a closed tagged-variant model; every
//! downstream stage works on [`Filter`] and [`Operator`] only. Unknown
//! shapes are captured explicitly as [`Operator::Unsupported`] (which
//! compiles to an always-true predicate) rather than handled by duck-typed
//! fallthrough.

use serde_json::Value;

/// Grouping keys recognized at any level of a filter tree.
const GROUP_AND: &str = "and";
const GROUP_OR: &str = "or";

/// A node in the filter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every child must match. An empty group is always-true.
    And(Vec<Filter>),
    /// At least one child must match. An empty group is always-true.
    Or(Vec<Filter>),
    /// A single field condition.
    Condition {
        /// Dotted field path, unresolved (resolution happens at compile
        /// time against the physical-column allow-list).
        path: String,
        /// The operator and its argument.
        op: Operator,
    },
}

/// A field operator with its raw JSON argument.
///
/// Arguments stay as JSON here; the compiler types them by runtime
/// inspection and degrades semantically invalid input to always-true.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    /// Equality, or IS NULL for a null argument.
    Equals(Value),
    /// Inequality; missing payload values count as "not equal".
    NotEquals(Value),
    /// Membership. An empty list matches nothing.
    In(Vec<Value>),
    /// Anti-membership. An empty list matches everything.
    NotIn(Vec<Value>),
    /// Strict ordering.
    GreaterThan(Value),
    /// Non-strict ordering.
    GreaterThanEqual(Value),
    /// Strict ordering.
    LessThan(Value),
    /// Non-strict ordering.
    LessThanEqual(Value),
    /// Case-insensitive pattern match.
    Like(Value),
    /// Case-insensitive substring match.
    Contains(Value),
    /// Presence test: true → IS NOT NULL, false → IS NULL.
    Exists(Value),
    /// Every argument element must appear in a list-valued field.
    All(Vec<Value>),
    /// Distance test against a `[lon, lat]` payload field.
    Near(Value),
    /// Containment test against a `[lon, lat]` payload field.
    Within(Value),
    /// Intersection test against a `[lon, lat]` payload field.
    Intersects(Value),
    /// Anything unrecognized. Compiles to always-true, by policy.
    Unsupported {
        /// The operator name as the caller wrote it.
        name: String,
    },
}

impl Operator {
    /// True when `name` is a recognized operator key.
    #[must_use]
    pub fn is_known_name(name: &str) -> bool {
        matches!(
            name,
            "equals"
                | "not_equals"
                | "in"
                | "not_in"
                | "greater_than"
                | "greater_than_equal"
                | "less_than"
                | "less_than_equal"
                | "like"
                | "contains"
                | "exists"
                | "all"
                | "near"
                | "within"
                | "intersects"
        )
    }

    /// Builds an operator from its wire name and raw argument.
    ///
    /// List operators given a non-array argument degrade to
    /// [`Operator::Unsupported`]; so do unknown names.
    #[must_use]
    pub fn from_name(name: &str, argument: &Value) -> Operator {
        let as_list = |value: &Value| value.as_array().cloned();
        match name {
            "equals" => Operator::Equals(argument.clone()),
            "not_equals" => Operator::NotEquals(argument.clone()),
            "in" => match as_list(argument) {
                Some(items) => Operator::In(items),
                None => Operator::Unsupported { name: name.to_string() },
            },
            "not_in" => match as_list(argument) {
                Some(items) => Operator::NotIn(items),
                None => Operator::Unsupported { name: name.to_string() },
            },
            "greater_than" => Operator::GreaterThan(argument.clone()),
            "greater_than_equal" => Operator::GreaterThanEqual(argument.clone()),
            "less_than" => Operator::LessThan(argument.clone()),
            "less_than_equal" => Operator::LessThanEqual(argument.clone()),
            "like" => Operator::Like(argument.clone()),
            "contains" => Operator::Contains(argument.clone()),
            "exists" => Operator::Exists(argument.clone()),
            "all" => match as_list(argument) {
                Some(items) => Operator::All(items),
                None => Operator::Unsupported { name: name.to_string() },
            },
            "near" => Operator::Near(argument.clone()),
            "within" => Operator::Within(argument.clone()),
            "intersects" => Operator::Intersects(argument.clone()),
            other => Operator::Unsupported { name: other.to_string() },
        }
    }
}

impl Filter {
    /// Builds a filter tree from untyped caller input.
    ///
    /// Recognized shapes:
    /// - `{"and": [..]}` / `{"or": [..]}` — groups, recursively parsed
    /// - `{"field": {"op": arg, ..}}` — one condition per operator key
    /// - `{"field": {"sub": {..}}}` — non-operator keys recurse with a
    ///   dot-joined path
    /// - `{"field": scalar}` — shorthand for `equals`
    ///
    /// Multiple top-level keys combine with AND. Non-object input yields an
    /// empty (always-true) group — malformed filters degrade, they do not
    /// raise.
    #[must_use]
    pub fn from_json(input: &Value) -> Filter {
        let Some(map) = input.as_object() else {
            return Filter::And(Vec::new());
        };

        let mut nodes = Vec::with_capacity(map.len());
        for (key, value) in map {
            match (key.as_str(), value) {
                (GROUP_AND, Value::Array(items)) => {
                    nodes.push(Filter::And(items.iter().map(Filter::from_json).collect()));
                }
                (GROUP_OR, Value::Array(items)) => {
                    nodes.push(Filter::Or(items.iter().map(Filter::from_json).collect()));
                }
                _ => Self::parse_field(key, value, &mut nodes),
            }
        }

        if nodes.len() == 1 {
            nodes.remove(0)
        } else {
            Filter::And(nodes)
        }
    }

    /// Parses a single field entry, recursing into nested operator maps by
    /// dot-joining the path.
    fn parse_field(path: &str, value: &Value, nodes: &mut Vec<Filter>) {
        let Some(map) = value.as_object() else {
            nodes.push(Filter::Condition {
                path: path.to_string(),
                op: Operator::Equals(value.clone()),
            });
            return;
        };

        for (key, argument) in map {
            if Operator::is_known_name(key) {
                nodes.push(Filter::Condition {
                    path: path.to_string(),
                    op: Operator::from_name(key, argument),
                });
            } else {
                Self::parse_field(&format!("{path}.{key}"), argument, nodes);
            }
        }
    }
}
