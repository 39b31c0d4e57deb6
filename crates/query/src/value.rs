//! Typed bound values for SQL placeholders.
//!
//! Every literal in a compiled predicate is bound under a named placeholder;
//! [`SqlValue`] is the closed set of shapes a binding can take. Types are
//! assigned by runtime inspection of the caller's JSON input, never by
//! schema lookup.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// A value bound to a placeholder in a compiled predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL. Also the fallback for non-finite floats.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// Finite 64-bit float.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// Timestamp with millisecond precision.
    DateTime(DateTime<Utc>),
    /// JSON-serialized structure (arrays and objects bind as their wire
    /// form rather than being rejected).
    Json(String),
}

impl SqlValue {
    /// Types a JSON value by runtime inspection.
    ///
    /// Arrays and objects are serialized and bound as JSON text. Numbers
    /// outside the finite range bind as NULL rather than reject.
    #[must_use]
    pub fn from_json(value: &Value) -> SqlValue {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlValue::Int(i)
                } else if let Some(f) = n.as_f64() {
                    SqlValue::from_f64(f)
                } else {
                    // u64 beyond i64::MAX: keep the textual form.
                    SqlValue::Text(n.to_string())
                }
            }
            Value::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Json(other.to_string()),
        }
    }

    /// Wraps a float, degrading NaN and infinities to NULL.
    #[must_use]
    pub fn from_f64(value: f64) -> SqlValue {
        if value.is_finite() { SqlValue::Float(value) } else { SqlValue::Null }
    }

    /// Backend type name used inside `{name:Type}` placeholders.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "Nullable(String)",
            SqlValue::Bool(_) => "Bool",
            SqlValue::Int(_) => "Int64",
            SqlValue::Float(_) => "Float64",
            SqlValue::Text(_) => "String",
            SqlValue::DateTime(_) => "DateTime64(3)",
            SqlValue::Json(_) => "String",
        }
    }

    /// The bound value in self-describing JSON form, for transports and
    /// test assertions.
    #[must_use]
    pub fn as_json(&self) -> Value {
        match self {
            SqlValue::Null => Value::Null,
            SqlValue::Bool(b) => Value::Bool(*b),
            SqlValue::Int(i) => Value::from(*i),
            SqlValue::Float(f) => Value::from(*f),
            SqlValue::Text(s) => Value::String(s.clone()),
            SqlValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
            SqlValue::Json(s) => Value::String(s.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_runtime_typing() {
        assert_eq!(SqlValue::from_json(&json!(null)), SqlValue::Null);
        assert_eq!(SqlValue::from_json(&json!(true)), SqlValue::Bool(true));
        assert_eq!(SqlValue::from_json(&json!(42)), SqlValue::Int(42));
        assert_eq!(SqlValue::from_json(&json!(1.5)), SqlValue::Float(1.5));
        assert_eq!(SqlValue::from_json(&json!("hi")), SqlValue::Text("hi".into()));
    }

    #[test]
    fn test_structures_bind_as_json_text() {
        let v = SqlValue::from_json(&json!({"a": [1, 2]}));
        assert_eq!(v, SqlValue::Json(r#"{"a":[1,2]}"#.into()));
        assert_eq!(v.type_name(), "String");
    }

    #[test]
    fn test_non_finite_floats_bind_as_null() {
        assert_eq!(SqlValue::from_f64(f64::NAN), SqlValue::Null);
        assert_eq!(SqlValue::from_f64(f64::INFINITY), SqlValue::Null);
        assert_eq!(SqlValue::from_f64(f64::NEG_INFINITY), SqlValue::Null);
        assert_eq!(SqlValue::from_f64(0.25), SqlValue::Float(0.25));
    }

    #[test]
    fn test_type_names() {
        assert_eq!(SqlValue::Int(1).type_name(), "Int64");
        assert_eq!(SqlValue::Text("x".into()).type_name(), "String");
        assert_eq!(SqlValue::DateTime(Utc::now()).type_name(), "DateTime64(3)");
    }
}
