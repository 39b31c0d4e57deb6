//! Filter-tree to SQL predicate compilation.
//!
//! Produces a boolean expression over bound `{name:Type}` placeholders plus
//! the flat placeholder→value map. Two hard rules hold everywhere:
//!
//! - **Values are always bound.** Every literal goes through [`Compiler::bind`]
//!   under a fresh placeholder; no value is ever concatenated into SQL text.
//! - **Identifiers are always sanitized.** Field paths that are not on the
//!   physical-column allow-list are stripped to `[A-Za-z0-9_.\[\]]` before
//!   being embedded, and the two mechanisms never mix in one expression.
//!
//! Semantically invalid operator input (malformed geometry, non-boolean
//! `exists`, unknown operators) degrades to an always-true predicate with a
//! `tracing::warn!`. This fail-open policy is deliberate: optional filters
//! must not take down a read. The cost is that a caller typo silently
//! yields unfiltered results — see DESIGN.md before "fixing" this.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::warn;

use crate::filter::{Filter, Operator};
use crate::value::SqlValue;

/// Physical columns matched verbatim in field paths. Everything else is a
/// JSON payload sub-path.
pub const PHYSICAL_COLUMNS: &[&str] = &[
    "namespace",
    "collection",
    "id",
    "version",
    "title",
    "created_at",
    "updated_at",
    "deleted_at",
    "created_by",
    "updated_by",
];

/// Physical columns holding timestamps; textual ordering operands against
/// these parse as timestamps first.
pub const TIMESTAMP_COLUMNS: &[&str] = &["created_at", "updated_at"];

/// Predicate that matches every row.
pub const ALWAYS_TRUE: &str = "1 = 1";

/// Predicate that matches no row.
pub const ALWAYS_FALSE: &str = "1 = 0";

/// A compiled predicate: SQL text plus its placeholder bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledWhere {
    /// Boolean SQL expression over `{name:Type}` placeholders.
    pub sql: String,
    /// Placeholder name → bound value.
    pub params: BTreeMap<String, SqlValue>,
}

/// Compiles a filter tree with a fresh binding context.
#[must_use]
pub fn compile(filter: &Filter) -> CompiledWhere {
    let mut compiler = Compiler::new();
    let sql = compiler.predicate(filter);
    CompiledWhere { sql, params: compiler.finish() }
}

/// ANDs a mandatory scoping predicate with an optional extra predicate.
///
/// Returns `base` unchanged when `extra` is empty or whitespace.
#[must_use]
pub fn combine_where(base: &str, extra: &str) -> String {
    let extra = extra.trim();
    if extra.is_empty() { base.to_string() } else { format!("{base} AND ({extra})") }
}

/// A field path resolved against the physical-column allow-list.
enum ResolvedField {
    /// A physical column, emitted verbatim.
    Physical(String),
    /// A sanitized dotted path into the JSON payload.
    Payload(String),
}

impl ResolvedField {
    /// Scalar SQL expression for this field.
    fn sql(&self) -> String {
        match self {
            ResolvedField::Physical(column) => column.clone(),
            ResolvedField::Payload(path) => format!("JSON_VALUE(payload, '$.{path}')"),
        }
    }

    /// Numeric expression for one element of a `[lon, lat]` payload pair.
    fn coordinate_sql(&self, index: usize) -> String {
        match self {
            ResolvedField::Physical(column) => format!("toFloat64OrZero({column})"),
            ResolvedField::Payload(path) => {
                format!("toFloat64OrZero(JSON_VALUE(payload, '$.{path}[{index}]'))")
            }
        }
    }

    /// Expression yielding the raw JSON elements of a list-valued payload
    /// field.
    fn array_sql(&self) -> String {
        match self {
            ResolvedField::Physical(column) => column.clone(),
            ResolvedField::Payload(path) => {
                format!("JSONExtractArrayRaw(JSON_QUERY(payload, '$.{path}'))")
            }
        }
    }

    fn is_payload(&self) -> bool {
        matches!(self, ResolvedField::Payload(_))
    }
}

/// Resolves a dotted field path: allow-listed physical columns verbatim,
/// everything else a sanitized payload sub-path.
fn resolve_field(path: &str) -> ResolvedField {
    if PHYSICAL_COLUMNS.contains(&path) {
        return ResolvedField::Physical(path.to_string());
    }
    let clean: String = path
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '[' | ']'))
        .collect();
    ResolvedField::Payload(clean)
}

/// Parses a textual timestamp operand: RFC 3339, `YYYY-MM-DD HH:MM:SS`, or
/// a bare date.
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

/// Validates a `[lon, lat]` pair: exactly two finite numbers in range.
fn lon_lat(value: &Value) -> Option<(f64, f64)> {
    let pair = value.as_array()?;
    if pair.len() != 2 {
        return None;
    }
    let lon = pair[0].as_f64()?;
    let lat = pair[1].as_f64()?;
    if !lon.is_finite() || !lat.is_finite() {
        return None;
    }
    if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
        return None;
    }
    Some((lon, lat))
}

/// The binding context for one statement.
///
/// A single compiler instance can bind scoping values (namespace,
/// collection, id) and compile a caller filter, so every placeholder in the
/// statement stays unique.
#[derive(Debug, Default)]
pub struct Compiler {
    params: BTreeMap<String, SqlValue>,
    next: usize,
}

impl Compiler {
    /// Creates an empty binding context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a value under a fresh placeholder, returning the placeholder
    /// expression to embed.
    pub fn bind(&mut self, value: SqlValue) -> String {
        let name = format!("p{}", self.next);
        self.next += 1;
        let placeholder = format!("{{{name}:{}}}", value.type_name());
        self.params.insert(name, value);
        placeholder
    }

    /// Binds a JSON literal, typing it by runtime inspection.
    pub fn bind_json(&mut self, value: &Value) -> String {
        self.bind(SqlValue::from_json(value))
    }

    /// Consumes the compiler, returning the placeholder map.
    #[must_use]
    pub fn finish(self) -> BTreeMap<String, SqlValue> {
        self.params
    }

    /// Compiles a filter node to a boolean SQL expression.
    pub fn predicate(&mut self, filter: &Filter) -> String {
        match filter {
            Filter::And(children) => self.group(children, " AND "),
            Filter::Or(children) => self.group(children, " OR "),
            Filter::Condition { path, op } => self.condition(path, op),
        }
    }

    fn group(&mut self, children: &[Filter], joiner: &str) -> String {
        match children.len() {
            0 => ALWAYS_TRUE.to_string(),
            1 => self.predicate(&children[0]),
            _ => {
                let parts: Vec<String> = children.iter().map(|c| self.predicate(c)).collect();
                format!("({})", parts.join(joiner))
            }
        }
    }

    fn condition(&mut self, path: &str, op: &Operator) -> String {
        let field = resolve_field(path);
        if let ResolvedField::Payload(clean) = &field {
            if clean.is_empty() {
                warn!(field = %path, "field path empty after sanitizing; degrading to always-true");
                return ALWAYS_TRUE.to_string();
            }
        }

        match op {
            Operator::Equals(v) => {
                if v.is_null() {
                    format!("{} IS NULL", field.sql())
                } else {
                    let ph = self.bind_json(v);
                    format!("{} = {ph}", field.sql())
                }
            }
            Operator::NotEquals(v) => {
                if v.is_null() {
                    format!("{} IS NOT NULL", field.sql())
                } else {
                    let ph = self.bind_json(v);
                    let expr = field.sql();
                    if field.is_payload() {
                        // A missing payload value counts as "not equal" to
                        // any concrete value.
                        format!("({expr} IS NULL OR {expr} != {ph})")
                    } else {
                        format!("{expr} != {ph}")
                    }
                }
            }
            Operator::In(items) => {
                if items.is_empty() {
                    return ALWAYS_FALSE.to_string();
                }
                let phs: Vec<String> = items.iter().map(|v| self.bind_json(v)).collect();
                format!("{} IN ({})", field.sql(), phs.join(", "))
            }
            Operator::NotIn(items) => {
                if items.is_empty() {
                    return ALWAYS_TRUE.to_string();
                }
                let phs: Vec<String> = items.iter().map(|v| self.bind_json(v)).collect();
                format!("{} NOT IN ({})", field.sql(), phs.join(", "))
            }
            Operator::GreaterThan(v) => self.ordering(&field, ">", v),
            Operator::GreaterThanEqual(v) => self.ordering(&field, ">=", v),
            Operator::LessThan(v) => self.ordering(&field, "<", v),
            Operator::LessThanEqual(v) => self.ordering(&field, "<=", v),
            Operator::Like(v) => match v.as_str() {
                Some(pattern) => {
                    let ph = self.bind(SqlValue::Text(pattern.to_string()));
                    format!("{} ILIKE {ph}", field.sql())
                }
                None => self.degrade(path, "like"),
            },
            Operator::Contains(v) => match v.as_str() {
                Some(needle) => {
                    let ph = self.bind(SqlValue::Text(needle.to_string()));
                    format!("positionCaseInsensitive({}, {ph}) > 0", field.sql())
                }
                None => self.degrade(path, "contains"),
            },
            Operator::Exists(v) => match v.as_bool() {
                Some(true) => format!("{} IS NOT NULL", field.sql()),
                Some(false) => format!("{} IS NULL", field.sql()),
                None => self.degrade(path, "exists"),
            },
            Operator::All(items) => {
                if !field.is_payload() {
                    return self.degrade(path, "all");
                }
                if items.is_empty() {
                    // Every element of the empty set is vacuously present.
                    return ALWAYS_TRUE.to_string();
                }
                // Elements bind in their raw JSON form to match the raw
                // elements JSONExtractArrayRaw yields.
                let phs: Vec<String> =
                    items.iter().map(|v| self.bind(SqlValue::Json(v.to_string()))).collect();
                format!("hasAll({}, [{}])", field.array_sql(), phs.join(", "))
            }
            Operator::Near(v) => self.near(&field, path, v),
            Operator::Within(v) | Operator::Intersects(v) => self.within(&field, path, v),
            Operator::Unsupported { name } => self.degrade(path, name),
        }
    }

    fn ordering(&mut self, field: &ResolvedField, op: &str, v: &Value) -> String {
        let bound = match (field, v) {
            (ResolvedField::Physical(column), Value::String(text))
                if TIMESTAMP_COLUMNS.contains(&column.as_str()) =>
            {
                match parse_timestamp(text) {
                    Some(dt) => SqlValue::DateTime(dt),
                    None => SqlValue::Text(text.clone()),
                }
            }
            _ => SqlValue::from_json(v),
        };
        let ph = self.bind(bound);
        format!("{} {op} {ph}", field.sql())
    }

    /// Distance test: argument `{"coordinates": [lon, lat], "radius": meters}`
    /// (accepting `center` and `max_distance` aliases).
    fn near(&mut self, field: &ResolvedField, path: &str, v: &Value) -> String {
        let center = v.get("coordinates").or_else(|| v.get("center")).and_then(lon_lat);
        let radius = v
            .get("radius")
            .or_else(|| v.get("max_distance"))
            .and_then(Value::as_f64)
            .filter(|r| r.is_finite() && *r >= 0.0);

        let (Some((lon, lat)), Some(radius)) = (center, radius) else {
            return self.degrade(path, "near");
        };

        let lon_ph = self.bind(SqlValue::Float(lon));
        let lat_ph = self.bind(SqlValue::Float(lat));
        let radius_ph = self.bind(SqlValue::Float(radius));
        format!(
            "greatCircleDistance({}, {}, {lon_ph}, {lat_ph}) <= {radius_ph}",
            field.coordinate_sql(0),
            field.coordinate_sql(1),
        )
    }

    /// Containment test against a polygon ring. The stored geometry is a
    /// point, so `within` and `intersects` compile identically.
    fn within(&mut self, field: &ResolvedField, path: &str, v: &Value) -> String {
        let ring = match v {
            Value::Object(map) => match (map.get("type").and_then(Value::as_str), map.get("coordinates")) {
                (Some("Polygon"), Some(Value::Array(rings))) => rings.first(),
                _ => None,
            },
            Value::Array(_) => Some(v),
            _ => None,
        };

        let vertices: Option<Vec<(f64, f64)>> = ring
            .and_then(Value::as_array)
            .map(|items| items.iter().map(lon_lat).collect::<Option<Vec<_>>>())
            .flatten()
            .filter(|ring| ring.len() >= 3);

        let Some(vertices) = vertices else {
            return self.degrade(path, "within");
        };

        let points: Vec<String> = vertices
            .into_iter()
            .map(|(lon, lat)| {
                let lon_ph = self.bind(SqlValue::Float(lon));
                let lat_ph = self.bind(SqlValue::Float(lat));
                format!("({lon_ph}, {lat_ph})")
            })
            .collect();
        format!(
            "pointInPolygon(({}, {}), [{}])",
            field.coordinate_sql(0),
            field.coordinate_sql(1),
            points.join(", "),
        )
    }

    /// Fail-open: log and match everything.
    fn degrade(&mut self, path: &str, operator: &str) -> String {
        warn!(
            field = %path,
            operator = %operator,
            "malformed or unsupported filter argument; degrading to always-true"
        );
        ALWAYS_TRUE.to_string()
    }
}
