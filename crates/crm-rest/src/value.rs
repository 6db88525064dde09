//! Field values, runtime type inference, and value conversion.
//!
//! Fields are dynamically typed: the type of a field is decided once, from
//! the first value it is given, and later assignments are coerced into that
//! type. Inference looks at the value's shape only, with one ordering rule
//! that matters: a GUID-shaped string is a lookup, and must be recognized
//! before date parsing gets a chance to misread it.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::entity::Reference;

/// The inferred type of a field, fixed at field creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// A relationship to another entity.
    Lookup,
    /// A boolean.
    TwoOptions,
    /// A floating-point number.
    Decimal,
    /// A calendar date and time.
    DateTime,
    /// Anything else.
    String,
}

/// A dynamically typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// `None` is the invalid-date sentinel: a value that failed date
    /// conversion but still belongs to a `DateTime` field. It serializes
    /// as JSON null.
    DateTime(Option<DateTime<FixedOffset>>),
    Reference(Reference),
    Array(Vec<FieldValue>),
    /// An opaque JSON object carried through untouched.
    Json(serde_json::Value),
}

impl FieldValue {
    /// Whether the value is present.
    pub fn is_set(&self) -> bool {
        !matches!(self, FieldValue::Null)
    }

    /// The reference inside a `Reference` value.
    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            FieldValue::Reference(r) => Some(r),
            _ => None,
        }
    }

    /// The string inside a `String` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Build a value from parsed JSON.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Bool(b),
            serde_json::Value::Number(n) => {
                FieldValue::Number(n.as_f64().unwrap_or(f64::NAN))
            }
            serde_json::Value::String(s) => FieldValue::String(s),
            serde_json::Value::Array(items) => {
                FieldValue::Array(items.into_iter().map(FieldValue::from_json).collect())
            }
            obj @ serde_json::Value::Object(_) => FieldValue::Json(obj),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null | FieldValue::DateTime(None) => Ok(()),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Number(n) => {
                if n.is_finite() && n.fract() == 0.0 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            FieldValue::String(s) => f.write_str(s),
            FieldValue::DateTime(Some(d)) => write!(f, "{}", d.to_rfc3339()),
            FieldValue::Reference(r) => f.write_str(&r.id),
            FieldValue::Array(_) | FieldValue::Json(_) => write!(f, "{}", to_wire(self)),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<i32> for FieldValue {
    fn from(n: i32) -> Self {
        FieldValue::Number(n as f64)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Number(n as f64)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<Reference> for FieldValue {
    fn from(r: Reference) -> Self {
        FieldValue::Reference(r)
    }
}

impl From<DateTime<FixedOffset>> for FieldValue {
    fn from(d: DateTime<FixedOffset>) -> Self {
        FieldValue::DateTime(Some(d))
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(items: Vec<FieldValue>) -> Self {
        FieldValue::Array(items)
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        FieldValue::from_json(value)
    }
}

/// GUID in canonical 8-4-4-4-12 form, any casing, no braces.
static GUID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[1-5][0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$",
    )
    .unwrap()
});

/// Infer a field type from a value's shape.
///
/// Predicates run in a fixed order; the GUID check comes before date parsing
/// so GUID-shaped strings classify as lookups.
pub fn infer_type(value: &FieldValue) -> FieldType {
    match value {
        FieldValue::Reference(_) | FieldValue::Array(_) => FieldType::Lookup,
        FieldValue::Bool(_) => FieldType::TwoOptions,
        FieldValue::Number(_) => FieldType::Decimal,
        FieldValue::DateTime(_) => FieldType::DateTime,
        FieldValue::String(s) => {
            if GUID_PATTERN.is_match(s) {
                FieldType::Lookup
            } else if parse_datetime(s).is_some() {
                FieldType::DateTime
            } else {
                FieldType::String
            }
        }
        FieldValue::Null | FieldValue::Json(_) => FieldType::String,
    }
}

/// Coerce a value into a field type.
///
/// Conversion never fails; values that cannot be represented in the target
/// type come out as sentinels (`NaN` for numbers, the invalid-date marker
/// for dates), both of which serialize as JSON null.
pub fn convert(value: FieldValue, target: FieldType) -> FieldValue {
    if let FieldValue::Null = value {
        return FieldValue::Null;
    }
    match target {
        FieldType::Lookup => value,
        FieldType::TwoOptions => FieldValue::Bool(match &value {
            FieldValue::Bool(b) => *b,
            FieldValue::String(s) => s == "true",
            _ => false,
        }),
        FieldType::Decimal => FieldValue::Number(match value {
            FieldValue::Number(n) => n,
            FieldValue::String(s) => s.trim().parse().unwrap_or(f64::NAN),
            _ => f64::NAN,
        }),
        FieldType::DateTime => FieldValue::DateTime(match value {
            FieldValue::DateTime(d) => d,
            FieldValue::String(s) => parse_datetime(&s),
            FieldValue::Number(n) => Utc
                .timestamp_millis_opt(n as i64)
                .single()
                .map(|d| d.fixed_offset()),
            _ => None,
        }),
        FieldType::String => FieldValue::String(value.to_string()),
    }
}

/// Serialize a value for the wire. `NaN` and the invalid-date sentinel both
/// become null.
pub fn to_wire(value: &FieldValue) -> serde_json::Value {
    match value {
        FieldValue::Null => serde_json::Value::Null,
        FieldValue::Bool(b) => serde_json::Value::Bool(*b),
        FieldValue::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        FieldValue::String(s) => serde_json::Value::String(s.clone()),
        FieldValue::DateTime(Some(d)) => serde_json::Value::String(d.to_rfc3339()),
        FieldValue::DateTime(None) => serde_json::Value::Null,
        FieldValue::Reference(r) => serde_json::json!({
            "Id": r.id,
            "LogicalName": r.logical_name,
        }),
        FieldValue::Array(items) => {
            serde_json::Value::Array(items.iter().map(to_wire).collect())
        }
        FieldValue::Json(v) => v.clone(),
    }
}

/// Parse the date formats the service and its callers actually exchange.
fn parse_datetime(s: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Some(d);
    }
    if let Ok(d) = DateTime::parse_from_rfc2822(s) {
        return Some(d);
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc().fixed_offset());
        }
    }
    for format in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(date.and_hms_opt(0, 0, 0)?.and_utc().fixed_offset());
        }
    }
    None
}
