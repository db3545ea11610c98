//! Polymorphic property values and scalar-kind coercion.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// The declared scalar kind of a property column. `Date` is stored as
/// `Double` seconds-since-epoch; list-of-date is stored as list-of-double.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarKind {
    Bool,
    Int64,
    Double,
    String,
    Date,
    ListBool,
    ListInt64,
    ListDouble,
    ListString,
    ListDate,
}

impl ScalarKind {
    /// Human-readable name, used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::Int64 => "int64",
            ScalarKind::Double => "double",
            ScalarKind::String => "string",
            ScalarKind::Date => "date",
            ScalarKind::ListBool => "list<bool>",
            ScalarKind::ListInt64 => "list<int64>",
            ScalarKind::ListDouble => "list<double>",
            ScalarKind::ListString => "list<string>",
            ScalarKind::ListDate => "list<date>",
        }
    }

    /// Whether this kind stores one value per list element rather than a
    /// single scalar.
    pub fn is_list(&self) -> bool {
        matches!(
            self,
            ScalarKind::ListBool
                | ScalarKind::ListInt64
                | ScalarKind::ListDouble
                | ScalarKind::ListString
                | ScalarKind::ListDate
        )
    }
}

/// A property value, tagged by runtime shape. `Date` values (scalar and
/// list) are represented as seconds-since-epoch doubles, matching the
/// on-column representation: there is no separate wire type for dates past
/// the coercion boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Int64(i64),
    Double(f64),
    String(String),
    ListBool(Vec<bool>),
    ListInt64(Vec<i64>),
    ListDouble(Vec<f64>),
    ListString(Vec<String>),
}

impl PropertyValue {
    /// Convert to the JSON representation returned at the API boundary.
    pub fn to_json(&self) -> Json {
        match self {
            PropertyValue::Null => Json::Null,
            PropertyValue::Bool(b) => Json::Bool(*b),
            PropertyValue::Int64(i) => Json::from(*i),
            PropertyValue::Double(d) => {
                serde_json::Number::from_f64(*d).map(Json::Number).unwrap_or(Json::Null)
            }
            PropertyValue::String(s) => Json::String(s.clone()),
            PropertyValue::ListBool(v) => Json::Array(v.iter().map(|b| Json::Bool(*b)).collect()),
            PropertyValue::ListInt64(v) => Json::Array(v.iter().map(|i| Json::from(*i)).collect()),
            PropertyValue::ListDouble(v) => Json::Array(
                v.iter()
                    .map(|d| {
                        serde_json::Number::from_f64(*d)
                            .map(Json::Number)
                            .unwrap_or(Json::Null)
                    })
                    .collect(),
            ),
            PropertyValue::ListString(v) => {
                Json::Array(v.iter().map(|s| Json::String(s.clone())).collect())
            }
        }
    }
}

/// Attempt to coerce a JSON value into the shape declared by `kind`,
/// following the table in SPEC_FULL.md §4.3. Returns `None` if the input
/// cannot be coerced; the caller is responsible for tombstoning the cell.
pub fn coerce(kind: ScalarKind, json: &Json) -> Option<PropertyValue> {
    match kind {
        ScalarKind::Bool => json.as_bool().map(PropertyValue::Bool),
        ScalarKind::Int64 => coerce_int64(json).map(PropertyValue::Int64),
        ScalarKind::Double => coerce_double(json).map(PropertyValue::Double),
        ScalarKind::String => json.as_str().map(|s| PropertyValue::String(s.to_string())),
        ScalarKind::Date => coerce_date(json).map(PropertyValue::Double),
        ScalarKind::ListBool => coerce_list(json, |v| v.as_bool()).map(PropertyValue::ListBool),
        ScalarKind::ListInt64 => coerce_list(json, coerce_int64).map(PropertyValue::ListInt64),
        ScalarKind::ListDouble => coerce_list(json, coerce_double).map(PropertyValue::ListDouble),
        ScalarKind::ListString => coerce_list(json, |v| v.as_str().map(str::to_string))
            .map(PropertyValue::ListString),
        ScalarKind::ListDate => coerce_list(json, coerce_date).map(PropertyValue::ListDouble),
    }
}

fn coerce_int64(json: &Json) -> Option<i64> {
    if let Some(i) = json.as_i64() {
        return Some(i);
    }
    // uint64 values that overflow i64::MAX are reinterpreted bit-for-bit as
    // signed, per §4.3's coercion table.
    json.as_u64().map(|u| u as i64)
}

fn coerce_double(json: &Json) -> Option<f64> {
    if let Some(f) = json.as_f64() {
        return Some(f);
    }
    json.as_i64()
        .map(|i| i as f64)
        .or_else(|| json.as_u64().map(|u| u as f64))
}

/// Parse an ISO-8601 string into seconds-since-epoch, or pass numeric inputs
/// through as already-encoded seconds.
fn coerce_date(json: &Json) -> Option<f64> {
    if let Some(f) = coerce_double(json) {
        return Some(f);
    }
    let s = json.as_str()?;
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp() as f64 + dt.timestamp_subsec_nanos() as f64 / 1e9);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.and_utc().timestamp() as f64);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d.and_hms_opt(0, 0, 0)?.and_utc().timestamp() as f64);
    }
    None
}

fn coerce_list<T>(json: &Json, mut elem: impl FnMut(&Json) -> Option<T>) -> Option<Vec<T>> {
    let arr = json.as_array()?;
    arr.iter().map(|v| elem(v)).collect()
}

/// Infer the scalar kind a previously-undeclared property should take on,
/// from the shape of the first value written to it. Strings are never
/// inferred as `Date`: date columns must be declared explicitly.
pub fn infer_kind(json: &Json) -> Option<ScalarKind> {
    match json {
        Json::Bool(_) => Some(ScalarKind::Bool),
        Json::Number(n) if n.is_i64() || n.is_u64() => Some(ScalarKind::Int64),
        Json::Number(_) => Some(ScalarKind::Double),
        Json::String(_) => Some(ScalarKind::String),
        Json::Array(items) => match items.first() {
            None => None,
            Some(Json::Bool(_)) => Some(ScalarKind::ListBool),
            Some(Json::Number(n)) if n.is_i64() || n.is_u64() => Some(ScalarKind::ListInt64),
            Some(Json::Number(_)) => Some(ScalarKind::ListDouble),
            Some(Json::String(_)) => Some(ScalarKind::ListString),
            _ => None,
        },
        Json::Null => None,
        Json::Object(_) => None,
    }
}
