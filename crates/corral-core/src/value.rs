//! Tagged scalar values for rows, bindings, and rule comparisons.
//!
//! Rows coming back from the storage collaborator and values embedded in the
//! query IR are untrusted JSON. Converting them into a tagged `ScalarValue`
//! keeps comparisons in the permission evaluator well-defined: a `fieldCheck`
//! rule compares two `ScalarValue`s, never two untyped blobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A result row: column name to tagged value.
pub type Row = BTreeMap<String, ScalarValue>;

/// A single typed column value.
///
/// Serialization is untagged so the wire shape stays plain JSON. On the way
/// in, JSON arrays and objects land in the `Json` variant; `Bytes` and
/// `DateTime` are only produced by adapters that know the column type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    DateTime(DateTime<Utc>),
    Json(serde_json::Value),
    Bytes(Vec<u8>),
}

impl ScalarValue {
    /// Convert an untrusted JSON value into a tagged value.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => ScalarValue::Null,
            serde_json::Value::Bool(b) => ScalarValue::Bool(b),
            serde_json::Value::Number(n) => {
                ScalarValue::Number(n.as_f64().unwrap_or(f64::NAN))
            }
            serde_json::Value::String(s) => ScalarValue::String(s),
            other => ScalarValue::Json(other),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScalarValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Interpret this value as a list of tagged values, if it holds one.
    ///
    /// `fieldCheck` rules with the `in`/`notIn` operators carry their
    /// expected value as a JSON array.
    pub fn as_list(&self) -> Option<Vec<ScalarValue>> {
        match self {
            ScalarValue::Json(serde_json::Value::Array(items)) => {
                Some(items.iter().cloned().map(ScalarValue::from_json).collect())
            }
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "null"),
            ScalarValue::Bool(b) => write!(f, "{}", b),
            ScalarValue::Number(n) => write!(f, "{}", n),
            ScalarValue::String(s) => write!(f, "{}", s),
            ScalarValue::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            ScalarValue::Json(v) => write!(f, "{}", v),
            ScalarValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(s: &str) -> Self {
        ScalarValue::String(s.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(s: String) -> Self {
        ScalarValue::String(s)
    }
}

impl From<f64> for ScalarValue {
    fn from(n: f64) -> Self {
        ScalarValue::Number(n)
    }
}

impl From<i64> for ScalarValue {
    fn from(n: i64) -> Self {
        ScalarValue::Number(n as f64)
    }
}

impl From<bool> for ScalarValue {
    fn from(b: bool) -> Self {
        ScalarValue::Bool(b)
    }
}

/// Convert a JSON object into a typed row. Non-object input yields `None`.
pub fn row_from_json(value: &serde_json::Value) -> Option<Row> {
    let obj = value.as_object()?;
    Some(
        obj.iter()
            .map(|(k, v)| (k.clone(), ScalarValue::from_json(v.clone())))
            .collect(),
    )
}
