//! Result-column type coercion.
//!
//! A spec's `transforms` map names result columns and the type each should
//! be coerced to. Type names are validated at compile time (unknown names
//! are hard errors); coercion itself runs after execution and is lenient —
//! a value that cannot be converted is left as it came back from storage.

use chrono::{DateTime, Utc};
use corral_core::value::{Row, ScalarValue};
use std::collections::BTreeMap;

use crate::error::CompileError;

/// Target types a transform may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Int,
    BigInt,
    Float,
    Decimal,
    Bool,
    Date,
    DateTime,
    Json,
}

impl ColumnType {
    /// Parse a wire-level type name, accepting common aliases.
    pub fn parse(column: &str, name: &str) -> Result<Self, CompileError> {
        match name {
            "string" | "text" => Ok(ColumnType::String),
            "int" | "integer" => Ok(ColumnType::Int),
            "bigint" => Ok(ColumnType::BigInt),
            "float" | "double" => Ok(ColumnType::Float),
            "decimal" | "numeric" => Ok(ColumnType::Decimal),
            "bool" | "boolean" => Ok(ColumnType::Bool),
            "date" => Ok(ColumnType::Date),
            "datetime" | "timestamp" => Ok(ColumnType::DateTime),
            "json" | "jsonb" => Ok(ColumnType::Json),
            other => Err(CompileError::UnknownColumnType {
                column: column.to_string(),
                ty: other.to_string(),
            }),
        }
    }
}

/// Apply a spec's transforms to a batch of result rows in place.
///
/// Assumes the type names were already validated during compilation; an
/// unknown name here is skipped rather than failing a query that already
/// executed.
pub fn apply_transforms(transforms: &BTreeMap<String, String>, rows: &mut [Row]) {
    if transforms.is_empty() {
        return;
    }

    let parsed: Vec<(&String, ColumnType)> = transforms
        .iter()
        .filter_map(|(column, name)| {
            ColumnType::parse(column, name).ok().map(|ty| (column, ty))
        })
        .collect();

    for row in rows.iter_mut() {
        for (column, ty) in &parsed {
            if let Some(value) = row.get_mut(*column) {
                *value = coerce(value, *ty);
            }
        }
    }
}

/// Best-effort coercion; returns the original value when conversion does
/// not apply.
fn coerce(value: &ScalarValue, ty: ColumnType) -> ScalarValue {
    match ty {
        ColumnType::String => match value {
            ScalarValue::Null | ScalarValue::String(_) => value.clone(),
            other => ScalarValue::String(other.to_string()),
        },
        ColumnType::Int | ColumnType::BigInt => match value {
            ScalarValue::Number(n) => ScalarValue::Number(n.trunc()),
            ScalarValue::String(s) => s
                .trim()
                .parse::<f64>()
                .map(|n| ScalarValue::Number(n.trunc()))
                .unwrap_or_else(|_| value.clone()),
            ScalarValue::Bool(b) => ScalarValue::Number(if *b { 1.0 } else { 0.0 }),
            other => other.clone(),
        },
        ColumnType::Float | ColumnType::Decimal => match value {
            ScalarValue::Number(_) => value.clone(),
            ScalarValue::String(s) => s
                .trim()
                .parse::<f64>()
                .map(ScalarValue::Number)
                .unwrap_or_else(|_| value.clone()),
            other => other.clone(),
        },
        ColumnType::Bool => match value {
            ScalarValue::Bool(_) => value.clone(),
            ScalarValue::Number(n) => ScalarValue::Bool(*n != 0.0),
            ScalarValue::String(s) => match s.as_str() {
                "true" | "t" | "1" => ScalarValue::Bool(true),
                "false" | "f" | "0" => ScalarValue::Bool(false),
                _ => value.clone(),
            },
            other => other.clone(),
        },
        ColumnType::Date | ColumnType::DateTime => match value {
            ScalarValue::DateTime(_) => value.clone(),
            ScalarValue::String(s) => s
                .parse::<DateTime<Utc>>()
                .map(ScalarValue::DateTime)
                .unwrap_or_else(|_| value.clone()),
            other => other.clone(),
        },
        ColumnType::Json => match value {
            ScalarValue::Json(_) => value.clone(),
            ScalarValue::String(s) => serde_json::from_str::<serde_json::Value>(s)
                .map(ScalarValue::Json)
                .unwrap_or_else(|_| value.clone()),
            other => other.clone(),
        },
    }
}
