//! The declarative query intermediate representation.
//!
//! A `QuerySpec` is the JSON-shaped description of one relational query as
//! accepted from request handlers. Field names and nesting are part of the
//! wire contract (see `schemas/QuerySpec.schema.json`) and must not change.
//! Map-typed fields use `BTreeMap` so the serialized form is deterministic,
//! which the cache layer relies on for key derivation.

use crate::value::ScalarValue;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Page size applied when a request omits `limit` or supplies a
/// non-positive value.
pub const DEFAULT_LIMIT: i64 = 10;

/// One declarative query request.
///
/// All fields are optional on the wire; an empty object is a valid (if
/// useless) query. The spec is immutable once handed to the compiler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuerySpec {
    /// Implicit-equality filter, combined with AND.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub filter: BTreeMap<String, ScalarValue>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub where_raw: Vec<RawCondition>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub where_between: Vec<BetweenCondition>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub where_null: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub where_not_null: Vec<String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub where_in: BTreeMap<String, Vec<ScalarValue>>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub where_not_in: BTreeMap<String, Vec<ScalarValue>>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub where_exists: Vec<ExistsCondition>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub where_groups: Vec<ConditionGroup>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub having: Vec<HavingCondition>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<OrderBy>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aggregates: Vec<Aggregate>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub raw_expressions: Vec<RawExpression>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub window_functions: Vec<WindowFunction>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ctes: Vec<CteDefinition>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recursive_ctes: Vec<RecursiveCte>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub advanced_windows: Vec<AdvancedWindow>,

    /// Result-column type coercions, column name to type name.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub transforms: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationRules>,
}

impl QuerySpec {
    /// The page size to apply: the requested limit when positive, otherwise
    /// [`DEFAULT_LIMIT`].
    pub fn effective_limit(&self) -> i64 {
        match self.limit {
            Some(l) if l > 0 => l,
            _ => DEFAULT_LIMIT,
        }
    }

    /// The row offset to apply: the requested offset when non-negative,
    /// otherwise 0.
    pub fn effective_offset(&self) -> i64 {
        match self.offset {
            Some(o) if o >= 0 => o,
            _ => 0,
        }
    }

    /// Every field name referenced by a filtering clause.
    ///
    /// This is the field universe the validator checks `requiredFields` and
    /// `disallowedFields` against: filter keys, raw wheres, between ranges,
    /// in/not-in keys, and null/not-null lists.
    pub fn referenced_fields(&self) -> BTreeSet<String> {
        let mut fields = BTreeSet::new();
        fields.extend(self.filter.keys().cloned());
        fields.extend(self.where_raw.iter().map(|c| c.field.clone()));
        fields.extend(self.where_between.iter().map(|c| c.field.clone()));
        fields.extend(self.where_in.keys().cloned());
        fields.extend(self.where_not_in.keys().cloned());
        fields.extend(self.where_null.iter().cloned());
        fields.extend(self.where_not_null.iter().cloned());
        fields
    }
}

/// Boolean connective for chained where clauses. AND unless tagged OR.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoolOp {
    #[default]
    And,
    Or,
}

impl fmt::Display for BoolOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoolOp::And => write!(f, "and"),
            BoolOp::Or => write!(f, "or"),
        }
    }
}

/// A raw where clause: `field operator value`, chained with AND/OR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCondition {
    pub field: String,
    pub operator: String,
    pub value: ScalarValue,
    #[serde(default)]
    pub boolean: BoolOp,
}

/// A `BETWEEN` clause over an inclusive `[low, high]` range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetweenCondition {
    pub field: String,
    pub range: [ScalarValue; 2],
}

/// An `EXISTS` clause: a raw sub-select predicate with positional bindings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistsCondition {
    pub query: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<ScalarValue>,
}

/// A grouped set of conditions combined under one boolean connective.
/// Groups nest arbitrarily, forming a boolean tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionGroup {
    #[serde(default)]
    pub boolean: BoolOp,
    pub conditions: Vec<GroupCondition>,
}

/// One entry in a condition group: either a leaf clause or a nested group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupCondition {
    Group(ConditionGroup),
    Clause(RawCondition),
}

/// A `HAVING` clause over a grouped/aggregated column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HavingCondition {
    pub field: String,
    pub operator: String,
    pub value: ScalarValue,
}

/// Sort direction, lowercase on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "asc"),
            SortDirection::Desc => write!(f, "desc"),
        }
    }
}

/// Placement of nulls in an ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullOrdering {
    First,
    Last,
}

impl fmt::Display for NullOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NullOrdering::First => write!(f, "nulls first"),
            NullOrdering::Last => write!(f, "nulls last"),
        }
    }
}

/// One ordering term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nulls: Option<NullOrdering>,
}

/// One aggregate projection. The `type` name is validated by the compiler;
/// unknown names are a hard error, never silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub alias: String,
}

/// A raw select expression with positional bindings, passed through verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawExpression {
    pub expression: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<ScalarValue>,
}

/// A simple window function projection.
///
/// The `type` name is validated by the compiler. The optional `frame` is a
/// literal frame clause appended to the OVER fragment as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowFunction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub alias: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partition_by: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<OrderBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<String>,
}

/// A window function with a structured frame and an optional filter list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedWindow {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub alias: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partition_by: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<OrderBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<FrameSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<RawCondition>,
}

/// A structured window frame clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSpec {
    pub mode: FrameMode,
    pub start: FrameBound,
    pub end: FrameBound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameMode {
    Rows,
    Range,
}

/// One edge of a window frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameBound {
    UnboundedPreceding,
    Preceding { offset: u64 },
    CurrentRow,
    Following { offset: u64 },
    UnboundedFollowing,
}

/// A non-recursive common table expression wrapping a nested spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CteDefinition {
    pub name: String,
    pub query: Box<QuerySpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
}

/// A recursive CTE: initial term unioned with a recursive term.
///
/// The recursive spec is expected to reference the CTE by name; that
/// cross-reference is the storage engine's to resolve, not this layer's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecursiveCte {
    pub name: String,
    pub initial: Box<QuerySpec>,
    pub recursive: Box<QuerySpec>,
    #[serde(default)]
    pub union_all: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
}

/// Per-request cache directive.
///
/// The optional "should this query be cached" predicate is programmatic and
/// not serializable, so it lives on the cache service, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Time to live, in seconds.
    pub ttl: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Per-request validation rules, checked before compilation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationRules {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_limit: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required_fields: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub disallowed_fields: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_complexity: Option<f64>,
}
