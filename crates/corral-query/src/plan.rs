//! Compiled query plans and the builder capability they drive.
//!
//! A [`QueryPlan`] is an ordered sequence of clause applications. The order
//! is produced by the compiler and is load-bearing: later clauses depend on
//! projections established by earlier ones, so consumers must apply ops
//! front to back without reordering.

use corral_core::spec::{BoolOp, NullOrdering, SortDirection};
use corral_core::value::ScalarValue;
use std::fmt;

use crate::error::CompileError;

/// Aggregate functions the compiler understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateKind {
    /// Parse a wire-level aggregate name. Unknown names are a hard error.
    pub fn parse(name: &str) -> Result<Self, CompileError> {
        match name {
            "count" => Ok(AggregateKind::Count),
            "sum" => Ok(AggregateKind::Sum),
            "avg" => Ok(AggregateKind::Avg),
            "min" => Ok(AggregateKind::Min),
            "max" => Ok(AggregateKind::Max),
            other => Err(CompileError::UnsupportedAggregate(other.to_string())),
        }
    }

    /// The SQL function name.
    pub fn function(&self) -> &'static str {
        match self {
            AggregateKind::Count => "COUNT",
            AggregateKind::Sum => "SUM",
            AggregateKind::Avg => "AVG",
            AggregateKind::Min => "MIN",
            AggregateKind::Max => "MAX",
        }
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.function())
    }
}

/// One abstract clause application against a query builder.
#[derive(Debug, Clone, PartialEq)]
pub enum ClauseOp {
    /// Register a non-recursive CTE whose body is itself a compiled plan.
    WithCte {
        name: String,
        columns: Vec<String>,
        body: QueryPlan,
    },

    /// Register a recursive CTE. The union of the two terms is the storage
    /// engine's to perform; the plan only carries both sides and the flag.
    WithRecursiveCte {
        name: String,
        columns: Vec<String>,
        initial: QueryPlan,
        recursive: QueryPlan,
        union_all: bool,
    },

    /// Project an assembled window fragment (`FN(...) OVER (...)`).
    SelectWindow {
        fragment: String,
        bindings: Vec<ScalarValue>,
        alias: String,
    },

    /// Project a raw expression verbatim.
    SelectRaw {
        expression: String,
        bindings: Vec<ScalarValue>,
    },

    /// Project an aggregate.
    SelectAggregate {
        kind: AggregateKind,
        field: Option<String>,
        alias: String,
    },

    /// `field = value` from the implicit-equality filter map.
    WhereEq { field: String, value: ScalarValue },

    /// `field operator value` with an AND/OR connective.
    WhereRaw {
        field: String,
        operator: String,
        value: ScalarValue,
        boolean: BoolOp,
    },

    WhereBetween {
        field: String,
        low: ScalarValue,
        high: ScalarValue,
    },

    WhereNull { field: String },

    WhereNotNull { field: String },

    WhereIn {
        field: String,
        values: Vec<ScalarValue>,
    },

    WhereNotIn {
        field: String,
        values: Vec<ScalarValue>,
    },

    /// `EXISTS (raw sub-select)` with positional bindings.
    WhereExists {
        query: String,
        bindings: Vec<ScalarValue>,
    },

    /// A parenthesized group of where clauses. `ops` contains only
    /// `WhereRaw` and nested `WhereGroup` entries; the first clause of a
    /// group starts the chain unconditionally.
    WhereGroup {
        boolean: BoolOp,
        ops: Vec<ClauseOp>,
    },

    GroupBy { fields: Vec<String> },

    Having {
        field: String,
        operator: String,
        value: ScalarValue,
    },

    OrderBy {
        field: String,
        direction: SortDirection,
        nulls: Option<NullOrdering>,
    },

    Limit { limit: i64 },

    Offset { offset: i64 },
}

impl ClauseOp {
    /// A short name for logs and order assertions.
    pub fn kind(&self) -> &'static str {
        match self {
            ClauseOp::WithCte { .. } => "with_cte",
            ClauseOp::WithRecursiveCte { .. } => "with_recursive_cte",
            ClauseOp::SelectWindow { .. } => "select_window",
            ClauseOp::SelectRaw { .. } => "select_raw",
            ClauseOp::SelectAggregate { .. } => "select_aggregate",
            ClauseOp::WhereEq { .. } => "where_eq",
            ClauseOp::WhereRaw { .. } => "where_raw",
            ClauseOp::WhereBetween { .. } => "where_between",
            ClauseOp::WhereNull { .. } => "where_null",
            ClauseOp::WhereNotNull { .. } => "where_not_null",
            ClauseOp::WhereIn { .. } => "where_in",
            ClauseOp::WhereNotIn { .. } => "where_not_in",
            ClauseOp::WhereExists { .. } => "where_exists",
            ClauseOp::WhereGroup { .. } => "where_group",
            ClauseOp::GroupBy { .. } => "group_by",
            ClauseOp::Having { .. } => "having",
            ClauseOp::OrderBy { .. } => "order_by",
            ClauseOp::Limit { .. } => "limit",
            ClauseOp::Offset { .. } => "offset",
        }
    }
}

/// The ordered operation sequence produced by the compiler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPlan {
    pub ops: Vec<ClauseOp>,
}

impl QueryPlan {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// The abstract query-builder capability compiled plans are applied to.
///
/// Implementations interpret one op at a time: the Postgres adapter renders
/// SQL, test doubles record the sequence. Implementations must not reorder.
pub trait QueryBuilder {
    fn apply(&mut self, op: &ClauseOp) -> anyhow::Result<()>;
}

/// Drive a plan into a builder, front to back.
pub fn apply_plan<B: QueryBuilder + ?Sized>(plan: &QueryPlan, builder: &mut B) -> anyhow::Result<()> {
    for op in &plan.ops {
        builder.apply(op)?;
    }
    Ok(())
}
