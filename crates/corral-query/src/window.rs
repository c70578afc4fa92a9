//! Window function fragment assembly.
//!
//! The compiler assembles the function call and OVER fragments as text;
//! values referenced by advanced-window filters stay positional bindings.
//! Absent sub-parts are omitted without dangling separators.

use corral_core::spec::{
    AdvancedWindow, FrameBound, FrameMode, FrameSpec, OrderBy, WindowFunction,
};
use corral_core::value::ScalarValue;

use crate::error::CompileError;

/// Window function types the compiler understands, beyond plain aggregates.
const RANKING_AND_OFFSET: &[&str] = &[
    "rank",
    "dense_rank",
    "lag",
    "lead",
    "first_value",
    "last_value",
];

const AGGREGATE_NAMES: &[&str] = &["count", "sum", "avg", "min", "max"];

/// Assemble a simple window projection: `FN(...) OVER (...)`.
pub(crate) fn window_fragment(window: &WindowFunction) -> Result<String, CompileError> {
    let call = function_call(&window.kind, window.field.as_deref())?;
    let over = over_clause(
        &window.partition_by,
        &window.order_by,
        window.frame.as_deref(),
    );
    Ok(format!("{} OVER ({})", call, over))
}

/// Assemble an advanced window projection. Filter clauses become a
/// `FILTER (WHERE ...)` section with positional bindings, returned alongside
/// the fragment.
pub(crate) fn advanced_window_fragment(
    window: &AdvancedWindow,
) -> Result<(String, Vec<ScalarValue>), CompileError> {
    let call = function_call(&window.kind, window.field.as_deref())?;

    let mut bindings = Vec::new();
    let filter = if window.filters.is_empty() {
        String::new()
    } else {
        let mut predicates = Vec::with_capacity(window.filters.len());
        for condition in &window.filters {
            predicates.push(format!("{} {} ?", condition.field, condition.operator));
            bindings.push(condition.value.clone());
        }
        format!(" FILTER (WHERE {})", predicates.join(" AND "))
    };

    let frame = window.frame.as_ref().map(render_frame);
    let over = over_clause(&window.partition_by, &window.order_by, frame.as_deref());

    Ok((format!("{}{} OVER ({})", call, filter, over), bindings))
}

/// The function-call fragment. `row_number` takes no argument; every other
/// known type applies to its field, or `*` when no field is given.
fn function_call(kind: &str, field: Option<&str>) -> Result<String, CompileError> {
    if kind == "row_number" {
        return Ok("ROW_NUMBER()".to_string());
    }
    if RANKING_AND_OFFSET.contains(&kind) || AGGREGATE_NAMES.contains(&kind) {
        return Ok(format!("{}({})", kind.to_uppercase(), field.unwrap_or("*")));
    }
    Err(CompileError::UnsupportedWindow(kind.to_string()))
}

/// The OVER fragment body: partition, ordering, then frame, space-joined,
/// each part present only when non-empty.
fn over_clause(partition_by: &[String], order_by: &[OrderBy], frame: Option<&str>) -> String {
    let mut parts = Vec::new();

    if !partition_by.is_empty() {
        parts.push(format!("PARTITION BY {}", partition_by.join(", ")));
    }

    if !order_by.is_empty() {
        let terms: Vec<String> = order_by.iter().map(order_term).collect();
        parts.push(format!("ORDER BY {}", terms.join(", ")));
    }

    if let Some(frame) = frame {
        let frame = frame.trim();
        if !frame.is_empty() {
            parts.push(frame.to_string());
        }
    }

    parts.join(" ")
}

fn order_term(order: &OrderBy) -> String {
    match order.nulls {
        Some(nulls) => format!("{} {} {}", order.field, order.direction, nulls),
        None => format!("{} {}", order.field, order.direction),
    }
}

/// Render a structured frame as its SQL clause.
fn render_frame(frame: &FrameSpec) -> String {
    let mode = match frame.mode {
        FrameMode::Rows => "ROWS",
        FrameMode::Range => "RANGE",
    };
    format!(
        "{} BETWEEN {} AND {}",
        mode,
        render_bound(&frame.start),
        render_bound(&frame.end)
    )
}

fn render_bound(bound: &FrameBound) -> String {
    match bound {
        FrameBound::UnboundedPreceding => "UNBOUNDED PRECEDING".to_string(),
        FrameBound::Preceding { offset } => format!("{} PRECEDING", offset),
        FrameBound::CurrentRow => "CURRENT ROW".to_string(),
        FrameBound::Following { offset } => format!("{} FOLLOWING", offset),
        FrameBound::UnboundedFollowing => "UNBOUNDED FOLLOWING".to_string(),
    }
}
