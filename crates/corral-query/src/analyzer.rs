//! Static validation and complexity analysis over query specs.
//!
//! Validation accumulates every violation before reporting; a request is
//! rejected once, with the full list. The complexity score is a weighted
//! heuristic, exactly reproducible so thresholds behave the same across
//! deployments.

use corral_core::spec::{ConditionGroup, GroupCondition, QuerySpec, ValidationRules};
use serde::Deserialize;
use std::collections::BTreeSet;

use crate::error::{ValidationError, Violation};

/// Clause weights for the complexity score.
const WEIGHT_WHERE_RAW: f64 = 1.0;
const WEIGHT_BETWEEN: f64 = 1.5;
const WEIGHT_WHERE_IN: f64 = 2.0;
const WEIGHT_EXISTS: f64 = 3.0;
const WEIGHT_GROUP_BY: f64 = 2.0;
const WEIGHT_HAVING: f64 = 2.0;
const WEIGHT_WINDOW: f64 = 3.0;
const WEIGHT_GROUP_CLAUSE: f64 = 1.5;

/// Check a spec against validation rules, accumulating all violations.
pub fn validate(spec: &QuerySpec, rules: &ValidationRules) -> Vec<Violation> {
    let mut violations = Vec::new();

    if let Some(max_limit) = rules.max_limit {
        let requested = spec.effective_limit();
        if requested > max_limit {
            violations.push(Violation::limit_exceeded(requested, max_limit));
        }
    }

    let referenced = spec.referenced_fields();
    for field in &rules.required_fields {
        if !referenced.contains(field) {
            violations.push(Violation::required_field_missing(field));
        }
    }
    for field in &rules.disallowed_fields {
        if referenced.contains(field) {
            violations.push(Violation::disallowed_field(field));
        }
    }

    if let Some(max_complexity) = rules.max_complexity {
        let score = complexity(spec);
        if score > max_complexity {
            violations.push(Violation::complexity_exceeded(score, max_complexity));
        }
    }

    violations
}

/// Run [`validate`] and turn a non-empty violation list into an error.
pub fn check(spec: &QuerySpec, rules: &ValidationRules) -> Result<(), ValidationError> {
    let violations = validate(spec, rules);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(violations))
    }
}

/// The weighted complexity score of a spec.
///
/// `groupBy` contributes a flat weight on presence; everything else scales
/// with clause count. Grouped wheres contribute per direct clause, plus the
/// same recursively for nested groups.
pub fn complexity(spec: &QuerySpec) -> f64 {
    let mut score = 0.0;
    score += WEIGHT_WHERE_RAW * spec.where_raw.len() as f64;
    score += WEIGHT_BETWEEN * spec.where_between.len() as f64;
    score += WEIGHT_WHERE_IN * spec.where_in.len() as f64;
    score += WEIGHT_EXISTS * spec.where_exists.len() as f64;
    if !spec.group_by.is_empty() {
        score += WEIGHT_GROUP_BY;
    }
    score += WEIGHT_HAVING * spec.having.len() as f64;
    score += WEIGHT_WINDOW * spec.window_functions.len() as f64;
    for group in &spec.where_groups {
        score += group_complexity(group);
    }
    score
}

fn group_complexity(group: &ConditionGroup) -> f64 {
    let mut direct = 0usize;
    let mut nested = 0.0;
    for condition in &group.conditions {
        match condition {
            GroupCondition::Clause(_) => direct += 1,
            GroupCondition::Group(sub) => nested += group_complexity(sub),
        }
    }
    WEIGHT_GROUP_CLAUSE * direct as f64 + nested
}

/// One node of an execution plan supplied by the storage engine, in the
/// shape Postgres emits for `EXPLAIN (FORMAT JSON)`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanNode {
    #[serde(rename = "Node Type", default)]
    pub node_type: String,

    #[serde(rename = "Relation Name", default)]
    pub relation: Option<String>,

    #[serde(rename = "Join Type", default)]
    pub join_type: Option<String>,

    #[serde(rename = "Sort Method", default)]
    pub sort_method: Option<String>,

    /// Sort working memory, in kilobytes.
    #[serde(rename = "Sort Space Used", default)]
    pub sort_space_kb: Option<u64>,

    #[serde(rename = "Sort Key", default)]
    pub sort_keys: Vec<String>,

    #[serde(rename = "Plans", default)]
    pub children: Vec<PlanNode>,
}

/// An advisory optimization suggestion. Never blocks a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub kind: SuggestionKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionKind {
    /// A scan would benefit from an index on the filtered fields.
    AddIndex,
    /// A join looks cartesian or nested-loop heavy.
    ReviewJoin,
    /// A sort spills to disk or sorts on an unindexed key.
    ReviewSort,
}

/// Nested-loop joins beyond this count look like a join-order problem.
const NESTED_LOOP_LIMIT: usize = 3;

/// External-merge sorts above this working set (KB) are worth flagging.
const SORT_SPILL_KB: u64 = 8192;

/// Plan trees deeper than this are treated as malformed input.
const MAX_PLAN_DEPTH: usize = 64;

/// Derive advisory suggestions from an execution plan.
///
/// Heuristics only: a malformed or unexpectedly deep tree degrades to an
/// empty list rather than failing the request.
pub fn suggest(
    root: &PlanNode,
    spec: &QuerySpec,
    indexed_columns: &BTreeSet<String>,
) -> Vec<Suggestion> {
    let mut suggestions = Vec::new();
    let mut nested_loops = 0usize;

    if walk(
        root,
        spec,
        indexed_columns,
        &mut suggestions,
        &mut nested_loops,
        0,
    )
    .is_none()
    {
        tracing::warn!("execution plan tree too deep, skipping suggestions");
        return Vec::new();
    }

    if nested_loops > NESTED_LOOP_LIMIT {
        suggestions.push(Suggestion {
            kind: SuggestionKind::ReviewJoin,
            message: format!(
                "{} nested loop joins in one plan; consider restructuring the query",
                nested_loops
            ),
        });
    }

    suggestions
}

fn walk(
    node: &PlanNode,
    spec: &QuerySpec,
    indexed_columns: &BTreeSet<String>,
    suggestions: &mut Vec<Suggestion>,
    nested_loops: &mut usize,
    depth: usize,
) -> Option<()> {
    if depth > MAX_PLAN_DEPTH {
        return None;
    }

    if node.node_type.contains("Seq Scan") || node.node_type.contains("Full Table Scan") {
        let fields: Vec<String> = spec.referenced_fields().into_iter().collect();
        let target = node.relation.as_deref().unwrap_or("the scanned table");
        suggestions.push(Suggestion {
            kind: SuggestionKind::AddIndex,
            message: if fields.is_empty() {
                format!("{} is scanned sequentially; consider adding an index", target)
            } else {
                format!(
                    "{} is scanned sequentially; consider an index on {}",
                    target,
                    fields.join(", ")
                )
            },
        });
    }

    if node.node_type.contains("Nested Loop") {
        *nested_loops += 1;
    }

    if node.node_type.contains("Join") && node.join_type.is_none() {
        suggestions.push(Suggestion {
            kind: SuggestionKind::ReviewJoin,
            message: "join without an explicit join type; verify this is not a cartesian product"
                .to_string(),
        });
    }

    if node.node_type.contains("Sort") {
        let spills = node
            .sort_method
            .as_deref()
            .is_some_and(|m| m.contains("external merge"))
            && node.sort_space_kb.is_some_and(|kb| kb > SORT_SPILL_KB);
        if spills {
            suggestions.push(Suggestion {
                kind: SuggestionKind::ReviewSort,
                message: "sort spills to disk; raise working memory or reduce the sorted set"
                    .to_string(),
            });
        }
        for key in &node.sort_keys {
            if !indexed_columns.contains(key) {
                suggestions.push(Suggestion {
                    kind: SuggestionKind::ReviewSort,
                    message: format!("sort on '{}' has no matching index", key),
                });
            }
        }
    }

    for child in &node.children {
        walk(child, spec, indexed_columns, suggestions, nested_loops, depth + 1)?;
    }
    Some(())
}
