//! Compilation of a query spec into an ordered operation sequence.
//!
//! Clause-application order is fixed and reproduced exactly on every
//! compile: CTEs, recursive CTEs, simple windows, advanced windows, base
//! equality filter, raw expressions, aggregates, raw wheres, between,
//! null/not-null, in/not-in, exists, grouped wheres, group by, having,
//! order by, limit, offset. Later clauses depend on projections made by
//! earlier ones.

use corral_core::spec::{ConditionGroup, GroupCondition, QuerySpec};
use std::collections::BTreeSet;

use crate::error::CompileError;
use crate::plan::{AggregateKind, ClauseOp, QueryPlan};
use crate::transform::ColumnType;
use crate::window::{advanced_window_fragment, window_fragment};

/// Compile a spec into its ordered operation sequence.
///
/// Pure and synchronous; never touches the storage engine. Unknown
/// aggregate, window, or column-type names are hard errors.
pub fn compile(spec: &QuerySpec) -> Result<QueryPlan, CompileError> {
    let mut ops = Vec::new();

    let mut cte_names = BTreeSet::new();
    for cte in &spec.ctes {
        if !cte_names.insert(cte.name.clone()) {
            return Err(CompileError::DuplicateCte(cte.name.clone()));
        }
        ops.push(ClauseOp::WithCte {
            name: cte.name.clone(),
            columns: cte.columns.clone(),
            body: compile(&cte.query)?,
        });
    }

    for cte in &spec.recursive_ctes {
        if !cte_names.insert(cte.name.clone()) {
            return Err(CompileError::DuplicateCte(cte.name.clone()));
        }
        ops.push(ClauseOp::WithRecursiveCte {
            name: cte.name.clone(),
            columns: cte.columns.clone(),
            initial: compile(&cte.initial)?,
            recursive: compile(&cte.recursive)?,
            union_all: cte.union_all,
        });
    }

    let mut window_aliases = BTreeSet::new();
    for window in &spec.window_functions {
        if !window_aliases.insert(window.alias.clone()) {
            return Err(CompileError::DuplicateWindowAlias(window.alias.clone()));
        }
        ops.push(ClauseOp::SelectWindow {
            fragment: window_fragment(window)?,
            bindings: Vec::new(),
            alias: window.alias.clone(),
        });
    }

    for window in &spec.advanced_windows {
        if !window_aliases.insert(window.alias.clone()) {
            return Err(CompileError::DuplicateWindowAlias(window.alias.clone()));
        }
        let (fragment, bindings) = advanced_window_fragment(window)?;
        ops.push(ClauseOp::SelectWindow {
            fragment,
            bindings,
            alias: window.alias.clone(),
        });
    }

    for (field, value) in &spec.filter {
        ops.push(ClauseOp::WhereEq {
            field: field.clone(),
            value: value.clone(),
        });
    }

    for raw in &spec.raw_expressions {
        ops.push(ClauseOp::SelectRaw {
            expression: raw.expression.clone(),
            bindings: raw.bindings.clone(),
        });
    }

    for aggregate in &spec.aggregates {
        ops.push(ClauseOp::SelectAggregate {
            kind: AggregateKind::parse(&aggregate.kind)?,
            field: aggregate.field.clone(),
            alias: aggregate.alias.clone(),
        });
    }

    // Transforms are applied to result rows, not compiled into clauses, but
    // an unknown target type must still fail the compile.
    for (column, ty) in &spec.transforms {
        ColumnType::parse(column, ty)?;
    }

    for condition in &spec.where_raw {
        ops.push(ClauseOp::WhereRaw {
            field: condition.field.clone(),
            operator: condition.operator.clone(),
            value: condition.value.clone(),
            boolean: condition.boolean,
        });
    }

    for between in &spec.where_between {
        ops.push(ClauseOp::WhereBetween {
            field: between.field.clone(),
            low: between.range[0].clone(),
            high: between.range[1].clone(),
        });
    }

    for field in &spec.where_null {
        ops.push(ClauseOp::WhereNull {
            field: field.clone(),
        });
    }
    for field in &spec.where_not_null {
        ops.push(ClauseOp::WhereNotNull {
            field: field.clone(),
        });
    }

    for (field, values) in &spec.where_in {
        ops.push(ClauseOp::WhereIn {
            field: field.clone(),
            values: values.clone(),
        });
    }
    for (field, values) in &spec.where_not_in {
        ops.push(ClauseOp::WhereNotIn {
            field: field.clone(),
            values: values.clone(),
        });
    }

    for exists in &spec.where_exists {
        ops.push(ClauseOp::WhereExists {
            query: exists.query.clone(),
            bindings: exists.bindings.clone(),
        });
    }

    for group in &spec.where_groups {
        ops.push(compile_group(group));
    }

    if !spec.group_by.is_empty() {
        ops.push(ClauseOp::GroupBy {
            fields: spec.group_by.clone(),
        });
    }

    for having in &spec.having {
        ops.push(ClauseOp::Having {
            field: having.field.clone(),
            operator: having.operator.clone(),
            value: having.value.clone(),
        });
    }

    for order in &spec.order_by {
        ops.push(ClauseOp::OrderBy {
            field: order.field.clone(),
            direction: order.direction,
            nulls: order.nulls,
        });
    }

    ops.push(ClauseOp::Limit {
        limit: spec.effective_limit(),
    });
    ops.push(ClauseOp::Offset {
        offset: spec.effective_offset(),
    });

    tracing::debug!(ops = ops.len(), "compiled query plan");
    Ok(QueryPlan { ops })
}

/// Compile a condition group into a nested group op. Clauses keep their own
/// AND/OR tags; a group's first clause starts its chain unconditionally,
/// which is the builder's concern, not the compiler's.
fn compile_group(group: &ConditionGroup) -> ClauseOp {
    let ops = group
        .conditions
        .iter()
        .map(|condition| match condition {
            GroupCondition::Clause(clause) => ClauseOp::WhereRaw {
                field: clause.field.clone(),
                operator: clause.operator.clone(),
                value: clause.value.clone(),
                boolean: clause.boolean,
            },
            GroupCondition::Group(nested) => compile_group(nested),
        })
        .collect();

    ClauseOp::WhereGroup {
        boolean: group.boolean,
        ops,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_core::spec::BoolOp;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn kitchen_sink() -> QuerySpec {
        serde_json::from_value(json!({
            "ctes": [{"name": "recent", "query": {"limit": 5}}],
            "recursiveCtes": [{
                "name": "tree",
                "initial": {"filter": {"parent_id": null}},
                "recursive": {"whereRaw": [{"field": "t.parent_id", "operator": "=", "value": "tree.id"}]},
                "unionAll": true
            }],
            "windowFunctions": [{
                "type": "row_number",
                "alias": "rn",
                "partitionBy": ["dept"],
                "orderBy": [{"field": "salary", "direction": "desc"}]
            }],
            "advancedWindows": [{
                "type": "sum", "field": "amount", "alias": "running",
                "frame": {"mode": "rows", "start": {"kind": "unbounded_preceding"}, "end": {"kind": "current_row"}}
            }],
            "filter": {"status": "active"},
            "rawExpressions": [{"expression": "1 as one"}],
            "aggregates": [{"type": "count", "alias": "n"}],
            "whereRaw": [{"field": "age", "operator": ">", "value": 21}],
            "whereBetween": [{"field": "score", "range": [10, 20]}],
            "whereNull": ["deleted_at"],
            "whereNotNull": ["email"],
            "whereIn": {"role": ["admin"]},
            "whereNotIn": {"state": ["banned"]},
            "whereExists": [{"query": "select 1"}],
            "whereGroups": [{"conditions": [{"field": "a", "operator": "=", "value": 1}]}],
            "groupBy": ["dept"],
            "having": [{"field": "n", "operator": ">", "value": 2}],
            "orderBy": [{"field": "salary", "direction": "desc"}],
            "limit": 25,
            "offset": 5
        }))
        .unwrap()
    }

    #[test]
    fn clause_application_order_is_fixed() {
        let plan = compile(&kitchen_sink()).unwrap();
        let kinds: Vec<&str> = plan.ops.iter().map(ClauseOp::kind).collect();
        assert_eq!(
            kinds,
            vec![
                "with_cte",
                "with_recursive_cte",
                "select_window",
                "select_window",
                "where_eq",
                "select_raw",
                "select_aggregate",
                "where_raw",
                "where_between",
                "where_null",
                "where_not_null",
                "where_in",
                "where_not_in",
                "where_exists",
                "where_group",
                "group_by",
                "having",
                "order_by",
                "limit",
                "offset",
            ]
        );
    }

    #[test]
    fn limit_and_offset_default_when_absent() {
        let plan = compile(&QuerySpec::default()).unwrap();
        assert_eq!(
            plan.ops,
            vec![ClauseOp::Limit { limit: 10 }, ClauseOp::Offset { offset: 0 }]
        );
    }

    #[test]
    fn recursive_cte_carries_both_terms_and_union_flag() {
        let plan = compile(&kitchen_sink()).unwrap();
        let ClauseOp::WithRecursiveCte {
            name,
            initial,
            recursive,
            union_all,
            ..
        } = &plan.ops[1]
        else {
            panic!("expected recursive CTE op");
        };
        assert_eq!(name, "tree");
        assert!(union_all);
        assert!(initial.ops.iter().any(|op| op.kind() == "where_eq"));
        assert!(recursive.ops.iter().any(|op| op.kind() == "where_raw"));
    }

    #[test]
    fn nested_groups_keep_their_boolean_tags() {
        let spec: QuerySpec = serde_json::from_value(json!({
            "whereGroups": [{
                "boolean": "or",
                "conditions": [
                    {"field": "a", "operator": "=", "value": 1},
                    {"boolean": "and", "conditions": [
                        {"field": "b", "operator": "=", "value": 2},
                        {"field": "c", "operator": "=", "value": 3, "boolean": "or"}
                    ]}
                ]
            }]
        }))
        .unwrap();

        let plan = compile(&spec).unwrap();
        let ClauseOp::WhereGroup { boolean, ops } = &plan.ops[0] else {
            panic!("expected group op");
        };
        assert_eq!(*boolean, BoolOp::Or);
        assert_eq!(ops.len(), 2);
        let ClauseOp::WhereGroup { ops: nested, .. } = &ops[1] else {
            panic!("expected nested group");
        };
        let ClauseOp::WhereRaw { boolean, .. } = &nested[1] else {
            panic!("expected raw clause");
        };
        assert_eq!(*boolean, BoolOp::Or);
    }

    #[test]
    fn duplicate_window_alias_is_rejected_across_both_lists() {
        let spec: QuerySpec = serde_json::from_value(json!({
            "windowFunctions": [{"type": "row_number", "alias": "w"}],
            "advancedWindows": [{"type": "sum", "field": "x", "alias": "w"}]
        }))
        .unwrap();
        assert_eq!(
            compile(&spec),
            Err(CompileError::DuplicateWindowAlias("w".to_string()))
        );
    }

    #[test]
    fn duplicate_cte_name_is_rejected() {
        let spec: QuerySpec = serde_json::from_value(json!({
            "ctes": [
                {"name": "x", "query": {}},
                {"name": "x", "query": {}}
            ]
        }))
        .unwrap();
        assert_eq!(compile(&spec), Err(CompileError::DuplicateCte("x".to_string())));
    }

    #[test]
    fn unknown_aggregate_is_a_hard_error() {
        let spec: QuerySpec = serde_json::from_value(json!({
            "aggregates": [{"type": "median", "field": "x", "alias": "m"}]
        }))
        .unwrap();
        assert_eq!(
            compile(&spec),
            Err(CompileError::UnsupportedAggregate("median".to_string()))
        );
    }

    #[test]
    fn unknown_transform_type_is_a_hard_error() {
        let spec: QuerySpec = serde_json::from_value(json!({
            "transforms": {"x": "geometry"}
        }))
        .unwrap();
        assert_eq!(
            compile(&spec),
            Err(CompileError::UnknownColumnType {
                column: "x".to_string(),
                ty: "geometry".to_string()
            })
        );
    }
}
