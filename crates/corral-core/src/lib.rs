//! Core types shared across all Corral crates.
//!
//! - [`spec`]: the declarative query IR accepted from request handlers
//! - [`value`]: tagged scalar values and typed rows
//! - [`permission`]: permission rules, user context, per-table policy
//! - [`config`]: engine-wide configuration loaded from YAML

pub mod config;
pub mod permission;
pub mod spec;
pub mod value;

pub use config::{CacheSettings, ConfigError, EngineConfig};
pub use permission::{
    FieldCheck, FieldCheckOp, Operation, PermissionRule, TablePermissions, UserContext,
    ValueSource,
};
pub use spec::{
    Aggregate, AdvancedWindow, BetweenCondition, BoolOp, CacheConfig, ConditionGroup,
    CteDefinition, ExistsCondition, FrameBound, FrameMode, FrameSpec, GroupCondition,
    HavingCondition, NullOrdering, OrderBy, QuerySpec, RawCondition, RawExpression,
    RecursiveCte, SortDirection, ValidationRules, WindowFunction, DEFAULT_LIMIT,
};
pub use value::{row_from_json, Row, ScalarValue};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_spec_serialization_validates_against_schema() {
        let spec: QuerySpec = serde_json::from_value(json!({
            "filter": {"status": "active"},
            "whereRaw": [{"field": "age", "operator": ">", "value": 21, "boolean": "and"}],
            "whereBetween": [{"field": "score", "range": [10, 20]}],
            "whereNull": ["deleted_at"],
            "whereIn": {"role": ["admin"]},
            "whereGroups": [{
                "boolean": "or",
                "conditions": [{"field": "a", "operator": "=", "value": 1}]
            }],
            "groupBy": ["dept"],
            "orderBy": [{"field": "salary", "direction": "desc", "nulls": "last"}],
            "aggregates": [{"type": "count", "alias": "n"}],
            "limit": 25,
            "windowFunctions": [{
                "type": "row_number",
                "alias": "rn",
                "partitionBy": ["dept"],
                "orderBy": [{"field": "salary", "direction": "desc"}]
            }],
            "advancedWindows": [{
                "type": "sum",
                "field": "amount",
                "alias": "running",
                "frame": {
                    "mode": "rows",
                    "start": {"kind": "preceding", "offset": 3},
                    "end": {"kind": "current_row"}
                }
            }],
            "ctes": [{"name": "recent", "query": {"limit": 5}}],
            "transforms": {"amount": "float"},
            "cache": {"ttl": 60, "tags": ["t1"]},
            "validation": {"maxLimit": 100}
        }))
        .expect("spec must deserialize");

        let instance = serde_json::to_value(&spec).expect("spec must serialize");
        let schema: serde_json::Value =
            serde_json::from_str(include_str!("../../../schemas/QuerySpec.schema.json"))
                .expect("schema must parse");

        let validator = jsonschema::draft202012::options()
            .build(&schema)
            .expect("schema must compile");

        if !validator.is_valid(&instance) {
            let mut msgs = Vec::new();
            for (idx, err) in validator.iter_errors(&instance).take(20).enumerate() {
                msgs.push(format!("{}: {}", idx + 1, err));
            }
            panic!("query spec did not validate: {}", msgs.join("; "));
        }
    }
}
