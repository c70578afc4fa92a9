//! End-to-end engine tests over an in-memory storage double.

use corral_cache::QueryCache;
use corral_core::config::{CacheSettings, EngineConfig};
use corral_core::permission::{TablePermissions, UserContext};
use corral_core::spec::QuerySpec;
use corral_core::value::{row_from_json, Row};
use corral_policy::{AuthorizationGate, InMemoryPermissionStore, PermissionStore, PolicyError};
use corral_query::QueryPlan;
use corral_runtime::{EngineError, QueryEngine, StorageAdapter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Storage double: serves canned rows, counts reads, records writes.
#[derive(Default)]
struct FakeStorage {
    rows: Vec<Row>,
    executions: AtomicUsize,
    writes: AtomicUsize,
}

impl FakeStorage {
    fn with_rows(value: serde_json::Value) -> Arc<Self> {
        let rows = value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| row_from_json(v).unwrap())
            .collect();
        Arc::new(Self {
            rows,
            ..Default::default()
        })
    }
}

#[async_trait::async_trait]
impl StorageAdapter for FakeStorage {
    async fn execute(&self, _table: &str, _plan: &QueryPlan) -> anyhow::Result<Vec<Row>> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.clone())
    }

    async fn insert(&self, _table: &str, records: &[Row]) -> anyhow::Result<u64> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(records.len() as u64)
    }

    async fn update(&self, _table: &str, _plan: &QueryPlan, _changes: &Row) -> anyhow::Result<u64> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.len() as u64)
    }

    async fn delete(&self, _table: &str, _plan: &QueryPlan) -> anyhow::Result<u64> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.len() as u64)
    }
}

async fn engine_with(
    storage: Arc<FakeStorage>,
    table: &str,
    permissions: serde_json::Value,
) -> QueryEngine {
    let store = Arc::new(InMemoryPermissionStore::new());
    let perms: TablePermissions = serde_json::from_value(permissions).unwrap();
    store.set_rules_for_table(table, perms).await.unwrap();

    QueryEngine::new(
        storage,
        AuthorizationGate::new(store),
        QueryCache::in_memory(CacheSettings::default()),
        EngineConfig::default(),
    )
}

fn spec(value: serde_json::Value) -> QuerySpec {
    serde_json::from_value(value).unwrap()
}

fn user(value: serde_json::Value) -> UserContext {
    serde_json::from_value(value).unwrap()
}

#[tokio::test]
async fn select_flows_through_gate_and_transforms() {
    let storage = FakeStorage::with_rows(serde_json::json!([
        {"id": 1, "ownerId": 5, "amount": "12.5"},
        {"id": 2, "ownerId": 9, "amount": "7.25"}
    ]));
    let engine = engine_with(
        storage.clone(),
        "docs",
        serde_json::json!({
            "SELECT": [{"allow": "fieldCheck", "fieldCheck": {
                "field": "ownerId",
                "operator": "===",
                "valueType": "userContext",
                "value": "userId"
            }}]
        }),
    )
    .await;

    let rows = engine
        .select(
            "docs",
            &spec(serde_json::json!({"transforms": {"amount": "float"}})),
            &user(serde_json::json!({"userId": 5})),
        )
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0]["amount"],
        corral_core::value::ScalarValue::Number(12.5)
    );
    assert_eq!(storage.executions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cache_hit_skips_execution_but_not_the_gate() {
    let storage = FakeStorage::with_rows(serde_json::json!([
        {"id": 1, "ownerId": 5},
        {"id": 2, "ownerId": 9}
    ]));
    let engine = engine_with(
        storage.clone(),
        "docs",
        serde_json::json!({
            "SELECT": [{"allow": "fieldCheck", "fieldCheck": {
                "field": "ownerId",
                "operator": "===",
                "valueType": "userContext",
                "value": "userId"
            }}]
        }),
    )
    .await;

    let cached_spec = spec(serde_json::json!({"cache": {"ttl": 60}}));

    let first = engine
        .select("docs", &cached_spec, &user(serde_json::json!({"userId": 5})))
        .await
        .unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(storage.executions.load(Ordering::SeqCst), 1);

    // Second request hits the cache; storage is not consulted again, but
    // the gate still filters per caller.
    let second = engine
        .select("docs", &cached_spec, &user(serde_json::json!({"userId": 9})))
        .await
        .unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0]["id"], corral_core::value::ScalarValue::Number(2.0));
    assert_eq!(storage.executions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn validation_rejects_before_any_execution() {
    let storage = FakeStorage::with_rows(serde_json::json!([]));
    let engine = engine_with(
        storage.clone(),
        "docs",
        serde_json::json!({"SELECT": []}),
    )
    .await;

    let err = engine
        .select(
            "docs",
            &spec(serde_json::json!({
                "limit": 500,
                "filter": {"secret": 1},
                "validation": {"maxLimit": 100, "disallowedFields": ["secret"]}
            })),
            &user(serde_json::json!({})),
        )
        .await
        .unwrap_err();

    let EngineError::Validation(validation) = err else {
        panic!("expected validation error, got {err:?}");
    };
    assert_eq!(validation.violations.len(), 2);
    assert_eq!(storage.executions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_operation_entry_returns_zero_rows_and_an_error() {
    let storage = FakeStorage::with_rows(serde_json::json!([{"id": 1}]));
    let engine = engine_with(
        storage.clone(),
        "docs",
        serde_json::json!({"INSERT": [{"allow": "public"}]}),
    )
    .await;

    let err = engine
        .select("docs", &QuerySpec::default(), &user(serde_json::json!({})))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Policy(PolicyError::OperationNotAllowed { .. })
    ));
}

#[tokio::test]
async fn disallowed_mutation_issues_no_write() {
    let storage = FakeStorage::with_rows(serde_json::json!([
        {"id": 1, "ownerId": 5},
        {"id": 2, "ownerId": 9}
    ]));
    let engine = engine_with(
        storage.clone(),
        "docs",
        serde_json::json!({
            "INSERT": [{"allow": "fieldCheck", "fieldCheck": {
                "field": "ownerId",
                "operator": "===",
                "valueType": "userContext",
                "value": "userId"
            }}],
            "DELETE": [{"allow": "fieldCheck", "fieldCheck": {
                "field": "ownerId",
                "operator": "===",
                "valueType": "userContext",
                "value": "userId"
            }}]
        }),
    )
    .await;
    let caller = user(serde_json::json!({"userId": 5}));

    // Insert payload containing a foreign record: rejected, nothing written.
    let records: Vec<Row> = [
        serde_json::json!({"ownerId": 5}),
        serde_json::json!({"ownerId": 9}),
    ]
    .iter()
    .map(|v| row_from_json(v).unwrap())
    .collect();
    let err = engine.insert("docs", records, &caller).await.unwrap_err();
    assert!(matches!(err, EngineError::Policy(PolicyError::AccessDenied { .. })));
    assert_eq!(storage.writes.load(Ordering::SeqCst), 0);

    // Delete whose matched rows include a foreign record: also rejected
    // before the write.
    let err = engine
        .delete("docs", &QuerySpec::default(), &caller)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Policy(PolicyError::AccessDenied { .. })));
    assert_eq!(storage.writes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn allowed_mutation_goes_through() {
    let storage = FakeStorage::with_rows(serde_json::json!([{"id": 1, "ownerId": 5}]));
    let engine = engine_with(
        storage.clone(),
        "docs",
        serde_json::json!({"UPDATE": [{"allow": "auth"}]}),
    )
    .await;

    let affected = engine
        .update(
            "docs",
            &spec(serde_json::json!({"filter": {"id": 1}})),
            row_from_json(&serde_json::json!({"status": "archived"})).unwrap(),
            &user(serde_json::json!({"userId": 5})),
        )
        .await
        .unwrap();
    assert_eq!(affected, 1);
    assert_eq!(storage.writes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn engine_config_limit_ceiling_applies_when_request_has_none() {
    let storage = FakeStorage::with_rows(serde_json::json!([]));
    let store = Arc::new(InMemoryPermissionStore::new());
    let perms: TablePermissions = serde_json::from_value(serde_json::json!({"SELECT": []})).unwrap();
    store.set_rules_for_table("docs", perms).await.unwrap();

    let config = EngineConfig {
        max_limit: Some(50),
        ..Default::default()
    };
    let engine = QueryEngine::new(
        storage,
        AuthorizationGate::new(store),
        QueryCache::in_memory(CacheSettings::default()),
        config,
    );

    let err = engine
        .select(
            "docs",
            &spec(serde_json::json!({"limit": 100})),
            &user(serde_json::json!({})),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(engine.default_validation().max_limit, Some(50));
}
