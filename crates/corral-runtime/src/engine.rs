//! End-to-end request orchestration.
//!
//! One request flows: validate → cache lookup → compile → execute via the
//! storage collaborator → authorization gate → transforms. A cache hit
//! skips compilation and execution but never the gate, so cached payloads
//! stay user-independent. Mutations are authorized before any write is
//! issued; a rejected mutation has no partial effect.

use corral_cache::QueryCache;
use corral_core::config::EngineConfig;
use corral_core::permission::{Operation, UserContext};
use corral_core::spec::{QuerySpec, ValidationRules};
use corral_core::value::Row;
use corral_policy::{AuthorizationGate, PolicyError};
use corral_query::{
    apply_transforms, check, compile, CompileError, QueryPlan, ValidationError,
};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::adapter::StorageAdapter;

/// Errors surfaced by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error("storage error: {0}")]
    Storage(#[source] anyhow::Error),
}

/// The query engine: wires the compiler, cache, gate, and storage together.
pub struct QueryEngine {
    storage: Arc<dyn StorageAdapter>,
    gate: AuthorizationGate,
    cache: QueryCache,
    config: EngineConfig,
}

impl QueryEngine {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        gate: AuthorizationGate,
        cache: QueryCache,
        config: EngineConfig,
    ) -> Self {
        Self {
            storage,
            gate,
            cache,
            config,
        }
    }

    /// Run a read request end to end.
    pub async fn select(
        &self,
        table: &str,
        spec: &QuerySpec,
        user: &UserContext,
    ) -> Result<Vec<Row>, EngineError> {
        let request_id = Uuid::new_v4();
        tracing::debug!(%request_id, table, "select request");

        self.validate(spec)?;

        let rows = match self.cached_rows(spec).await {
            Some(rows) => rows,
            None => {
                let plan = compile(spec)?;
                let rows = self
                    .storage
                    .execute(table, &plan)
                    .await
                    .map_err(EngineError::Storage)?;
                self.cache
                    .set(spec, serde_json::to_value(&rows).unwrap_or_default())
                    .await;
                rows
            }
        };

        // The gate runs on every request, cache hit or not.
        let mut rows = self.gate.filter_rows(table, user, rows).await?;
        apply_transforms(&spec.transforms, &mut rows);

        tracing::debug!(%request_id, table, rows = rows.len(), "select complete");
        Ok(rows)
    }

    /// Insert records after authorizing every one of them.
    pub async fn insert(
        &self,
        table: &str,
        records: Vec<Row>,
        user: &UserContext,
    ) -> Result<u64, EngineError> {
        self.gate
            .authorize_write(table, Operation::Insert, user, &records)
            .await?;
        self.storage
            .insert(table, &records)
            .await
            .map_err(EngineError::Storage)
    }

    /// Update the rows matched by `spec`, authorizing the affected rows
    /// before the write is issued.
    pub async fn update(
        &self,
        table: &str,
        spec: &QuerySpec,
        changes: Row,
        user: &UserContext,
    ) -> Result<u64, EngineError> {
        self.validate(spec)?;
        let plan = compile(spec)?;

        let affected = self.candidate_rows(table, &plan).await?;
        self.gate
            .authorize_write(table, Operation::Update, user, &affected)
            .await?;

        self.storage
            .update(table, &plan, &changes)
            .await
            .map_err(EngineError::Storage)
    }

    /// Delete the rows matched by `spec`, authorizing the affected rows
    /// before the write is issued.
    pub async fn delete(
        &self,
        table: &str,
        spec: &QuerySpec,
        user: &UserContext,
    ) -> Result<u64, EngineError> {
        self.validate(spec)?;
        let plan = compile(spec)?;

        let affected = self.candidate_rows(table, &plan).await?;
        self.gate
            .authorize_write(table, Operation::Delete, user, &affected)
            .await?;

        self.storage
            .delete(table, &plan)
            .await
            .map_err(EngineError::Storage)
    }

    /// Validate a spec against its own rules, with the engine-wide limit
    /// ceiling as a fallback when the request carries none.
    fn validate(&self, spec: &QuerySpec) -> Result<(), ValidationError> {
        let mut rules = spec.validation.clone().unwrap_or_default();
        if rules.max_limit.is_none() {
            rules.max_limit = self.config.max_limit;
        }
        check(spec, &rules)
    }

    async fn cached_rows(&self, spec: &QuerySpec) -> Option<Vec<Row>> {
        let payload = self.cache.get(spec).await?;
        match serde_json::from_value(payload) {
            Ok(rows) => Some(rows),
            Err(e) => {
                tracing::warn!(error = %e, "cached payload did not decode as rows, recomputing");
                None
            }
        }
    }

    /// Fetch the rows a mutation plan would touch, so row-level rules can
    /// block the write before it happens.
    async fn candidate_rows(&self, table: &str, plan: &QueryPlan) -> Result<Vec<Row>, EngineError> {
        self.storage
            .execute(table, plan)
            .await
            .map_err(EngineError::Storage)
    }

    /// Access the cache layer, e.g. for tag invalidation after mutations.
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// The engine's static validation rules fallback, as configured.
    pub fn default_validation(&self) -> ValidationRules {
        ValidationRules {
            max_limit: self.config.max_limit,
            ..Default::default()
        }
    }
}
