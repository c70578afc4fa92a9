//! Storage collaborator seam.
//!
//! The engine never executes SQL itself; it hands compiled plans to a
//! `StorageAdapter` and receives typed rows back. Adapters are expected to
//! apply plan ops in order (see `corral_query::apply_plan`).

use async_trait::async_trait;
use corral_core::value::Row;
use corral_query::QueryPlan;

/// An abstract storage engine that executes compiled plans.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Execute a read plan against a table and return its rows.
    async fn execute(&self, table: &str, plan: &QueryPlan) -> anyhow::Result<Vec<Row>>;

    /// Insert records, returning the affected count.
    async fn insert(&self, table: &str, records: &[Row]) -> anyhow::Result<u64>;

    /// Apply changes to the rows matched by a plan's where clauses.
    async fn update(&self, table: &str, plan: &QueryPlan, changes: &Row) -> anyhow::Result<u64>;

    /// Delete the rows matched by a plan's where clauses.
    async fn delete(&self, table: &str, plan: &QueryPlan) -> anyhow::Result<u64>;
}
