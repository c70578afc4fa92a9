//! Permission store collaborator seam.
//!
//! Table policies are persisted outside this core and fetched fresh per
//! authorization decision; the gate never holds a long-lived copy.

use async_trait::async_trait;
use corral_core::permission::TablePermissions;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Durable storage for per-table permission policies.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Fetch the policy for a table. `None` means no policy exists, which
    /// the gate treats as table-level denial for every operation.
    async fn rules_for_table(&self, table: &str) -> anyhow::Result<Option<TablePermissions>>;

    async fn set_rules_for_table(
        &self,
        table: &str,
        permissions: TablePermissions,
    ) -> anyhow::Result<()>;

    async fn delete_rules_for_table(&self, table: &str) -> anyhow::Result<()>;
}

/// Process-local permission store for tests and embedded use.
#[derive(Default)]
pub struct InMemoryPermissionStore {
    tables: RwLock<HashMap<String, TablePermissions>>,
}

impl InMemoryPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PermissionStore for InMemoryPermissionStore {
    async fn rules_for_table(&self, table: &str) -> anyhow::Result<Option<TablePermissions>> {
        Ok(self.tables.read().await.get(table).cloned())
    }

    async fn set_rules_for_table(
        &self,
        table: &str,
        permissions: TablePermissions,
    ) -> anyhow::Result<()> {
        self.tables
            .write()
            .await
            .insert(table.to_string(), permissions);
        Ok(())
    }

    async fn delete_rules_for_table(&self, table: &str) -> anyhow::Result<()> {
        self.tables.write().await.remove(table);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_core::permission::{Operation, PermissionRule};

    #[tokio::test]
    async fn set_get_delete_round_trip() {
        let store = InMemoryPermissionStore::new();
        assert!(store.rules_for_table("posts").await.unwrap().is_none());

        let perms =
            TablePermissions::default().with_rules(Operation::Select, vec![PermissionRule::Public]);
        store.set_rules_for_table("posts", perms).await.unwrap();

        let fetched = store.rules_for_table("posts").await.unwrap().unwrap();
        assert_eq!(
            fetched.rules_for(Operation::Select),
            Some(&[PermissionRule::Public][..])
        );

        store.delete_rules_for_table("posts").await.unwrap();
        assert!(store.rules_for_table("posts").await.unwrap().is_none());
    }
}
