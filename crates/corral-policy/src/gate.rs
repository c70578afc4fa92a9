//! The authorization gate.
//!
//! Orchestrates rule evaluation per table and operation. Policy is fetched
//! fresh from the permission store on every decision. Two evaluation modes:
//!
//! - A rule list containing any `fieldCheck` is evaluated per row; rows
//!   that fail are silently dropped.
//! - Every other list is evaluated once without row context; a deny fails
//!   the whole operation.
//!
//! Mutations run through the same decision before any write is issued: a
//! disallowed record rejects the operation outright rather than being
//! filtered from a post-hoc view.

use corral_core::permission::{Operation, PermissionRule, UserContext};
use corral_core::value::Row;
use std::sync::Arc;

use crate::error::PolicyError;
use crate::evaluate::{PredicateSupport, RuleEvaluator};
use crate::store::PermissionStore;

pub struct AuthorizationGate {
    store: Arc<dyn PermissionStore>,
    evaluator: RuleEvaluator,
}

impl AuthorizationGate {
    pub fn new(store: Arc<dyn PermissionStore>) -> Self {
        Self {
            store,
            evaluator: RuleEvaluator::new(),
        }
    }

    /// Attach the storage collaborator's predicate capability for
    /// `customSql` rules.
    pub fn with_predicate_support(
        store: Arc<dyn PermissionStore>,
        support: Arc<dyn PredicateSupport>,
    ) -> Self {
        Self {
            store,
            evaluator: RuleEvaluator::with_predicate_support(support),
        }
    }

    /// Authorize a read and return the visible rows.
    pub async fn filter_rows(
        &self,
        table: &str,
        user: &UserContext,
        rows: Vec<Row>,
    ) -> Result<Vec<Row>, PolicyError> {
        let rules = self.fetch_rules(table, Operation::Select).await?;
        if rules.is_empty() {
            return Ok(rows);
        }

        if rules.iter().any(PermissionRule::is_row_scoped) {
            let total = rows.len();
            let mut kept = Vec::with_capacity(total);
            for row in rows {
                if self.evaluator.evaluate(&rules, user, Some(&row))? {
                    kept.push(row);
                }
            }
            tracing::debug!(
                table,
                kept = kept.len(),
                dropped = total - kept.len(),
                "row-level filtering applied"
            );
            return Ok(kept);
        }

        if self.evaluator.evaluate(&rules, user, None)? {
            Ok(rows)
        } else {
            Err(PolicyError::AccessDenied {
                table: table.to_string(),
                operation: Operation::Select,
            })
        }
    }

    /// Authorize a mutation payload before any write is issued.
    ///
    /// Row-scoped rule lists must pass for every record; one disallowed
    /// record rejects the whole operation.
    pub async fn authorize_write(
        &self,
        table: &str,
        operation: Operation,
        user: &UserContext,
        records: &[Row],
    ) -> Result<(), PolicyError> {
        debug_assert!(operation != Operation::Select);

        let rules = self.fetch_rules(table, operation).await?;
        if rules.is_empty() {
            return Ok(());
        }

        let denied = if rules.iter().any(PermissionRule::is_row_scoped) {
            let mut denied = false;
            for record in records {
                if !self.evaluator.evaluate(&rules, user, Some(record))? {
                    denied = true;
                    break;
                }
            }
            denied
        } else {
            !self.evaluator.evaluate(&rules, user, None)?
        };

        if denied {
            return Err(PolicyError::AccessDenied {
                table: table.to_string(),
                operation,
            });
        }
        Ok(())
    }

    /// Fetch the rule list for one table and operation, fresh per decision.
    ///
    /// Missing table policy and missing operation entry are both
    /// table-level denial; a present empty list is explicit "no
    /// restriction" and comes back as `Ok(vec![])`.
    async fn fetch_rules(
        &self,
        table: &str,
        operation: Operation,
    ) -> Result<Vec<PermissionRule>, PolicyError> {
        let not_allowed = || PolicyError::OperationNotAllowed {
            table: table.to_string(),
            operation,
        };

        let permissions = self
            .store
            .rules_for_table(table)
            .await?
            .ok_or_else(not_allowed)?;
        let rules = permissions.rules_for(operation).ok_or_else(not_allowed)?;
        Ok(rules.to_vec())
    }
}
