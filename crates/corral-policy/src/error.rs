//! Error types for policy evaluation and the authorization gate.

use corral_core::permission::Operation;
use thiserror::Error;

/// Errors raised while authorizing an operation.
///
/// Table-level denial is loud: a missing policy entry or a deny decision
/// fails the whole operation. Row-level `fieldCheck` denial never reaches
/// here — failing rows are filtered silently.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// No rule list is defined for this table and operation.
    #[error("operation {operation} is not allowed on table '{table}': no policy entry")]
    OperationNotAllowed { table: String, operation: Operation },

    /// The rule list evaluated to an explicit deny.
    #[error("access denied for {operation} on table '{table}'")]
    AccessDenied { table: String, operation: Operation },

    /// A customSql template references a context field the caller did not
    /// supply.
    #[error("customSql rule references undefined context field '{field}'")]
    MissingContext { field: String },

    /// A customSql rule was evaluated without a predicate capability.
    #[error("customSql rules require predicate support from the storage collaborator")]
    PredicateUnsupported,

    /// The permission store or predicate collaborator failed.
    #[error("permission collaborator error: {0}")]
    Collaborator(#[from] anyhow::Error),
}
