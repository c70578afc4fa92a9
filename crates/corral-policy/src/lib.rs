//! # corral-policy
//!
//! Permission rule evaluation and the row-level authorization gate.
//!
//! The evaluator is a pure first-match scan over an ordered rule list; the
//! gate wires it to a [`PermissionStore`] collaborator and decides, per
//! table and operation, between table-level denial and row-level
//! filtering. Coarse authorization fails loud (`AccessDenied`,
//! `OperationNotAllowed`); row-level visibility fails quiet (rows are
//! silently omitted).

pub mod error;
pub mod evaluate;
pub mod gate;
pub mod store;

pub use error::PolicyError;
pub use evaluate::{Decision, ExecutablePredicate, PredicateSupport, RuleEvaluator};
pub use gate::AuthorizationGate;
pub use store::{InMemoryPermissionStore, PermissionStore};
