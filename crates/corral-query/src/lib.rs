//! # corral-query
//!
//! Compilation of the declarative query IR into an ordered sequence of
//! builder operations, plus static validation and complexity analysis.
//!
//! The compiler is a pure function: it reads a [`QuerySpec`] and produces a
//! [`QueryPlan`] of abstract clause applications in a fixed order. Executing
//! the plan — turning ops into SQL and running it — is the storage
//! collaborator's job, reached through the [`QueryBuilder`] capability.
//!
//! [`QuerySpec`]: corral_core::QuerySpec

pub mod analyzer;
pub mod compiler;
pub mod error;
pub mod plan;
pub mod transform;
mod window;

pub use analyzer::{check, complexity, suggest, validate, PlanNode, Suggestion, SuggestionKind};
pub use compiler::compile;
pub use error::{CompileError, ValidationError, Violation, ViolationKind};
pub use plan::{apply_plan, AggregateKind, ClauseOp, QueryBuilder, QueryPlan};
pub use transform::{apply_transforms, ColumnType};
