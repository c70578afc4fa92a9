//! Error types for query compilation and validation.

use thiserror::Error;

/// Errors raised while compiling a query spec.
///
/// Unknown feature names are hard errors: silently dropping an aggregate or
/// window the caller asked for would make compiled plans unverifiable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// Aggregate `type` is not one of count/sum/avg/min/max.
    #[error("unsupported aggregate type '{0}'")]
    UnsupportedAggregate(String),

    /// Window function `type` is not a known ranking/offset/aggregate name.
    #[error("unsupported window function type '{0}'")]
    UnsupportedWindow(String),

    /// A transform names a column type the engine cannot coerce to.
    #[error("unknown column type '{ty}' in transform for '{column}'")]
    UnknownColumnType { column: String, ty: String },

    /// Two window projections in one query share an alias.
    #[error("duplicate window alias '{0}'")]
    DuplicateWindowAlias(String),

    /// Two CTEs in one query share a name.
    #[error("duplicate CTE name '{0}'")]
    DuplicateCte(String),
}

/// A single validation violation. All violations for a request are
/// accumulated and reported together, never one at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub kind: ViolationKind,
    pub message: String,
}

impl Violation {
    pub fn new(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn limit_exceeded(requested: i64, max: i64) -> Self {
        Self::new(
            ViolationKind::LimitExceeded,
            format!("requested limit {} exceeds maximum {}", requested, max),
        )
    }

    pub fn required_field_missing(field: &str) -> Self {
        Self::new(
            ViolationKind::RequiredFieldMissing,
            format!("required field '{}' is not referenced by any filter", field),
        )
    }

    pub fn disallowed_field(field: &str) -> Self {
        Self::new(
            ViolationKind::DisallowedField,
            format!("field '{}' may not be used in filters", field),
        )
    }

    pub fn complexity_exceeded(score: f64, max: f64) -> Self {
        Self::new(
            ViolationKind::ComplexityExceeded,
            format!("query complexity {} exceeds maximum {}", score, max),
        )
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Categories of validation violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// Requested limit exceeds the allowed maximum.
    LimitExceeded,
    /// A required field is not referenced by any filtering clause.
    RequiredFieldMissing,
    /// A disallowed field is referenced by a filtering clause.
    DisallowedField,
    /// The complexity score exceeds the allowed maximum.
    ComplexityExceeded,
}

/// A rejected request: every accumulated violation, reported together.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("query validation failed: {}", .violations.iter().map(|v| v.message.as_str()).collect::<Vec<_>>().join("; "))]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

impl ValidationError {
    pub fn new(violations: Vec<Violation>) -> Self {
        Self { violations }
    }
}
