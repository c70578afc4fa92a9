//! Permission model: rules, user context, and per-table policy.
//!
//! Rules are an ordered list per table and operation. The evaluator in
//! `corral-policy` scans them first-match; the types here only carry the
//! data. `PermissionRule` is a tagged union so dispatch is exhaustive and a
//! new rule kind cannot silently become a no-op branch.

use crate::value::ScalarValue;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// The four gated operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Select => write!(f, "SELECT"),
            Operation::Insert => write!(f, "INSERT"),
            Operation::Update => write!(f, "UPDATE"),
            Operation::Delete => write!(f, "DELETE"),
        }
    }
}

/// One permission rule, discriminated by the `allow` tag on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "allow", rename_all = "camelCase")]
pub enum PermissionRule {
    /// Everyone, always.
    Public,
    /// No one, ever.
    Private,
    /// Members of any of the named roles.
    Role { roles: Vec<String> },
    /// Any authenticated caller.
    Auth,
    /// Any unauthenticated caller.
    Guest,
    /// Callers sharing at least one label.
    Labels { labels: BTreeSet<String> },
    /// Callers sharing at least one team.
    Teams { teams: BTreeSet<String> },
    /// A literal decision.
    Static { value: bool },
    /// A per-row comparison against a literal or a user-context field.
    FieldCheck {
        #[serde(rename = "fieldCheck")]
        field_check: FieldCheck,
    },
    /// A templated predicate compiled and run by the storage collaborator.
    CustomSql { sql: String },
}

impl PermissionRule {
    /// Whether this rule needs a row to decide. The gate switches to
    /// per-row evaluation when any rule in a list is row-scoped.
    pub fn is_row_scoped(&self) -> bool {
        matches!(self, PermissionRule::FieldCheck { .. })
    }
}

/// Comparison operators available to `fieldCheck` rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldCheckOp {
    #[serde(rename = "===")]
    Eq,
    #[serde(rename = "!==")]
    Ne,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "notIn")]
    NotIn,
}

/// Where a `fieldCheck` rule's expected value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueSource {
    #[serde(rename = "literal")]
    Literal,
    #[serde(rename = "userContext")]
    UserContext,
}

/// A row-level comparison: `row[field] <op> expected`, where the expected
/// value is either a literal or named field of the caller's context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldCheck {
    pub field: String,
    pub operator: FieldCheckOp,
    pub value_type: ValueSource,
    pub value: ScalarValue,
}

/// The caller's identity and attributes, as presented with a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserContext {
    /// Caller identity; absent (or null) means guest.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<ScalarValue>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub labels: BTreeSet<String>,

    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub teams: BTreeSet<String>,

    /// Optional explicit permission names granted to the caller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<BTreeSet<String>>,

    /// Additional context fields referenced by `fieldCheck`/`customSql`.
    #[serde(flatten)]
    pub attrs: BTreeMap<String, ScalarValue>,
}

impl UserContext {
    /// Whether an identity is present. A null `userId` counts as guest.
    pub fn is_authenticated(&self) -> bool {
        matches!(&self.user_id, Some(v) if !v.is_null())
    }

    /// Look up a context field by its wire name.
    pub fn context_value(&self, field: &str) -> Option<ScalarValue> {
        match field {
            "userId" => self.user_id.clone(),
            "role" => self.role.clone().map(ScalarValue::String),
            _ => self.attrs.get(field).cloned(),
        }
    }
}

/// The persisted policy for one table: an ordered rule list per operation.
///
/// A missing operation entry means the operation is not allowed at all; a
/// present-but-empty list means the operation is explicitly unrestricted.
/// The two must never be conflated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", default)]
pub struct TablePermissions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<PermissionRule>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert: Option<Vec<PermissionRule>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<Vec<PermissionRule>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<Vec<PermissionRule>>,
}

impl TablePermissions {
    pub fn rules_for(&self, operation: Operation) -> Option<&[PermissionRule]> {
        match operation {
            Operation::Select => self.select.as_deref(),
            Operation::Insert => self.insert.as_deref(),
            Operation::Update => self.update.as_deref(),
            Operation::Delete => self.delete.as_deref(),
        }
    }

    pub fn set_rules(&mut self, operation: Operation, rules: Vec<PermissionRule>) {
        match operation {
            Operation::Select => self.select = Some(rules),
            Operation::Insert => self.insert = Some(rules),
            Operation::Update => self.update = Some(rules),
            Operation::Delete => self.delete = Some(rules),
        }
    }

    /// Builder-style helper for tests and embedding.
    pub fn with_rules(mut self, operation: Operation, rules: Vec<PermissionRule>) -> Self {
        self.set_rules(operation, rules);
        self
    }
}
