//! First-match permission rule evaluation.
//!
//! Rules are scanned strictly in list order. Each rule yields a tri-state
//! [`Decision`]: the first `Allow` or `Deny` ends the scan, a `Continue`
//! falls through to the next rule, and an exhausted list denies. The
//! tri-state scan replaces the source system's switch fallthrough, so
//! `auth` and `guest` are strictly complementary: each allows when its
//! condition holds and falls through otherwise, and at most one of them can
//! match for any given caller.

use corral_core::permission::{FieldCheck, FieldCheckOp, PermissionRule, UserContext, ValueSource};
use corral_core::value::{Row, ScalarValue};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use crate::error::PolicyError;

/// Outcome of evaluating a single rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
    /// The rule carries no signal for this caller/row; scan the next rule.
    Continue,
}

/// A predicate compiled from a `customSql` template, runnable against an
/// optional row.
pub type ExecutablePredicate = Box<dyn Fn(Option<&Row>) -> bool + Send + Sync>;

/// Capability supplied by the storage collaborator for `customSql` rules.
///
/// The evaluator resolves template placeholders into bindings and hands
/// both over; it never concatenates SQL text itself.
pub trait PredicateSupport: Send + Sync {
    fn compile_predicate(
        &self,
        template: &str,
        bindings: &BTreeMap<String, ScalarValue>,
    ) -> anyhow::Result<ExecutablePredicate>;
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap())
}

/// Evaluates ordered rule lists against a user context and optional row.
#[derive(Clone, Default)]
pub struct RuleEvaluator {
    predicate_support: Option<Arc<dyn PredicateSupport>>,
}

impl RuleEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the storage collaborator's predicate capability.
    pub fn with_predicate_support(support: Arc<dyn PredicateSupport>) -> Self {
        Self {
            predicate_support: Some(support),
        }
    }

    /// Scan a rule list first-match. An exhausted list denies.
    pub fn evaluate(
        &self,
        rules: &[PermissionRule],
        user: &UserContext,
        row: Option<&Row>,
    ) -> Result<bool, PolicyError> {
        for rule in rules {
            match self.evaluate_rule(rule, user, row)? {
                Decision::Allow => return Ok(true),
                Decision::Deny => return Ok(false),
                Decision::Continue => {}
            }
        }
        Ok(false)
    }

    /// Decide a single rule. Dispatch is exhaustive over the rule kinds.
    pub fn evaluate_rule(
        &self,
        rule: &PermissionRule,
        user: &UserContext,
        row: Option<&Row>,
    ) -> Result<Decision, PolicyError> {
        let decision = match rule {
            PermissionRule::Public => Decision::Allow,
            PermissionRule::Private => Decision::Deny,
            PermissionRule::Role { roles } => {
                if roles.is_empty() {
                    Decision::Deny
                } else {
                    match &user.role {
                        Some(role) if roles.contains(role) => Decision::Allow,
                        _ => Decision::Continue,
                    }
                }
            }
            PermissionRule::Auth => {
                if user.is_authenticated() {
                    Decision::Allow
                } else {
                    Decision::Continue
                }
            }
            PermissionRule::Guest => {
                if user.is_authenticated() {
                    Decision::Continue
                } else {
                    Decision::Allow
                }
            }
            PermissionRule::Labels { labels } => {
                if user.labels.intersection(labels).next().is_some() {
                    Decision::Allow
                } else {
                    Decision::Continue
                }
            }
            PermissionRule::Teams { teams } => {
                if user.teams.intersection(teams).next().is_some() {
                    Decision::Allow
                } else {
                    Decision::Continue
                }
            }
            PermissionRule::Static { value } => {
                if *value {
                    Decision::Allow
                } else {
                    Decision::Deny
                }
            }
            PermissionRule::FieldCheck { field_check } => check_field(field_check, user, row),
            PermissionRule::CustomSql { sql } => self.evaluate_custom_sql(sql, user, row)?,
        };
        Ok(decision)
    }

    fn evaluate_custom_sql(
        &self,
        template: &str,
        user: &UserContext,
        row: Option<&Row>,
    ) -> Result<Decision, PolicyError> {
        let mut bindings = BTreeMap::new();
        for capture in placeholder_pattern().captures_iter(template) {
            let field = &capture[1];
            let value = user
                .context_value(field)
                .ok_or_else(|| PolicyError::MissingContext {
                    field: field.to_string(),
                })?;
            bindings.insert(field.to_string(), value);
        }

        let support = self
            .predicate_support
            .as_ref()
            .ok_or(PolicyError::PredicateUnsupported)?;
        let predicate = support.compile_predicate(template, &bindings)?;

        if predicate(row) {
            Ok(Decision::Allow)
        } else {
            Ok(Decision::Continue)
        }
    }
}

/// Decide a `fieldCheck` rule against a row.
///
/// No row, a missing column, or an unresolvable expected value all fall
/// through rather than deny: the rule simply has no signal.
fn check_field(check: &FieldCheck, user: &UserContext, row: Option<&Row>) -> Decision {
    let Some(row) = row else {
        return Decision::Continue;
    };
    let Some(actual) = row.get(&check.field) else {
        return Decision::Continue;
    };

    let expected = match check.value_type {
        ValueSource::Literal => check.value.clone(),
        ValueSource::UserContext => {
            let Some(field) = check.value.as_str() else {
                return Decision::Continue;
            };
            let Some(value) = user.context_value(field) else {
                return Decision::Continue;
            };
            value
        }
    };

    let matched = match check.operator {
        FieldCheckOp::Eq => *actual == expected,
        FieldCheckOp::Ne => *actual != expected,
        FieldCheckOp::In => expected
            .as_list()
            .is_some_and(|values| values.contains(actual)),
        FieldCheckOp::NotIn => expected
            .as_list()
            .is_some_and(|values| !values.contains(actual)),
    };

    if matched {
        Decision::Allow
    } else {
        Decision::Continue
    }
}
