//! Statement type policy
//!
//! An immutable allow/disallow configuration and the evaluation rules that
//! decide whether a classified statement may run.

use crate::classify::{StatementClassifier, StatementType};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Allow-list entry that permits every statement type
pub const ALLOW_ALL: &str = "all";

/// Allow-list entry that permits types not named in either list
pub const ALLOW_UNKNOWN: &str = "unknown";

/// The rule that produced a [`PolicyDecision`], in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyRule {
    /// `all` is in the allow list
    AllowAll,
    /// The type is in the disallow list
    Disallowed,
    /// The type is in the allow list
    Allowed,
    /// `unknown` is in the allow list
    UnknownAllowed,
    /// Neither list has any entries
    Unconfigured,
    /// The type is not listed anywhere
    NotListed,
}

/// Outcome of evaluating a statement against a [`SqlPolicy`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyDecision {
    pub statement_type: StatementType,
    pub valid: bool,
    pub rule: PolicyRule,
}

/// Allow/disallow lists of lower-cased statement types
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlPolicy {
    allow: BTreeSet<String>,
    disallow: BTreeSet<String>,
}

impl SqlPolicy {
    /// Build a policy from allow and disallow entries. Entries are trimmed
    /// and lower-cased; blank entries are dropped.
    pub fn new<A, D>(allow: A, disallow: D) -> Self
    where
        A: IntoIterator,
        A::Item: AsRef<str>,
        D: IntoIterator,
        D::Item: AsRef<str>,
    {
        Self {
            allow: normalize(allow),
            disallow: normalize(disallow),
        }
    }

    /// Build a policy from a permissions table such as
    /// `{ select = true, drop = false }`
    pub fn from_permissions(permissions: &BTreeMap<String, bool>) -> Self {
        let allow = permissions.iter().filter(|(_, v)| **v).map(|(k, _)| k);
        let disallow = permissions.iter().filter(|(_, v)| !**v).map(|(k, _)| k);
        Self::new(allow, disallow)
    }

    pub fn allow_list(&self) -> &BTreeSet<String> {
        &self.allow
    }

    pub fn disallow_list(&self) -> &BTreeSet<String> {
        &self.disallow
    }

    pub fn is_unconfigured(&self) -> bool {
        self.allow.is_empty() && self.disallow.is_empty()
    }

    /// Decide whether a statement type may run.
    ///
    /// Rules are checked in order and the first match wins: `all` in the
    /// allow list, the disallow list, the allow list, `unknown` in the allow
    /// list, no configuration at all, and finally deny.
    pub fn evaluate(&self, statement_type: &StatementType) -> PolicyDecision {
        let key = statement_type.policy_key();

        let (valid, rule) = if self.allow.contains(ALLOW_ALL) {
            (true, PolicyRule::AllowAll)
        } else if self.disallow.contains(&key) {
            (false, PolicyRule::Disallowed)
        } else if self.allow.contains(&key) {
            (true, PolicyRule::Allowed)
        } else if self.allow.contains(ALLOW_UNKNOWN) {
            (true, PolicyRule::UnknownAllowed)
        } else if self.is_unconfigured() {
            (false, PolicyRule::Unconfigured)
        } else {
            (false, PolicyRule::NotListed)
        };

        PolicyDecision {
            statement_type: statement_type.clone(),
            valid,
            rule,
        }
    }

    /// Classify `sql` and evaluate the resulting type
    pub fn validate(&self, classifier: &StatementClassifier, sql: &str) -> PolicyDecision {
        let decision = self.evaluate(&classifier.classify(sql));
        if decision.valid {
            tracing::debug!(
                statement_type = %decision.statement_type,
                rule = ?decision.rule,
                "Statement permitted"
            );
        } else {
            tracing::warn!(
                statement_type = %decision.statement_type,
                rule = ?decision.rule,
                "Statement rejected by policy"
            );
        }
        decision
    }
}

fn normalize<I>(entries: I) -> BTreeSet<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    entries
        .into_iter()
        .map(|e| e.as_ref().trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}
