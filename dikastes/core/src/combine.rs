//! Combines per-rule verdicts into a single decision.
//!
//! Rule evaluation only answers whether each rule matches. How the matching
//! rules of several policies resolve to one allow/deny decision is decided by
//! a [`Combine`] strategy selected at startup. Every strategy denies when no
//! rule decides the outcome.

use crate::{check::Decision, rule::Action};
use anyhow::{anyhow, Error, Result};
use tracing::debug;

/// The outcome of evaluating one rule.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RuleVerdict {
    pub action: Action,
    pub matched: bool,
}

/// The verdicts of one policy's rules, in rule order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyVerdict {
    pub policy: String,
    pub rules: Vec<RuleVerdict>,
}

pub trait Combine {
    /// Reduces policy verdicts, in policy order, to either `Ok` or `Denied`.
    fn combine(&self, verdicts: &[PolicyVerdict]) -> Decision;
}

/// Selects a combination strategy.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Combiner {
    /// The first matching `Allow` or `Deny` rule decides. A matching `Pass`
    /// rule skips the remainder of its policy and a matching `Log` rule is
    /// ignored.
    #[default]
    FirstMatch,

    /// Any matching `Deny` rule denies; otherwise any matching `Allow` rule
    /// allows.
    DenyOverrides,
}

// === impl Combiner ===

impl Combine for Combiner {
    fn combine(&self, verdicts: &[PolicyVerdict]) -> Decision {
        match self {
            Self::FirstMatch => first_match(verdicts),
            Self::DenyOverrides => deny_overrides(verdicts),
        }
    }
}

impl std::str::FromStr for Combiner {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "first-match" => Ok(Self::FirstMatch),
            "deny-overrides" => Ok(Self::DenyOverrides),
            s => Err(anyhow!("invalid policy combiner: {:?}", s)),
        }
    }
}

impl std::fmt::Display for Combiner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FirstMatch => "first-match".fmt(f),
            Self::DenyOverrides => "deny-overrides".fmt(f),
        }
    }
}

fn first_match(verdicts: &[PolicyVerdict]) -> Decision {
    for PolicyVerdict { policy, rules } in verdicts {
        for (i, rule) in rules.iter().enumerate() {
            if !rule.matched {
                continue;
            }
            match rule.action {
                Action::Allow => {
                    debug!(%policy, rule = i, "Allowed by rule");
                    return Decision::Ok;
                }
                Action::Deny => {
                    debug!(%policy, rule = i, "Denied by rule");
                    return Decision::Denied;
                }
                Action::Log => {
                    debug!(%policy, rule = i, "Logged by rule");
                }
                Action::Pass => {
                    debug!(%policy, rule = i, "Passed by rule");
                    break;
                }
            }
        }
    }

    debug!(policies = verdicts.len(), "No rule matched; denying");
    Decision::Denied
}

fn deny_overrides(verdicts: &[PolicyVerdict]) -> Decision {
    let matched = || {
        verdicts
            .iter()
            .flat_map(|v| v.rules.iter())
            .filter(|r| r.matched)
    };

    if matched().any(|r| r.action == Action::Deny) {
        return Decision::Denied;
    }
    if matched().any(|r| r.action == Action::Allow) {
        return Decision::Ok;
    }

    debug!(policies = verdicts.len(), "No rule allowed; denying");
    Decision::Denied
}
