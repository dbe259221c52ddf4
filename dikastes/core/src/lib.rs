#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod authorize;
mod check;
pub mod combine;
mod evaluate;
pub mod http_match;
pub mod identity;
mod labels;
mod provider;
pub mod rule;
pub mod selector;
pub mod service_account_match;

pub use self::{
    authorize::Authorizer,
    check::{CheckRequest, Decision, HttpRequest, Peer},
    combine::{Combine, Combiner, PolicyVerdict, RuleVerdict},
    evaluate::RuleEvaluator,
    identity::{IdentityParser, MalformedIdentity, ServiceAccountIdentity},
    labels::Labels,
    provider::{PolicyProvider, ProviderError, WorkloadRef},
    rule::{Action, EntityRule, HttpRule, Policy, Rule, ServiceAccountMatch},
    selector::Selector,
};
