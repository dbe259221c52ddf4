use crate::{
    check::CheckRequest,
    combine::{PolicyVerdict, RuleVerdict},
    http_match::match_http,
    identity::IdentityParser,
    rule::{Policy, Rule},
    service_account_match::match_service_account,
};
use tracing::{debug, warn};

/// Evaluates policy rules against checks.
#[derive(Clone, Debug, Default)]
pub struct RuleEvaluator {
    identities: IdentityParser,
}

// === impl RuleEvaluator ===

impl RuleEvaluator {
    pub fn new(identities: IdentityParser) -> Self {
        Self { identities }
    }

    /// Returns true when both the caller and the request satisfy the rule.
    ///
    /// A caller whose principal is not a service account identity never
    /// matches.
    pub fn matches(&self, rule: &Rule, req: &CheckRequest) -> bool {
        debug!(?rule, "Checking rule");
        self.match_peer(rule, req) && match_http(rule.http.as_ref(), req.method())
    }

    fn match_peer(&self, rule: &Rule, req: &CheckRequest) -> bool {
        let id = match self.identities.parse(&req.source.principal) {
            Ok(id) => id,
            Err(error) => {
                warn!(%error, "Unable to parse authenticated principal as SPIFFE ID");
                return false;
            }
        };
        debug!(name = %id.name, namespace = %id.namespace, "Parsed SPIFFE ID");

        match_service_account(
            rule.source.service_accounts.as_ref(),
            &id,
            &req.source.labels,
        )
    }

    /// Evaluates every inbound rule of a policy, in order.
    pub fn evaluate(&self, policy: &Policy, req: &CheckRequest) -> PolicyVerdict {
        let rules = policy
            .inbound_rules
            .iter()
            .map(|rule| RuleVerdict {
                action: rule.action,
                matched: self.matches(rule, req),
            })
            .collect();
        PolicyVerdict {
            policy: format!("{}/{}", policy.namespace, policy.name),
            rules,
        }
    }
}
