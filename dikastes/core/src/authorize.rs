use crate::{
    check::{CheckRequest, Decision},
    combine::{Combine, Combiner},
    evaluate::RuleEvaluator,
    provider::PolicyProvider,
};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Decides individual checks against the policies of the workload that
/// received the connection.
#[derive(Clone, Debug)]
pub struct Authorizer<P, C = Combiner> {
    provider: P,
    combiner: C,
    evaluator: RuleEvaluator,
    node_name: Arc<str>,
}

// === impl Authorizer ===

impl<P, C> Authorizer<P, C>
where
    P: PolicyProvider + Send + Sync,
    C: Combine + Send + Sync,
{
    pub fn new(
        provider: P,
        combiner: C,
        evaluator: RuleEvaluator,
        node_name: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            provider,
            combiner,
            evaluator,
            node_name: node_name.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Decides a check for a connection made to the given container.
    ///
    /// Failures to resolve the destination workload leave the check without
    /// policies; failures to fetch policies are reported as `Internal`.
    pub async fn check(&self, container_id: &str, req: &CheckRequest) -> Decision {
        let workload = match self
            .provider
            .resolve_workload(container_id, &self.node_name)
            .await
        {
            Ok(workload) => Some(workload),
            Err(error) => {
                error!(%container_id, %error, "Failed to get endpoint for container");
                None
            }
        };

        let policies = match workload {
            Some(ref workload) => match self.provider.get_policies(workload).await {
                Ok(policies) => policies,
                Err(error) => {
                    error!(%workload, %error, "Failed to get policies");
                    return Decision::Internal;
                }
            },
            None => vec![],
        };
        debug!(policies = policies.len(), "Evaluating policies");

        let verdicts = policies
            .iter()
            .map(|policy| self.evaluator.evaluate(policy, req))
            .collect::<Vec<_>>();
        let decision = self.combiner.combine(&verdicts);

        info!(
            principal = %req.source.principal,
            method = %req.method(),
            workload = ?workload.as_ref().map(ToString::to_string),
            %decision,
            "Check complete"
        );
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        check::{HttpRequest, Peer},
        provider::{ProviderError, WorkloadRef},
        rule::{Action, EntityRule, HttpRule, Policy, Rule, ServiceAccountMatch},
        Labels,
    };
    use maplit::hashmap;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MockProvider {
        containers: HashMap<&'static str, WorkloadRef>,
        policies: Option<Vec<Policy>>,
    }

    #[async_trait::async_trait]
    impl PolicyProvider for MockProvider {
        async fn resolve_workload(
            &self,
            container_id: &str,
            node_name: &str,
        ) -> Result<WorkloadRef, ProviderError> {
            assert_eq!(node_name, "node-0");
            self.containers
                .get(container_id)
                .cloned()
                .ok_or_else(|| ProviderError::NotFound(container_id.to_string()))
        }

        async fn get_policies(&self, _: &WorkloadRef) -> Result<Vec<Policy>, ProviderError> {
            self.policies
                .clone()
                .ok_or_else(|| anyhow::anyhow!("datastore unavailable").into())
        }
    }

    fn authorizer(policies: Option<Vec<Policy>>) -> Authorizer<MockProvider> {
        let provider = MockProvider {
            containers: hashmap! {
                "c0" => WorkloadRef {
                    name: "web-0".to_string(),
                    namespace: "foo".to_string(),
                },
            },
            policies,
        };
        Authorizer::new(
            provider,
            Combiner::FirstMatch,
            RuleEvaluator::default(),
            "node-0",
        )
    }

    fn policy(rules: Vec<Rule>) -> Policy {
        Policy {
            name: "allow-bar".to_string(),
            namespace: "foo".to_string(),
            order: Some(10.0),
            inbound_rules: rules,
        }
    }

    fn req(principal: &str, method: &str) -> CheckRequest {
        CheckRequest {
            source: Peer {
                principal: principal.to_string(),
                labels: Labels::default(),
            },
            http: Some(HttpRequest {
                method: method.to_string(),
            }),
        }
    }

    fn allow_bar_gets() -> Rule {
        Rule {
            action: Action::Allow,
            source: EntityRule {
                service_accounts: Some(ServiceAccountMatch::names(["bar"])),
            },
            http: Some(HttpRule::methods(["GET"])),
        }
    }

    #[tokio::test]
    async fn allows_matching_requests() {
        let authz = authorizer(Some(vec![policy(vec![allow_bar_gets()])]));
        assert_eq!(
            authz
                .check("c0", &req("spiffe://cluster.local/ns/foo/sa/bar", "GET"))
                .await,
            Decision::Ok
        );
    }

    #[tokio::test]
    async fn denies_unmatched_requests() {
        let authz = authorizer(Some(vec![policy(vec![allow_bar_gets()])]));
        assert_eq!(
            authz
                .check("c0", &req("spiffe://cluster.local/ns/foo/sa/bar", "POST"))
                .await,
            Decision::Denied
        );
        assert_eq!(
            authz
                .check("c0", &req("spiffe://cluster.local/ns/foo/sa/baz", "GET"))
                .await,
            Decision::Denied
        );
    }

    #[tokio::test]
    async fn malformed_principal_is_denied() {
        let authz = authorizer(Some(vec![policy(vec![Rule::default()])]));
        assert_eq!(
            authz.check("c0", &req("not-a-spiffe-id", "GET")).await,
            Decision::Denied
        );
    }

    #[tokio::test]
    async fn unknown_container_has_no_policies() {
        let authz = authorizer(Some(vec![policy(vec![Rule::default()])]));
        assert_eq!(
            authz
                .check("unknown", &req("spiffe://cluster.local/ns/foo/sa/bar", "GET"))
                .await,
            Decision::Denied
        );
    }

    #[tokio::test]
    async fn policy_fetch_failure_is_internal() {
        let authz = authorizer(None);
        assert_eq!(
            authz
                .check("c0", &req("spiffe://cluster.local/ns/foo/sa/bar", "GET"))
                .await,
            Decision::Internal
        );
    }
}
