use crate::Index;
use anyhow::{Context, Result};
use dikastes_core::{
    EntityRule, HttpRule, Labels, Policy, Rule, Selector, ServiceAccountMatch,
};
use dikastes_k8s_api::{
    self as k8s,
    network_policy::{HttpMatchSpec, RuleSpec},
    ResourceExt,
};
use tracing::{debug, instrument, warn};

/// A policy and the selector over the pods it applies to.
#[derive(Debug)]
pub(crate) struct IndexedPolicy {
    selector: Selector,
    pub(crate) policy: Policy,
}

// === impl IndexedPolicy ===

impl IndexedPolicy {
    fn new(namespace: String, name: String, spec: k8s::NetworkPolicySpec) -> Result<Self> {
        let selector = Selector::parse(&spec.selector)
            .with_context(|| format!("invalid policy selector {:?}", spec.selector))?;

        let inbound_rules = spec
            .ingress
            .into_iter()
            .enumerate()
            .map(|(i, rule)| mk_rule(rule).with_context(|| format!("invalid ingress rule {i}")))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            selector,
            policy: Policy {
                name,
                namespace,
                order: spec.order,
                inbound_rules,
            },
        })
    }

    pub(crate) fn selects(&self, labels: &Labels) -> bool {
        self.selector.matches(labels)
    }
}

fn mk_rule(RuleSpec { action, source, http }: RuleSpec) -> Result<Rule> {
    let action = action.parse()?;
    let service_accounts = source.service_accounts.map(|sa| ServiceAccountMatch {
        names: sa.names.into_iter().collect(),
        selector: sa.selector,
    });
    let http = http.map(|HttpMatchSpec { methods }| HttpRule { methods });

    Ok(Rule {
        action,
        source: EntityRule { service_accounts },
        http,
    })
}

// === impl Index ===

impl kubert::index::IndexNamespacedResource<k8s::NetworkPolicy> for Index {
    #[instrument(skip_all, fields(ns = ?policy.metadata.namespace, name = %policy.name_unchecked()))]
    fn apply(&mut self, policy: k8s::NetworkPolicy) {
        let namespace = policy
            .namespace()
            .expect("NetworkPolicy must have a namespace");
        let name = policy.name_unchecked();

        if !policy.spec.applies_to_ingress() {
            debug!("Ignoring egress-only policy");
            self.remove_policy(namespace, name);
            return;
        }

        let indexed = match IndexedPolicy::new(namespace.clone(), name.clone(), policy.spec) {
            Ok(indexed) => indexed,
            Err(error) => {
                warn!(error = %format_args!("{error:#}"), "Ignoring invalid NetworkPolicy");
                self.remove_policy(namespace, name);
                return;
            }
        };

        debug!(rules = indexed.policy.inbound_rules.len(), "Indexing policy");
        self.ns_or_default(namespace).policies.insert(name, indexed);
    }

    #[instrument(skip(self))]
    fn delete(&mut self, namespace: String, name: String) {
        self.remove_policy(namespace, name);
    }
}

impl Index {
    fn remove_policy(&mut self, namespace: String, name: String) {
        if let Some(ns) = self.namespaces.get_mut(&namespace) {
            if ns.policies.remove(&name).is_some() {
                debug!("Removed policy");
            }
        }
        self.gc_namespace(&namespace);
    }
}
