use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Describes the traffic permitted to reach the workloads selected in a
/// namespace.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "crd.projectcalico.org",
    version = "v1",
    kind = "NetworkPolicy",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicySpec {
    /// Policies with a lower order are applied first.
    pub order: Option<f64>,

    /// Selects the workloads this policy applies to. An empty selector
    /// applies to all workloads in the namespace.
    #[serde(default)]
    pub selector: String,

    /// The directions this policy applies to. When unset, a policy applies to
    /// ingress traffic.
    pub types: Option<Vec<PolicyType>>,

    #[serde(default)]
    pub ingress: Vec<RuleSpec>,

    #[serde(default)]
    pub egress: Vec<RuleSpec>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum PolicyType {
    Ingress,
    Egress,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RuleSpec {
    /// One of `Allow`, `Deny`, `Log` or `Pass`.
    pub action: String,

    #[serde(default)]
    pub source: EntityRuleSpec,

    pub http: Option<HttpMatchSpec>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntityRuleSpec {
    pub service_accounts: Option<ServiceAccountMatchSpec>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountMatchSpec {
    #[serde(default)]
    pub names: Vec<String>,

    #[serde(default)]
    pub selector: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HttpMatchSpec {
    #[serde(default)]
    pub methods: Vec<String>,
}

// === impl NetworkPolicySpec ===

impl NetworkPolicySpec {
    pub fn applies_to_ingress(&self) -> bool {
        self.types
            .as_ref()
            .map_or(true, |types| types.contains(&PolicyType::Ingress))
    }
}
