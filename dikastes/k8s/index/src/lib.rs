//! Dikastes policy index
//!
//! The index answers the two questions an authorization check asks of the
//! cluster: which workload owns the container that received a connection, and
//! which network policies apply to that workload. It is fed by watches on:
//!
//! - `Pod` resources scheduled on the local node. Each pod's container
//!   statuses link container IDs back to the pod; the pod's labels are used to
//!   select policies.
//! - `NetworkPolicy` resources in all namespaces. Each policy is converted
//!   into its core representation when it is applied, so that checks never
//!   parse resources on the request path.
//!
//! ```text
//! [ Container ID ] -> [ Pod ] <- (selector) - [ NetworkPolicy ]
//! ```
//!
//! Both resources are namespaced and policies only select pods in their own
//! namespace, so state is kept in a per-namespace index.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod network_policy;
mod pod;

#[cfg(test)]
mod tests;

use self::{network_policy::IndexedPolicy, pod::Pod};
use ahash::AHashMap as HashMap;
use dikastes_core::{Policy, ProviderError, WorkloadRef};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::trace;

pub type SharedIndex = Arc<RwLock<Index>>;

/// Holds all indexing state. Updated by the watch tasks and read by checks.
#[derive(Debug, Default)]
pub struct Index {
    namespaces: HashMap<String, Namespace>,

    /// Maps container IDs to the pod that runs them.
    containers: HashMap<String, WorkloadRef>,
}

#[derive(Debug, Default)]
struct Namespace {
    pods: HashMap<String, Pod>,
    policies: HashMap<String, IndexedPolicy>,
}

// === impl Index ===

impl Index {
    pub fn shared() -> SharedIndex {
        Arc::new(RwLock::new(Self::default()))
    }

    /// Finds the pod that runs the given container on the given node.
    pub fn resolve_container(
        &self,
        container_id: &str,
        node_name: &str,
    ) -> Result<WorkloadRef, ProviderError> {
        let workload = self
            .containers
            .get(container_id)
            .ok_or_else(|| ProviderError::NotFound(format!("container {container_id}")))?;

        let pod = self.pod(workload)?;
        if pod.node_name.as_deref() != Some(node_name) {
            return Err(ProviderError::NotFound(format!(
                "container {container_id} on node {node_name}"
            )));
        }

        trace!(%container_id, %workload, "Resolved container");
        Ok(workload.clone())
    }

    /// Returns the policies that select a pod, ordered by their `order` (with
    /// unordered policies last) and then by name.
    pub fn policies_for(&self, workload: &WorkloadRef) -> Result<Vec<Policy>, ProviderError> {
        let pod = self.pod(workload)?;
        let mut policies = self
            .namespaces
            .get(&workload.namespace)
            .into_iter()
            .flat_map(|ns| ns.policies.values())
            .filter(|p| p.selects(&pod.labels))
            .map(|p| p.policy.clone())
            .collect::<Vec<_>>();

        policies.sort_by(|a, b| {
            let order = match (a.order, b.order) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            };
            order.then_with(|| a.name.cmp(&b.name))
        });
        Ok(policies)
    }

    fn pod(&self, workload: &WorkloadRef) -> Result<&Pod, ProviderError> {
        self.namespaces
            .get(&workload.namespace)
            .and_then(|ns| ns.pods.get(&workload.name))
            .ok_or_else(|| ProviderError::NotFound(format!("pod {workload}")))
    }

    fn ns_or_default(&mut self, namespace: String) -> &mut Namespace {
        self.namespaces.entry(namespace).or_default()
    }

    fn gc_namespace(&mut self, namespace: &str) {
        if let Some(ns) = self.namespaces.get(namespace) {
            if ns.pods.is_empty() && ns.policies.is_empty() {
                self.namespaces.remove(namespace);
            }
        }
    }
}
