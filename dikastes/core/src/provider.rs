use crate::rule::Policy;
use std::fmt;

/// Identifies the workload that receives a connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WorkloadRef {
    pub name: String,
    pub namespace: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("no workload found for {0}")]
    NotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Models the datastore that knows about workloads and the policies that
/// apply to them.
#[async_trait::async_trait]
pub trait PolicyProvider {
    /// Resolves the workload that owns a container on the given node.
    async fn resolve_workload(
        &self,
        container_id: &str,
        node_name: &str,
    ) -> Result<WorkloadRef, ProviderError>;

    /// Returns the policies that apply to a workload, in evaluation order.
    async fn get_policies(&self, workload: &WorkloadRef) -> Result<Vec<Policy>, ProviderError>;
}

// === impl WorkloadRef ===

impl fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
