#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use dikastes_core as core;
pub use dikastes_grpc as grpc;
pub use dikastes_k8s_api as k8s;
pub use dikastes_k8s_index as index;

mod args;
mod client;
mod server;

pub use self::args::Args;

use self::core::{Policy, PolicyProvider, ProviderError, WorkloadRef};

/// Answers provider queries from the cluster index.
#[derive(Clone, Debug)]
struct PolicyDiscover(index::SharedIndex);

impl PolicyDiscover {
    pub fn new(index: index::SharedIndex) -> Self {
        Self(index)
    }
}

#[async_trait::async_trait]
impl PolicyProvider for PolicyDiscover {
    async fn resolve_workload(
        &self,
        container_id: &str,
        node_name: &str,
    ) -> Result<WorkloadRef, ProviderError> {
        self.0.read().resolve_container(container_id, node_name)
    }

    async fn get_policies(&self, workload: &WorkloadRef) -> Result<Vec<Policy>, ProviderError> {
        self.0.read().policies_for(workload)
    }
}
