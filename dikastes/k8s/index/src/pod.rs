use crate::Index;
use dikastes_core::{Labels, WorkloadRef};
use dikastes_k8s_api::{self as k8s, ResourceExt};
use tracing::{debug, instrument};

/// Holds the state of an individual pod.
#[derive(Debug)]
pub(crate) struct Pod {
    pub(crate) labels: Labels,
    pub(crate) node_name: Option<String>,
    container_ids: Vec<String>,
}

/// Strips the container runtime scheme from a container status ID, e.g.
/// `containerd://<id>`.
pub(crate) fn container_id(status_id: &str) -> &str {
    status_id
        .split_once("://")
        .map_or(status_id, |(_, id)| id)
}

fn container_ids(pod: &k8s::Pod) -> Vec<String> {
    let Some(status) = pod.status.as_ref() else {
        return vec![];
    };
    status
        .init_container_statuses
        .iter()
        .chain(status.container_statuses.iter())
        .flatten()
        .filter_map(|s| s.container_id.as_deref())
        .map(container_id)
        .filter(|id| !id.is_empty())
        .map(ToString::to_string)
        .collect()
}

// === impl Index ===

impl kubert::index::IndexNamespacedResource<k8s::Pod> for Index {
    #[instrument(skip_all, fields(ns = ?pod.metadata.namespace, name = %pod.name_unchecked()))]
    fn apply(&mut self, pod: k8s::Pod) {
        let namespace = pod.namespace().expect("Pod must have a namespace");
        let name = pod.name_unchecked();
        let workload = WorkloadRef {
            name: name.clone(),
            namespace: namespace.clone(),
        };

        let container_ids = container_ids(&pod);
        let state = Pod {
            labels: Labels::from(pod.labels().clone()),
            node_name: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
            container_ids: container_ids.clone(),
        };
        debug!(containers = container_ids.len(), "Indexing pod");

        if let Some(prior) = self.ns_or_default(namespace).pods.insert(name, state) {
            for id in prior.container_ids {
                self.containers.remove(&id);
            }
        }
        for id in container_ids {
            self.containers.insert(id, workload.clone());
        }
    }

    #[instrument(skip(self))]
    fn delete(&mut self, namespace: String, name: String) {
        let Some(pod) = self
            .namespaces
            .get_mut(&namespace)
            .and_then(|ns| ns.pods.remove(&name))
        else {
            return;
        };

        debug!("Removing pod");
        for id in pod.container_ids {
            self.containers.remove(&id);
        }
        self.gc_namespace(&namespace);
    }
}
