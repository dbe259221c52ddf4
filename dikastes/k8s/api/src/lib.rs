#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod network_policy;

pub use self::network_policy::{NetworkPolicy, NetworkPolicySpec};
pub use k8s_openapi::{
    api::{
        self,
        core::v1::{ContainerStatus, Pod, PodSpec, PodStatus},
    },
    apimachinery,
};
pub use kube::{
    api::{ObjectMeta, ResourceExt},
    Resource,
};
