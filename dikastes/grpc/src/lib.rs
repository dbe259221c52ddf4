#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod check;
pub mod metrics;
pub mod peer;

pub use self::{
    check::AuthorizationService,
    peer::{IdentifyPeer, PeerError, ProcCgroups},
};

/// Envoy's external authorization API.
pub mod proto {
    pub mod envoy {
        pub mod service {
            pub mod auth {
                pub mod v3 {
                    tonic::include_proto!("envoy.service.auth.v3");
                }
            }
        }
    }

    pub mod google {
        pub mod rpc {
            tonic::include_proto!("google.rpc");
        }
    }
}
