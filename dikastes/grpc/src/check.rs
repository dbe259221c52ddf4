use crate::{
    metrics::CheckMetrics,
    peer::IdentifyPeer,
    proto::{
        envoy::service::auth::v3::{
            self as proto,
            attribute_context,
            authorization_server::{Authorization, AuthorizationServer},
        },
        google::rpc,
    },
};
use dikastes_core::{
    Authorizer, CheckRequest, Combine, Decision, HttpRequest, Labels, Peer, PolicyProvider,
};
use std::sync::Arc;
use tracing::{debug, error};

/// Serves Envoy's `Authorization/Check` RPC.
#[derive(Debug)]
pub struct AuthorizationService<P, C, I> {
    authorizer: Arc<Authorizer<P, C>>,
    peers: Arc<I>,
    metrics: CheckMetrics,
}

// === impl AuthorizationService ===

impl<P, C, I> AuthorizationService<P, C, I>
where
    P: PolicyProvider + Send + Sync + 'static,
    C: Combine + Send + Sync + 'static,
    I: IdentifyPeer + Send + Sync + 'static,
{
    pub fn new(authorizer: Authorizer<P, C>, peers: I, metrics: CheckMetrics) -> Self {
        Self {
            authorizer: Arc::new(authorizer),
            peers: Arc::new(peers),
            metrics,
        }
    }

    pub fn svc(self) -> AuthorizationServer<Self> {
        AuthorizationServer::new(self)
    }
}

impl<P, C, I> Clone for AuthorizationService<P, C, I> {
    fn clone(&self) -> Self {
        Self {
            authorizer: self.authorizer.clone(),
            peers: self.peers.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

#[async_trait::async_trait]
impl<P, C, I> Authorization for AuthorizationService<P, C, I>
where
    P: PolicyProvider + Send + Sync + 'static,
    C: Combine + Send + Sync + 'static,
    I: IdentifyPeer + Send + Sync + 'static,
{
    async fn check(
        &self,
        req: tonic::Request<proto::CheckRequest>,
    ) -> Result<tonic::Response<proto::CheckResponse>, tonic::Status> {
        let _rsp = self.metrics.start();

        let container_id = self.peers.container_id(req.extensions());
        let check = to_check_request(req.into_inner());
        debug!(?check, "Check");

        let decision = match container_id {
            Ok(id) => self.authorizer.check(&id, &check).await,
            Err(error) => {
                error!(%error, "Failed to get container ID");
                Decision::Internal
            }
        };

        self.metrics.decided(decision);
        Ok(tonic::Response::new(to_response(decision)))
    }
}

fn to_check_request(req: proto::CheckRequest) -> CheckRequest {
    let attrs = req.attributes.unwrap_or_default();
    let source = attrs
        .source
        .map(|attribute_context::Peer {
                 principal, labels, ..
             }| Peer {
            principal,
            labels: Labels::from(labels),
        })
        .unwrap_or_default();
    let http = attrs
        .request
        .and_then(|r| r.http)
        .map(|http| HttpRequest {
            method: http.method,
        });
    CheckRequest { source, http }
}

fn to_response(decision: Decision) -> proto::CheckResponse {
    let (code, message) = match decision {
        Decision::Ok => (tonic::Code::Ok, "allowed by policy"),
        Decision::Denied => (tonic::Code::PermissionDenied, "denied by policy"),
        Decision::Internal => (tonic::Code::Internal, "failed to evaluate policies"),
    };
    proto::CheckResponse {
        status: Some(rpc::Status {
            code: code as i32,
            message: message.to_string(),
        }),
    }
}
