use crate::{
    args::ClientArgs,
    grpc::proto::envoy::service::auth::v3::{
        attribute_context, authorization_client::AuthorizationClient, AttributeContext,
        CheckRequest,
    },
};
use anyhow::{Context, Result};
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tonic::transport::{Endpoint, Uri};
use tracing::info;
use tracing_subscriber::EnvFilter;

pub(crate) async fn run(args: ClientArgs) -> Result<()> {
    let ClientArgs {
        log_level,
        dial,
        trust_domain,
        method,
        namespace,
        account,
    } = args;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&log_level)?)
        .init();

    // The URI is ignored; every connection is made to the socket.
    let channel = Endpoint::try_from("http://[::]:50051")?
        .connect_with_connector(tower::service_fn(move |_: Uri| {
            let dial = dial.clone();
            async move { Ok::<_, std::io::Error>(TokioIo::new(UnixStream::connect(dial).await?)) }
        }))
        .await
        .context("failed to dial")?;

    let req = check_request(&trust_domain, &namespace, &account, method);
    let rsp = AuthorizationClient::new(channel)
        .check(req)
        .await
        .context("check failed")?
        .into_inner();

    let status = rsp.status.unwrap_or_default();
    info!(code = status.code, message = %status.message, "Check response");
    Ok(())
}

fn check_request(
    trust_domain: &str,
    namespace: &str,
    account: &str,
    method: Option<String>,
) -> CheckRequest {
    CheckRequest {
        attributes: Some(AttributeContext {
            source: Some(attribute_context::Peer {
                principal: format!("spiffe://{trust_domain}/ns/{namespace}/sa/{account}"),
                ..Default::default()
            }),
            request: method.map(|method| attribute_context::Request {
                http: Some(attribute_context::HttpRequest {
                    method,
                    ..Default::default()
                }),
            }),
            ..Default::default()
        }),
    }
}
