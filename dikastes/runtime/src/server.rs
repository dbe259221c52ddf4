use crate::{
    args::ServerArgs,
    core::{Authorizer, RuleEvaluator},
    grpc::{metrics::CheckMetrics, AuthorizationService, ProcCgroups},
    index::Index,
    k8s, PolicyDiscover,
};
use anyhow::{bail, Context, Result};
use futures::prelude::*;
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use std::{fs, io, os::unix::fs::PermissionsExt, path::Path};
use tokio::net::UnixListener;
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::Server;
use tracing::{debug, info, info_span, Instrument};

pub(crate) async fn run(args: ServerArgs) -> Result<()> {
    let ServerArgs {
        log_level,
        log_format,
        client,
        admin,
        listen,
        node_name,
        proc_root,
        policy_combiner,
    } = args;

    // Build the index that maps connections to workloads and workloads to the
    // policies that select them.
    let index = Index::shared();

    let mut prom = <Registry>::default();
    let check_metrics = CheckMetrics::register(&mut prom);
    let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

    let mut runtime = kubert::Runtime::builder()
        .with_log(log_level, log_format)
        .with_metrics(rt_metrics)
        .with_admin(admin.into_builder().with_prometheus(prom))
        .with_client(client)
        .build()
        .await?;

    // Spawn resource watches. Only pods on this node can connect to this
    // instance, so only they are indexed.
    let pods = runtime.watch_all::<k8s::Pod>(
        watcher::Config::default().fields(&format!("spec.nodeName={node_name}")),
    );
    tokio::spawn(kubert::index::namespaced(index.clone(), pods).instrument(info_span!("pods")));

    let policies = runtime.watch_all::<k8s::NetworkPolicy>(watcher::Config::default());
    tokio::spawn(
        kubert::index::namespaced(index.clone(), policies)
            .instrument(info_span!("networkpolicies")),
    );

    let authorizer = Authorizer::new(
        PolicyDiscover::new(index),
        policy_combiner,
        RuleEvaluator::default(),
        node_name,
    );
    let svc = AuthorizationService::new(authorizer, ProcCgroups::new(proc_root), check_metrics);

    // Run the gRPC server, serving checks by looking up against the index
    // handle.
    let listener = bind(&listen)?;
    info!(listen = %listen.display(), combiner = %policy_combiner, "Serving authorization checks");
    let drain = runtime.shutdown_handle();
    tokio::spawn(
        async move {
            let (close_tx, close_rx) = tokio::sync::oneshot::channel();
            tokio::pin! {
                let srv = Server::builder()
                    .add_service(svc.svc())
                    .serve_with_incoming_shutdown(
                        UnixListenerStream::new(listener),
                        close_rx.map(|_| {}),
                    );
            }

            let res = tokio::select! {
                res = (&mut srv) => res,
                handle = drain.signaled() => {
                    let _ = close_tx.send(());
                    handle.release_after(srv).await
                }
            };
            if let Err(error) = res {
                tracing::error!(%error, "gRPC server failed");
            }
        }
        .instrument(info_span!("grpc")),
    );

    // Block the main thread on the shutdown signal. Once it fires, wait for the
    // background tasks to complete before exiting.
    if runtime.run().await.is_err() {
        bail!("Aborted");
    }

    remove_stale(&listen)?;
    Ok(())
}

/// Binds a Unix socket that any local process may connect to, replacing a
/// socket left behind by a previous instance.
fn bind(path: &Path) -> Result<UnixListener> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    remove_stale(path)?;

    let listener = UnixListener::bind(path)
        .with_context(|| format!("unable to listen on {}", path.display()))?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o777))
        .context("unable to set write permission on socket")?;
    Ok(listener)
}

fn remove_stale(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed socket");
            Ok(())
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(error) => {
            Err(error).with_context(|| format!("unable to remove {}", path.display()))
        }
    }
}
