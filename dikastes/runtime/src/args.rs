use crate::{client, core::Combiner, server};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

const DEFAULT_SOCKET: &str = "/var/run/dikastes/dikastes.sock";

#[derive(Debug, Parser)]
#[clap(name = "dikastes", about = "Dikastes - the decider", version)]
pub struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serves authorization checks on a Unix socket.
    Server(ServerArgs),

    /// Sends a single authorization check to a running server.
    Client(ClientArgs),
}

#[derive(Debug, clap::Args)]
pub(crate) struct ServerArgs {
    #[clap(long, default_value = "dikastes=info,warn", env = "DIKASTES_LOG")]
    pub(crate) log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    pub(crate) log_format: kubert::LogFormat,

    #[clap(flatten)]
    pub(crate) client: kubert::ClientArgs,

    #[clap(flatten)]
    pub(crate) admin: kubert::AdminArgs,

    /// Unix domain socket path.
    #[clap(short, long, default_value = DEFAULT_SOCKET)]
    pub(crate) listen: PathBuf,

    /// The node this instance runs on. Only containers scheduled on this node
    /// are authorized.
    #[clap(long, env = "K8S_NODENAME")]
    pub(crate) node_name: String,

    /// Where the host's procfs is mounted.
    #[clap(long, default_value = "/proc")]
    pub(crate) proc_root: PathBuf,

    /// How the verdicts of multiple policies are combined: `first-match` or
    /// `deny-overrides`.
    #[clap(long, default_value = "first-match")]
    pub(crate) policy_combiner: Combiner,
}

#[derive(Debug, clap::Args)]
pub(crate) struct ClientArgs {
    #[clap(long, default_value = "dikastes=info,warn", env = "DIKASTES_LOG")]
    pub(crate) log_level: String,

    /// Socket path to dial.
    #[clap(short, long, default_value = DEFAULT_SOCKET)]
    pub(crate) dial: PathBuf,

    #[clap(long, default_value = "cluster.local")]
    pub(crate) trust_domain: String,

    /// The HTTP method of the checked request. When unset, the check carries
    /// no HTTP attributes.
    #[clap(long)]
    pub(crate) method: Option<String>,

    /// Service account namespace.
    pub(crate) namespace: String,

    /// Service account name.
    pub(crate) account: String,
}

// === impl Args ===

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Server(args) => server::run(args).await,
            Command::Client(args) => client::run(args).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_server_args() {
        let Args { command } = Args::try_parse_from([
            "dikastes",
            "server",
            "--node-name=node-0",
            "--policy-combiner=deny-overrides",
        ])
        .expect("args must parse");
        let Command::Server(args) = command else {
            panic!("expected server command");
        };
        assert_eq!(args.listen, PathBuf::from(DEFAULT_SOCKET));
        assert_eq!(args.node_name, "node-0");
        assert_eq!(args.proc_root, PathBuf::from("/proc"));
        assert_eq!(args.policy_combiner, Combiner::DenyOverrides);
    }

    #[test]
    fn rejects_unknown_combiner() {
        Args::try_parse_from([
            "dikastes",
            "server",
            "--node-name=node-0",
            "--policy-combiner=most-specific",
        ])
        .expect_err("combiner must be validated");
    }

    #[test]
    fn parses_client_args() {
        let Args { command } = Args::try_parse_from([
            "dikastes",
            "client",
            "--method=GET",
            "--dial=/tmp/dikastes.sock",
            "foo",
            "bar",
        ])
        .expect("args must parse");
        let Command::Client(args) = command else {
            panic!("expected client command");
        };
        assert_eq!(args.dial, PathBuf::from("/tmp/dikastes.sock"));
        assert_eq!(args.trust_domain, "cluster.local");
        assert_eq!(args.method.as_deref(), Some("GET"));
        assert_eq!(args.namespace, "foo");
        assert_eq!(args.account, "bar");
    }
}
