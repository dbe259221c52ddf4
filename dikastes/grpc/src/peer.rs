//! Identifies the container on the other end of a connection.
//!
//! Proxies connect to the authorization service over a Unix socket, so the
//! kernel reports the connecting process in the socket's peer credentials. The
//! process's cgroup path names the container it runs in, e.g.:
//!
//! ```text
//! 0::/kubepods.slice/kubepods-pod1.slice/cri-containerd-<id>.scope
//! 11:memory:/kubepods/burstable/pod1/<id>
//! ```

use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tonic::transport::server::UdsConnectInfo;

#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error("connection has no peer credentials")]
    NoCredentials,

    #[error("peer credentials do not include a process id")]
    NoPid,

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no container id in cgroups of process {pid}")]
    NoContainer { pid: i32 },
}

/// Derives the container identifier of a request's caller.
pub trait IdentifyPeer {
    fn container_id(&self, extensions: &tonic::Extensions) -> Result<String, PeerError>;
}

/// Reads container identifiers from `<proc-root>/<pid>/cgroup`.
#[derive(Clone, Debug)]
pub struct ProcCgroups {
    proc_root: PathBuf,
}

const CONTAINER_ID_LEN: usize = 64;

// === impl ProcCgroups ===

impl ProcCgroups {
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    pub fn proc_root(&self) -> &Path {
        &self.proc_root
    }

    pub fn container_id_for_pid(&self, pid: i32) -> Result<String, PeerError> {
        let path = self.proc_root.join(pid.to_string()).join("cgroup");
        let cgroups = fs::read_to_string(&path).map_err(|source| PeerError::Read { path, source })?;
        parse_container_id(&cgroups)
            .map(ToString::to_string)
            .ok_or(PeerError::NoContainer { pid })
    }
}

impl Default for ProcCgroups {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl IdentifyPeer for ProcCgroups {
    fn container_id(&self, extensions: &tonic::Extensions) -> Result<String, PeerError> {
        let cred = extensions
            .get::<UdsConnectInfo>()
            .and_then(|info| info.peer_cred)
            .ok_or(PeerError::NoCredentials)?;
        let pid = cred.pid().ok_or(PeerError::NoPid)?;
        tracing::trace!(pid, "Identified peer process");
        self.container_id_for_pid(pid)
    }
}

fn parse_container_id(cgroups: &str) -> Option<&str> {
    cgroups
        .lines()
        .filter_map(|line| line.splitn(3, ':').nth(2))
        .flat_map(|path| path.rsplit('/'))
        .map(trim_scope)
        .find(|segment| is_container_id(segment))
}

/// Strips systemd scope decorations, e.g. `docker-<id>.scope`.
fn trim_scope(segment: &str) -> &str {
    let segment = segment.strip_suffix(".scope").unwrap_or(segment);
    segment.rsplit_once('-').map_or(segment, |(_, id)| id)
}

fn is_container_id(s: &str) -> bool {
    s.len() == CONTAINER_ID_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}
