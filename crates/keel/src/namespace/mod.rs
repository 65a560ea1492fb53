//! Namespace mode resolution.
//!
//! Each namespace kind (PID, IPC, UTS, user, network) gets a
//! [`NamespaceMode`]. Container-mode references are resolved against a
//! [`ContainerLookup`] so later stages see plain peer data:
//! - the peer's process label, duplicated by the security resolver
//! - the peer's shm directory, for IPC sharing

mod mode;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use keel_common::{KeelError, KeelResult};
use keel_oci::runtime::NamespaceType;

use crate::lookup::{ContainerLookup, PeerContainer};

pub use mode::NamespaceMode;

/// Host shm directory shared by `--ipc host`.
pub const HOST_SHM_DIR: &str = "/dev/shm";

/// Namespace kinds a user can configure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceKind {
    /// PID namespace.
    Pid,
    /// IPC namespace.
    Ipc,
    /// UTS namespace.
    Uts,
    /// User namespace.
    User,
    /// Network namespace.
    Network,
}

impl NamespaceKind {
    /// Every configurable kind.
    pub const ALL: [Self; 5] = [Self::Pid, Self::Ipc, Self::Uts, Self::User, Self::Network];

    /// The flag that configures this kind.
    #[must_use]
    pub const fn option(self) -> &'static str {
        match self {
            Self::Pid => "pid",
            Self::Ipc => "ipc",
            Self::Uts => "uts",
            Self::User => "userns",
            Self::Network => "network",
        }
    }

    /// The matching OCI namespace type.
    #[must_use]
    pub const fn oci_type(self) -> NamespaceType {
        match self {
            Self::Pid => NamespaceType::Pid,
            Self::Ipc => NamespaceType::Ipc,
            Self::Uts => NamespaceType::Uts,
            Self::User => NamespaceType::User,
            Self::Network => NamespaceType::Network,
        }
    }
}

impl fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.option())
    }
}

/// A parsed mode plus, for container mode, the peer it refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedNamespace {
    /// The parsed mode.
    pub mode: NamespaceMode,
    /// The peer container, present exactly in container mode.
    pub peer: Option<PeerContainer>,
}

impl ResolvedNamespace {
    /// The peer's process label, if sharing with a labeled container.
    #[must_use]
    pub fn peer_label(&self) -> Option<&str> {
        self.peer
            .as_ref()
            .map(|p| p.process_label.as_str())
            .filter(|label| !label.is_empty())
    }
}

/// Parse `value` for `kind` and resolve any peer reference.
///
/// A missing peer is a hard [`KeelError::ContainerNotFound`].
pub fn resolve(
    kind: NamespaceKind,
    value: &str,
    lookup: &dyn ContainerLookup,
) -> KeelResult<ResolvedNamespace> {
    let mode = NamespaceMode::parse(kind, value)?;

    let peer = match mode.container() {
        Some(reference) => Some(lookup.lookup(reference).ok_or_else(|| {
            KeelError::ContainerNotFound {
                reference: reference.to_string(),
            }
        })?),
        None => None,
    };

    tracing::debug!(namespace = %kind, mode = %mode, "Resolved namespace mode");

    Ok(ResolvedNamespace { mode, peer })
}

/// Directory to bind at `/dev/shm` when IPC is not private.
#[must_use]
pub fn ipc_shm_dir(ipc: &ResolvedNamespace) -> Option<PathBuf> {
    match (&ipc.mode, &ipc.peer) {
        (NamespaceMode::Host, _) => Some(PathBuf::from(HOST_SHM_DIR)),
        (NamespaceMode::Container(_), Some(peer)) => Some(peer.shm_dir.clone()),
        _ => None,
    }
}

/// Resolved namespace modes for a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NamespaceConfig {
    /// PID namespace.
    pub pid: NamespaceMode,
    /// IPC namespace.
    pub ipc: NamespaceMode,
    /// UTS namespace.
    pub uts: NamespaceMode,
    /// User namespace.
    pub user: NamespaceMode,
    /// Network namespace.
    pub network: NamespaceMode,
    /// Peer IDs for container-mode namespaces, keyed by kind.
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub peers: std::collections::BTreeMap<NamespaceKind, String>,
    /// Directory backing `/dev/shm` when IPC is shared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shm_dir: Option<PathBuf>,
}

impl NamespaceConfig {
    /// Mode for a kind.
    #[must_use]
    pub const fn mode(&self, kind: NamespaceKind) -> &NamespaceMode {
        match kind {
            NamespaceKind::Pid => &self.pid,
            NamespaceKind::Ipc => &self.ipc,
            NamespaceKind::Uts => &self.uts,
            NamespaceKind::User => &self.user,
            NamespaceKind::Network => &self.network,
        }
    }

    /// Record a resolved namespace.
    pub fn set(&mut self, kind: NamespaceKind, resolved: &ResolvedNamespace) {
        if let Some(peer) = &resolved.peer {
            self.peers.insert(kind, peer.id.clone());
        }
        if kind == NamespaceKind::Ipc {
            self.shm_dir = ipc_shm_dir(resolved);
        }
        let slot = match kind {
            NamespaceKind::Pid => &mut self.pid,
            NamespaceKind::Ipc => &mut self.ipc,
            NamespaceKind::Uts => &mut self.uts,
            NamespaceKind::User => &mut self.user,
            NamespaceKind::Network => &mut self.network,
        };
        *slot = resolved.mode.clone();
    }
}
