//! Peer container lookup.
//!
//! Namespace sharing (`--pid container:db`, `--ipc container:db`, ...) needs
//! a read-only view of already existing containers. Resolvers receive it as
//! a [`ContainerLookup`] trait object; nothing here is a process-wide global.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use keel_common::KeelResult;

/// What a resolver may read from an existing container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PeerContainer {
    /// Full container ID.
    pub id: String,
    /// Container name.
    #[serde(default)]
    pub name: String,
    /// SELinux process label (empty when unlabeled).
    #[serde(default)]
    pub process_label: String,
    /// SELinux mount label (empty when unlabeled).
    #[serde(default)]
    pub mount_label: String,
    /// Directory backing the container's `/dev/shm`.
    #[serde(default)]
    pub shm_dir: PathBuf,
}

/// Resolve a container reference (ID, name or unique ID prefix) to a peer.
pub trait ContainerLookup: Send + Sync {
    /// Look up a container; `None` when it does not exist.
    fn lookup(&self, reference: &str) -> Option<PeerContainer>;
}

/// In-memory container registry.
///
/// Membership can change between requests; lookups take a read lock only.
#[derive(Debug, Default)]
pub struct ContainerRegistry {
    containers: RwLock<BTreeMap<String, PeerContainer>>,
}

impl ContainerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of peers.
    #[must_use]
    pub fn from_peers(peers: impl IntoIterator<Item = PeerContainer>) -> Self {
        let registry = Self::new();
        for peer in peers {
            registry.insert(peer);
        }
        registry
    }

    /// Load a registry from a JSON array of peers.
    pub fn load(path: &Path) -> KeelResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let peers: Vec<PeerContainer> = serde_json::from_str(&content)?;
        tracing::debug!(path = %path.display(), containers = peers.len(), "Loaded container registry");
        Ok(Self::from_peers(peers))
    }

    /// Register or replace a container.
    pub fn insert(&self, peer: PeerContainer) {
        self.containers.write().insert(peer.id.clone(), peer);
    }

    /// Remove a container by ID.
    pub fn remove(&self, id: &str) -> Option<PeerContainer> {
        self.containers.write().remove(id)
    }

    /// Number of registered containers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.containers.read().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.containers.read().is_empty()
    }
}

impl ContainerLookup for ContainerRegistry {
    fn lookup(&self, reference: &str) -> Option<PeerContainer> {
        if reference.is_empty() {
            return None;
        }

        let containers = self.containers.read();

        if let Some(peer) = containers.get(reference) {
            return Some(peer.clone());
        }
        if let Some(peer) = containers.values().find(|p| p.name == reference) {
            return Some(peer.clone());
        }

        // Ambiguous prefixes resolve to nothing.
        let mut prefixed = containers.values().filter(|p| p.id.starts_with(reference));
        match (prefixed.next(), prefixed.next()) {
            (Some(peer), None) => Some(peer.clone()),
            _ => None,
        }
    }
}
