//! The assembled container configuration.
//!
//! [`CreateConfig`] is the single validated record produced for a create
//! request. It is built once by the [`Synthesizer`] and never mutated
//! afterwards; its JSON form is the audit artifact.

mod assemble;
pub mod engine;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use keel_common::{IdMappings, KeelResult, Signal};

use crate::command::ResolvedCommand;
use crate::devices::DeviceMapping;
use crate::namespace::NamespaceConfig;
use crate::network::NetworkConfig;
use crate::resources::ResourceConfig;
use crate::security::SecurityConfig;
use crate::storage::StorageConfig;

pub use assemble::{Synthesis, Synthesizer};
pub use engine::EngineConfig;

/// Validated configuration for one container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CreateConfig {
    /// Container name, when one was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Image ID.
    pub image_id: String,
    /// Image name as referenced.
    pub image_name: String,
    /// Entrypoint and full argv.
    pub command: ResolvedCommand,
    /// Working directory.
    pub workdir: String,
    /// User to run as; `None` keeps the runtime default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Supplementary groups.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_add: Vec<String>,
    /// Signal sent on stop.
    pub stop_signal: Signal,
    /// Seconds to wait before killing.
    pub stop_timeout: u32,
    /// Run detached.
    pub detach: bool,
    /// Remove when stopped.
    pub rm: bool,
    /// Allocate a terminal.
    pub tty: bool,
    /// Keep stdin open.
    pub interactive: bool,
    /// Read-only rootfs.
    pub read_only: bool,
    /// Environment.
    pub env: BTreeMap<String, String>,
    /// Labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Runtime annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Namespace modes.
    pub namespaces: NamespaceConfig,
    /// Security settings.
    pub security: SecurityConfig,
    /// Resource limits.
    pub resources: ResourceConfig,
    /// Network settings.
    pub network: NetworkConfig,
    /// Volumes and tmpfs mounts.
    pub storage: StorageConfig,
    /// Host devices.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<DeviceMapping>,
    /// User namespace ID mappings.
    pub id_mappings: IdMappings,
    /// Namespaced kernel parameters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sysctls: BTreeMap<String, String>,
    /// Parent cgroup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cgroup_parent: Option<String>,
    /// Where the monitor writes its PID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conmon_pidfile: Option<PathBuf>,
    /// Log driver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_driver: Option<String>,
    /// Log driver options.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub log_options: BTreeMap<String, String>,
    /// Pod to join.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod: Option<String>,
}

impl CreateConfig {
    /// Serialize as the audit artifact.
    ///
    /// Maps are ordered, so identical configurations produce identical bytes.
    pub fn to_artifact(&self) -> KeelResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Read an audit artifact back.
    pub fn from_artifact(bytes: &[u8]) -> KeelResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
