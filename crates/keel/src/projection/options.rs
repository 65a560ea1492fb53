//! Container construction options handed to the engine alongside the spec.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use keel_common::{IdMappings, Signal};

use crate::namespace::NamespaceKind;
use crate::network::{HostEntry, PortMapping};

/// An engine-specific setting outside the portable runtime spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "option", content = "value", rename_all = "kebab-case")]
pub enum CreateOption {
    /// Root filesystem comes from this image.
    RootfsFromImage {
        /// Image ID.
        id: String,
        /// Image name.
        name: String,
        /// Bind image-declared volumes from container storage.
        use_image_volumes: bool,
    },
    /// SELinux process and mount labels.
    SelinuxLabels {
        /// Process label.
        process: String,
        /// Mount label.
        mount: String,
    },
    /// Monitor PID file.
    ConmonPidFile(PathBuf),
    /// Container labels.
    Labels(BTreeMap<String, String>),
    /// User to run as.
    User(String),
    /// Directory backing `/dev/shm`.
    ShmDir(PathBuf),
    /// `/dev/shm` size in bytes.
    ShmSize(i64),
    /// Supplementary groups.
    Groups(Vec<String>),
    /// User namespace ID mappings.
    IdMappings(IdMappings),
    /// Join a namespace of another container.
    NamespaceFrom {
        /// Namespace kind.
        kind: NamespaceKind,
        /// Peer container ID.
        container: String,
    },
    /// Attach to a network.
    Network {
        /// Network name.
        network: String,
        /// Published ports.
        ports: Vec<PortMapping>,
        /// Network-scoped aliases.
        aliases: Vec<String>,
        /// Static IP address.
        static_ip: Option<IpAddr>,
        /// Static MAC address.
        static_mac: Option<String>,
        /// Link-local addresses.
        link_local_ips: Vec<IpAddr>,
    },
    /// Resolver configuration.
    Dns {
        /// Nameservers.
        servers: Vec<IpAddr>,
        /// Search domains.
        search: Vec<String>,
        /// Resolver options.
        options: Vec<String>,
    },
    /// Extra `/etc/hosts` entries.
    Hosts(Vec<HostEntry>),
    /// Stop signal.
    StopSignal(Signal),
    /// Seconds to wait after the stop signal.
    StopTimeout(u32),
    /// Seccomp profile path, or `unconfined`.
    SeccompProfile(PathBuf),
    /// Parent cgroup.
    CgroupParent(String),
    /// Container name.
    Name(String),
    /// Log driver and its options.
    Log {
        /// Driver name; `None` keeps the engine default.
        driver: Option<String>,
        /// Driver options.
        options: BTreeMap<String, String>,
    },
    /// Pod the container joins.
    Pod(String),
    /// Remove the container when it exits.
    AutoRemove,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacently_tagged() {
        let json = serde_json::to_string(&CreateOption::ShmSize(65_536_000)).unwrap();
        assert_eq!(json, r#"{"option":"shm-size","value":65536000}"#);

        let json = serde_json::to_string(&CreateOption::NamespaceFrom {
            kind: NamespaceKind::Ipc,
            container: "c0ffee".into(),
        })
        .unwrap();
        assert!(json.starts_with(r#"{"option":"namespace-from","value":{"#));

        let json = serde_json::to_string(&CreateOption::AutoRemove).unwrap();
        assert_eq!(json, r#"{"option":"auto-remove"}"#);
    }
}
