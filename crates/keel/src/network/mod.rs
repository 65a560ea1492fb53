//! Network settings: port bindings, DNS and host-table entries.

pub mod dns;
pub mod ports;

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use keel_common::{KeelError, KeelResult};
use keel_oci::ImageMetadata;

use crate::namespace::NamespaceMode;
use crate::options::CreateOptions;

pub use dns::HostEntry;
pub use ports::{HostBinding, PortBindingTable, PortKey, PortMapping, Protocol};

/// Network used when neither `--network` nor `--net` is given.
pub const DEFAULT_NETWORK: &str = "bridge";

/// Pick the network mode string from `--network` and its `--net` alias.
pub fn select_network(opts: &CreateOptions) -> KeelResult<String> {
    match (&opts.network, &opts.net) {
        (Some(_), Some(_)) => Err(KeelError::conflict("--network", "--net")),
        (Some(network), None) | (None, Some(network)) => Ok(network.clone()),
        (None, None) => Ok(DEFAULT_NETWORK.to_string()),
    }
}

/// Resolved network settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkConfig {
    /// Network the container attaches to when its namespace is private.
    pub network: String,
    /// Port bindings.
    pub ports: PortBindingTable,
    /// Nameservers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_servers: Vec<IpAddr>,
    /// Search domains.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_search: Vec<String>,
    /// Resolver options.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_options: Vec<String>,
    /// Extra `/etc/hosts` entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_hosts: Vec<HostEntry>,
    /// Static IP address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_ip: Option<IpAddr>,
    /// Static MAC address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_mac: Option<String>,
    /// Network-scoped aliases.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    /// Link-local addresses.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub link_local_ips: Vec<IpAddr>,
    /// Container hostname.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

/// Resolve network settings for an already parsed network namespace mode.
///
/// `selected` is the raw `--network` value from [`select_network`].
pub fn resolve(
    opts: &CreateOptions,
    image: &ImageMetadata,
    mode: &NamespaceMode,
    selected: &str,
) -> KeelResult<NetworkConfig> {
    let ports = ports::reconcile(ports::PortRequest {
        image_ports: image.exposed_port_keys(),
        expose: &opts.expose,
        publish: &opts.publish,
        publish_all: opts.publish_all,
    })?;

    if !matches!(mode, NamespaceMode::Private) && !opts.publish.is_empty() {
        return Err(KeelError::conflict("--publish", format!("--network {selected}")));
    }

    let network = match (mode, selected) {
        (NamespaceMode::Private, "" | "private") => DEFAULT_NETWORK.to_string(),
        _ => selected.to_string(),
    };

    let hostname = match &opts.hostname {
        Some(name) if !dns::is_hostname(name) => {
            return Err(KeelError::syntax("hostname", format!("invalid hostname {name:?}")));
        }
        other => other.clone(),
    };

    let config = NetworkConfig {
        network,
        ports,
        dns_servers: dns::parse_dns_servers(&opts.dns)?,
        dns_search: dns::validate_dns_search(&opts.dns_search)?,
        dns_options: opts.dns_opt.clone(),
        extra_hosts: opts
            .add_host
            .iter()
            .map(|spec| dns::parse_add_host(spec))
            .collect::<KeelResult<_>>()?,
        static_ip: opts.ip.as_deref().map(dns::parse_static_ip).transpose()?,
        static_mac: opts.mac_address.as_deref().map(dns::validate_mac).transpose()?,
        aliases: opts.network_alias.clone(),
        link_local_ips: dns::parse_link_local_ips(&opts.link_local_ip)?,
        hostname,
    };

    tracing::debug!(
        network = %config.network,
        ports = config.ports.len(),
        "Resolved network settings"
    );

    Ok(config)
}
