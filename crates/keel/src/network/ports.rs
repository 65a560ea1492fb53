//! Port binding table.
//!
//! Merges image-declared exposed ports, `--expose` and `--publish` into one
//! table keyed by (protocol, container port). Published bindings attach to
//! the same key an exposure created, so nothing is listed twice.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::IpAddr;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use keel_common::{KeelError, KeelResult};

/// Transport protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP protocol.
    Tcp,
    /// UDP protocol.
    Udp,
    /// SCTP protocol.
    Sctp,
}

impl Protocol {
    /// Get the protocol string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Sctp => "sctp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = KeelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "sctp" => Ok(Self::Sctp),
            _ => Err(KeelError::syntax("publish", format!("unknown protocol {s:?}"))),
        }
    }
}

/// Table key: a container port and its protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortKey {
    /// Protocol.
    pub protocol: Protocol,
    /// Container port.
    pub port: u16,
}

impl PortKey {
    /// Create a key.
    #[must_use]
    pub const fn new(port: u16, protocol: Protocol) -> Self {
        Self { protocol, port }
    }
}

impl fmt::Display for PortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.port, self.protocol)
    }
}

impl FromStr for PortKey {
    type Err = KeelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (port, protocol) = split_protocol(s)?;
        Ok(Self::new(parse_port("expose", port)?, protocol))
    }
}

impl Serialize for PortKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PortKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Where a container port is published on the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HostBinding {
    /// Host address; empty binds every address.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host_ip: String,
    /// Host port; `None` lets the engine pick one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<u16>,
}

/// A flattened published port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PortMapping {
    /// Container port.
    pub container_port: u16,
    /// Protocol.
    pub protocol: Protocol,
    /// Host address; empty binds every address.
    pub host_ip: String,
    /// Host port; 0 lets the engine pick one.
    pub host_port: u16,
}

/// Ordered map from (protocol, container port) to host bindings.
///
/// An entry with no bindings is exposed but not published.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortBindingTable(BTreeMap<PortKey, Vec<HostBinding>>);

impl PortBindingTable {
    /// Bindings for a key.
    #[must_use]
    pub fn get(&self, key: &PortKey) -> Option<&[HostBinding]> {
        self.0.get(key).map(Vec::as_slice)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&PortKey, &[HostBinding])> {
        self.0.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Every published binding, in key order.
    #[must_use]
    pub fn mappings(&self) -> Vec<PortMapping> {
        self.0
            .iter()
            .flat_map(|(key, bindings)| {
                bindings.iter().map(move |binding| PortMapping {
                    container_port: key.port,
                    protocol: key.protocol,
                    host_ip: binding.host_ip.clone(),
                    host_port: binding.host_port.unwrap_or(0),
                })
            })
            .collect()
    }

    fn expose(&mut self, key: PortKey) {
        self.0.entry(key).or_default();
    }

    fn bind(&mut self, key: PortKey, binding: HostBinding) {
        let bindings = self.0.entry(key).or_default();
        if !bindings.contains(&binding) {
            bindings.push(binding);
        }
    }
}

/// Sources of port information.
#[derive(Debug, Clone, Copy)]
pub struct PortRequest<'a, I> {
    /// Ports the image exposes (`80/tcp`, `8080`).
    pub image_ports: I,
    /// `--expose` entries.
    pub expose: &'a [String],
    /// `--publish` entries.
    pub publish: &'a [String],
    /// `--publish-all`.
    pub publish_all: bool,
}

/// Build the binding table.
///
/// Two `--publish` entries claiming the same host address, host port and
/// protocol are rejected.
pub fn reconcile<'a, I>(request: PortRequest<'a, I>) -> KeelResult<PortBindingTable>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut table = PortBindingTable::default();

    for port in request.image_ports {
        for key in parse_expose("image exposed port", port)? {
            table.expose(key);
        }
    }
    for spec in request.expose {
        for key in parse_expose("expose", spec)? {
            table.expose(key);
        }
    }

    let mut claimed: BTreeMap<(String, u16, Protocol), &str> = BTreeMap::new();
    for spec in request.publish {
        for (key, binding) in parse_publish(spec)? {
            if let Some(host_port) = binding.host_port {
                let claim = (binding.host_ip.clone(), host_port, key.protocol);
                if let Some(previous) = claimed.insert(claim, spec) {
                    return Err(KeelError::conflict(
                        format!("--publish {previous}"),
                        format!("--publish {spec}"),
                    ));
                }
            }
            table.bind(key, binding);
        }
    }

    if request.publish_all {
        let unbound: BTreeSet<PortKey> = table
            .iter()
            .filter(|(_, bindings)| bindings.is_empty())
            .map(|(key, _)| *key)
            .collect();
        for key in unbound {
            table.bind(key, HostBinding::default());
        }
    }

    tracing::debug!(entries = table.len(), "Reconciled port bindings");
    Ok(table)
}

/// Parse an exposed port or port range (`80`, `53/udp`, `8000-8010/tcp`).
pub fn parse_expose(option: &str, spec: &str) -> KeelResult<Vec<PortKey>> {
    if spec.contains(':') {
        return Err(KeelError::syntax(
            option,
            format!("{spec:?} cannot contain ':', use --publish to bind a host port"),
        ));
    }
    let (ports, protocol) = split_protocol(spec)?;
    Ok(parse_range(option, ports)?
        .map(|port| PortKey::new(port, protocol))
        .collect())
}

/// Parse `[ip:][hostPort:]containerPort[/protocol]`, with ranges.
pub fn parse_publish(spec: &str) -> KeelResult<Vec<(PortKey, HostBinding)>> {
    const OPTION: &str = "publish";
    let invalid = |message: String| KeelError::syntax(OPTION, message);

    let (addr, protocol) = split_protocol(spec)?;

    let (host_ip, rest) = if let Some(bracketed) = addr.strip_prefix('[') {
        let (ip, rest) = bracketed
            .split_once("]:")
            .ok_or_else(|| invalid(format!("{spec:?} has an unterminated IPv6 address")))?;
        (ip, rest)
    } else {
        match addr.matches(':').count() {
            0 | 1 => ("", addr),
            2 => addr.split_once(':').unwrap_or(("", addr)),
            _ => return Err(invalid(format!("{spec:?} has too many fields"))),
        }
    };

    if !host_ip.is_empty() && host_ip.parse::<IpAddr>().is_err() {
        return Err(invalid(format!("{host_ip:?} is not a valid IP address")));
    }

    let (host_ports, container_ports) = match rest.split_once(':') {
        Some((host, container)) => (host, container),
        None => ("", rest),
    };
    if host_ports.contains(':') || container_ports.contains(':') {
        return Err(invalid(format!("{spec:?} has too many fields")));
    }

    let container = parse_range(OPTION, container_ports)?;
    let host: Vec<Option<u16>> = if host_ports.is_empty() {
        vec![None; container.clone().count()]
    } else {
        let host = parse_range(OPTION, host_ports)?;
        if host.clone().count() != container.clone().count() {
            return Err(invalid(format!(
                "{spec:?} maps host and container port ranges of different sizes"
            )));
        }
        host.map(Some).collect()
    };

    Ok(container
        .zip(host)
        .map(|(port, host_port)| {
            (
                PortKey::new(port, protocol),
                HostBinding {
                    host_ip: host_ip.to_string(),
                    host_port,
                },
            )
        })
        .collect())
}

fn split_protocol(spec: &str) -> KeelResult<(&str, Protocol)> {
    match spec.rsplit_once('/') {
        Some((ports, protocol)) => Ok((ports, protocol.parse()?)),
        None => Ok((spec, Protocol::Tcp)),
    }
}

fn parse_port(option: &str, value: &str) -> KeelResult<u16> {
    match value.parse::<u16>() {
        Ok(0) | Err(_) => Err(KeelError::syntax(option, format!("invalid port {value:?}"))),
        Ok(port) => Ok(port),
    }
}

fn parse_range(option: &str, value: &str) -> KeelResult<RangeInclusive<u16>> {
    let (start, end) = match value.split_once('-') {
        Some((start, end)) => (parse_port(option, start)?, parse_port(option, end)?),
        None => {
            let port = parse_port(option, value)?;
            (port, port)
        }
    };
    if start > end {
        return Err(KeelError::syntax(option, format!("invalid port range {value:?}")));
    }
    Ok(start..=end)
}
