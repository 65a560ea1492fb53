//! Image metadata consumed during configuration synthesis.
//!
//! Field names follow the `config` object of the OCI Image Specification
//! v1.1.0 (`User`, `Entrypoint`, `Cmd`, ...) so an image config can be
//! deserialized directly, with the image identity alongside it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The `{}` value used by image configs for set-like maps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

/// Read-only snapshot of an image's execution defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageMetadata {
    /// Image ID (content digest).
    #[serde(default)]
    pub id: String,
    /// Name the image was referenced by.
    #[serde(default)]
    pub name: String,
    /// Default user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Entrypoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<Vec<String>>,
    /// Default command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<Vec<String>>,
    /// Working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    /// Environment variables (`KEY=value`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    /// Labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Exposed ports (`80/tcp`, `53/udp`, `8080`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub exposed_ports: BTreeMap<String, Empty>,
    /// Volumes declared by the image.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, Empty>,
    /// Stop signal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_signal: Option<String>,
}

impl ImageMetadata {
    /// Create metadata for an image with no execution defaults.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the entrypoint.
    #[must_use]
    pub fn with_entrypoint<S: Into<String>>(mut self, args: impl IntoIterator<Item = S>) -> Self {
        self.entrypoint = Some(args.into_iter().map(Into::into).collect());
        self
    }

    /// Set the default command.
    #[must_use]
    pub fn with_cmd<S: Into<String>>(mut self, args: impl IntoIterator<Item = S>) -> Self {
        self.cmd = Some(args.into_iter().map(Into::into).collect());
        self
    }

    /// Add an exposed port.
    #[must_use]
    pub fn with_exposed_port(mut self, port: impl Into<String>) -> Self {
        self.exposed_ports.insert(port.into(), Empty {});
        self
    }

    /// Add a volume.
    #[must_use]
    pub fn with_volume(mut self, path: impl Into<String>) -> Self {
        self.volumes.insert(path.into(), Empty {});
        self
    }

    /// Exposed port keys in sorted order.
    pub fn exposed_port_keys(&self) -> impl Iterator<Item = &str> {
        self.exposed_ports.keys().map(String::as_str)
    }

    /// Volume paths in sorted order.
    pub fn volume_paths(&self) -> impl Iterator<Item = &str> {
        self.volumes.keys().map(String::as_str)
    }
}
