//! Namespace mode grammar.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use keel_common::{KeelError, KeelResult};

use super::NamespaceKind;

/// How a container obtains a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "target", rename_all = "kebab-case")]
pub enum NamespaceMode {
    /// A fresh namespace owned by the container.
    #[default]
    Private,
    /// The host's namespace.
    Host,
    /// Join another container's namespace.
    Container(String),
    /// Join the namespace at a filesystem path.
    Path(PathBuf),
    /// A fresh namespace with nothing configured in it.
    None,
}

impl NamespaceMode {
    /// Parse a mode string for a namespace kind.
    ///
    /// Common grammar: `""`/`private`, `host`, `none`, `container:<ref>`,
    /// `ns:<absolute path>`. IPC additionally accepts `shareable`; network
    /// accepts `bridge`, `default`, `slirp4netns` and network names, all of
    /// which produce a private namespace.
    pub fn parse(kind: NamespaceKind, value: &str) -> KeelResult<Self> {
        let invalid = || KeelError::InvalidMode {
            option: kind.option().to_string(),
            value: value.to_string(),
        };

        match value {
            "" | "private" => return Ok(Self::Private),
            "host" => return Ok(Self::Host),
            "none" => return Ok(Self::None),
            _ => {}
        }

        if let Some(reference) = value.strip_prefix("container:") {
            if reference.is_empty() {
                return Err(invalid());
            }
            return Ok(Self::Container(reference.to_string()));
        }

        if let Some(path) = value.strip_prefix("ns:") {
            let path = PathBuf::from(path);
            if !path.is_absolute() {
                return Err(invalid());
            }
            return Ok(Self::Path(path));
        }

        match kind {
            NamespaceKind::Ipc if value == "shareable" => Ok(Self::Private),
            NamespaceKind::Network if is_network_name(value) => Ok(Self::Private),
            _ => Err(invalid()),
        }
    }

    /// Whether the host namespace is shared.
    #[must_use]
    pub const fn is_host(&self) -> bool {
        matches!(self, Self::Host)
    }

    /// The peer reference for container mode.
    #[must_use]
    pub fn container(&self) -> Option<&str> {
        match self {
            Self::Container(reference) => Some(reference),
            _ => None,
        }
    }
}

impl fmt::Display for NamespaceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Private => write!(f, "private"),
            Self::Host => write!(f, "host"),
            Self::Container(reference) => write!(f, "container:{reference}"),
            Self::Path(path) => write!(f, "ns:{}", path.display()),
            Self::None => write!(f, "none"),
        }
    }
}

/// `bridge`, `default`, `slirp4netns` or a user-defined network name.
fn is_network_name(value: &str) -> bool {
    let mut chars = value.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}
