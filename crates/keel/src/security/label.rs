//! SELinux label derivation.
//!
//! Labels are built from accumulated `label=` components. A `disable`
//! component, pushed when the PID or IPC namespace is shared with the host,
//! turns labeling off entirely. Components duplicated from a peer container
//! put both containers in the same isolation domain.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use keel_common::{KeelError, KeelResult};

/// Number of MCS categories labels are drawn from.
const MCS_CATEGORIES: u32 = 1024;

/// SELinux context (`user:role:type[:level]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SELinuxContext {
    /// User component.
    pub user: String,
    /// Role component.
    pub role: String,
    /// Type component.
    pub type_: String,
    /// Level component (optional).
    pub level: Option<String>,
}

impl SELinuxContext {
    /// Create a new SELinux context.
    #[must_use]
    pub fn new(user: &str, role: &str, type_: &str, level: Option<&str>) -> Self {
        Self {
            user: user.to_string(),
            role: role.to_string(),
            type_: type_.to_string(),
            level: level.map(String::from),
        }
    }

    /// Parse a context string.
    pub fn parse(context: &str) -> KeelResult<Self> {
        let mut parts = context.splitn(4, ':');
        let (Some(user), Some(role), Some(type_)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(KeelError::syntax(
                "label",
                format!("{context:?} is not a valid SELinux context"),
            ));
        };

        Ok(Self {
            user: user.to_string(),
            role: role.to_string(),
            type_: type_.to_string(),
            level: parts.next().map(String::from),
        })
    }
}

impl fmt::Display for SELinuxContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.user, self.role, self.type_)?;
        if let Some(level) = &self.level {
            write!(f, ":{level}")?;
        }
        Ok(())
    }
}

/// Host SELinux policy defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SelinuxPolicy {
    /// Whether SELinux is enabled on the host.
    pub enabled: bool,
    /// Default process context (without level).
    pub process_context: String,
    /// Default file context for container mounts (without level).
    pub mount_context: String,
}

impl Default for SelinuxPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            process_context: "system_u:system_r:container_t".to_string(),
            mount_context: "system_u:object_r:container_file_t".to_string(),
        }
    }
}

/// A `label=` component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelComponent {
    /// Turn labeling off.
    Disable,
    /// `user:<v>`.
    User(String),
    /// `role:<v>`.
    Role(String),
    /// `type:<v>`.
    Type(String),
    /// `level:<v>`.
    Level(String),
    /// `filetype:<v>`, the mount label type.
    FileType(String),
}

impl LabelComponent {
    /// Parse the value of a `label=` security option.
    pub fn parse(value: &str) -> KeelResult<Self> {
        if value == "disable" {
            return Ok(Self::Disable);
        }

        let invalid = || KeelError::InvalidSecurityOpt {
            value: format!("label={value}"),
        };
        let (key, component) = value.split_once(':').ok_or_else(invalid)?;
        if component.is_empty() {
            return Err(invalid());
        }

        match key {
            "user" => Ok(Self::User(component.to_string())),
            "role" => Ok(Self::Role(component.to_string())),
            "type" => Ok(Self::Type(component.to_string())),
            "level" => Ok(Self::Level(component.to_string())),
            "filetype" => Ok(Self::FileType(component.to_string())),
            _ => Err(invalid()),
        }
    }
}

/// Components that put a container in the same domain as `label`.
///
/// Returns nothing when the peer is unlabeled or the label is malformed.
#[must_use]
pub fn duplicate(label: &str) -> Vec<LabelComponent> {
    let Ok(context) = SELinuxContext::parse(label) else {
        return Vec::new();
    };

    let mut components = vec![
        LabelComponent::User(context.user),
        LabelComponent::Role(context.role),
        LabelComponent::Type(context.type_),
    ];
    if let Some(level) = context.level {
        components.push(LabelComponent::Level(level));
    }
    components
}

/// Process and mount labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels {
    /// Process label.
    pub process: Option<String>,
    /// Mount label.
    pub mount: Option<String>,
}

/// Compute final labels from accumulated components.
///
/// Without an explicit `level:` the MCS level is derived from `seed`, so the
/// same request always gets the same categories.
pub fn init_labels(
    policy: &SelinuxPolicy,
    components: &[LabelComponent],
    seed: &[u8],
) -> KeelResult<Labels> {
    if !policy.enabled || components.contains(&LabelComponent::Disable) {
        tracing::debug!(enabled = policy.enabled, "SELinux labeling disabled");
        return Ok(Labels::default());
    }

    let level = mcs_level(seed);
    let mut process = SELinuxContext::parse(&policy.process_context)?;
    let mut mount = SELinuxContext::parse(&policy.mount_context)?;
    process.level = Some(level.clone());
    mount.level = Some(level);

    for component in components {
        match component {
            LabelComponent::Disable => {}
            LabelComponent::User(user) => {
                process.user.clone_from(user);
                mount.user.clone_from(user);
            }
            LabelComponent::Role(role) => process.role.clone_from(role),
            LabelComponent::Type(type_) => process.type_.clone_from(type_),
            LabelComponent::Level(level) => {
                process.level = Some(level.clone());
                mount.level = Some(level.clone());
            }
            LabelComponent::FileType(type_) => mount.type_.clone_from(type_),
        }
    }

    Ok(Labels {
        process: Some(process.to_string()),
        mount: Some(mount.to_string()),
    })
}

/// `s0:cX,cY` with two distinct categories drawn from the seed digest.
fn mcs_level(seed: &[u8]) -> String {
    let digest = Sha256::digest(seed);
    let first = u32::from(u16::from_be_bytes([digest[0], digest[1]])) % MCS_CATEGORIES;
    let mut second = u32::from(u16::from_be_bytes([digest[2], digest[3]])) % MCS_CATEGORIES;
    if second == first {
        second = (second + 1) % MCS_CATEGORIES;
    }
    let (low, high) = if first < second { (first, second) } else { (second, first) };
    format!("s0:c{low},c{high}")
}
