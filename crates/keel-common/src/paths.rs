//! Host paths consulted during configuration synthesis.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;

/// Seccomp profile that, when present, takes precedence over the default one.
pub static SECCOMP_OVERRIDE_PATH: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("KEEL_SECCOMP_OVERRIDE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/etc/crio/seccomp.json"))
});

/// Seccomp profile shipped with the engine.
pub static SECCOMP_DEFAULT_PATH: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("KEEL_SECCOMP_PROFILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/usr/share/containers/seccomp.json"))
});

/// Host paths used by resolvers for read-only probes.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct KeelPaths {
    /// Seccomp override profile (default: /etc/crio/seccomp.json).
    pub seccomp_override: PathBuf,
    /// Default seccomp profile (default: /usr/share/containers/seccomp.json).
    pub seccomp_default: PathBuf,
    /// Mount point of selinuxfs (default: /sys/fs/selinux).
    pub selinux_fs: PathBuf,
    /// Root of the cgroup filesystem (default: /sys/fs/cgroup).
    pub cgroup_root: PathBuf,
    /// Subordinate UID ranges (default: /etc/subuid).
    pub subuid: PathBuf,
    /// Subordinate GID ranges (default: /etc/subgid).
    pub subgid: PathBuf,
}

impl KeelPaths {
    /// Create paths with default locations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Point both seccomp probes somewhere else.
    #[must_use]
    pub fn with_seccomp(mut self, override_path: impl Into<PathBuf>, default_path: impl Into<PathBuf>) -> Self {
        self.seccomp_override = override_path.into();
        self.seccomp_default = default_path.into();
        self
    }

    /// Resolve every path below a different root, for chroots and tests.
    #[must_use]
    pub fn rebased(&self, root: &Path) -> Self {
        let rebase = |p: &Path| root.join(p.strip_prefix("/").unwrap_or(p));
        Self {
            seccomp_override: rebase(&self.seccomp_override),
            seccomp_default: rebase(&self.seccomp_default),
            selinux_fs: rebase(&self.selinux_fs),
            cgroup_root: rebase(&self.cgroup_root),
            subuid: rebase(&self.subuid),
            subgid: rebase(&self.subgid),
        }
    }
}

impl Default for KeelPaths {
    fn default() -> Self {
        Self {
            seccomp_override: SECCOMP_OVERRIDE_PATH.clone(),
            seccomp_default: SECCOMP_DEFAULT_PATH.clone(),
            selinux_fs: PathBuf::from("/sys/fs/selinux"),
            cgroup_root: PathBuf::from("/sys/fs/cgroup"),
            subuid: PathBuf::from("/etc/subuid"),
            subgid: PathBuf::from("/etc/subgid"),
        }
    }
}
