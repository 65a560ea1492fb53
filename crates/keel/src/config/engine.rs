//! Engine-wide settings shared by every synthesis request.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use keel_common::{KeelError, KeelPaths, KeelResult, Signal};

use crate::resources::KernelFeatures;
use crate::security::SelinuxPolicy;

/// Engine configuration options.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EngineConfig {
    /// Stop signal when neither the user nor the image sets one.
    pub default_stop_signal: Signal,
    /// Host paths probed during synthesis.
    pub paths: KeelPaths,
    /// SELinux defaults.
    pub selinux: SelinuxPolicy,
    /// Kernel resource-control support.
    pub kernel: KernelFeatures,
}

impl EngineConfig {
    /// Probe the running host: SELinux is enabled when selinuxfs is mounted,
    /// and cgroup controllers decide the kernel features.
    #[must_use]
    pub fn detect() -> Self {
        Self::default().detect_host()
    }

    /// Re-probe host features using this configuration's paths.
    #[must_use]
    pub fn detect_host(mut self) -> Self {
        self.selinux.enabled = self.paths.selinux_fs.join("enforce").exists();
        self.kernel = KernelFeatures::detect(&self.paths.cgroup_root);
        tracing::debug!(
            selinux = self.selinux.enabled,
            cgroup_root = %self.paths.cgroup_root.display(),
            "Detected host features"
        );
        self
    }

    /// Default location of the engine configuration file.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/etc"))
            .join("keel/engine.toml")
    }

    /// Parse a TOML document; missing keys take their defaults.
    pub fn from_toml(content: &str) -> KeelResult<Self> {
        toml::from_str(content).map_err(|e| KeelError::Serialization(e.to_string()))
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> KeelResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Set host paths.
    #[must_use]
    pub fn with_paths(mut self, paths: KeelPaths) -> Self {
        self.paths = paths;
        self
    }

    /// Enable or disable SELinux labeling.
    #[must_use]
    pub const fn with_selinux(mut self, enabled: bool) -> Self {
        self.selinux.enabled = enabled;
        self
    }

    /// Set kernel features.
    #[must_use]
    pub const fn with_kernel(mut self, kernel: KernelFeatures) -> Self {
        self.kernel = kernel;
        self
    }

    /// Set the default stop signal.
    #[must_use]
    pub const fn with_stop_signal(mut self, signal: Signal) -> Self {
        self.default_stop_signal = signal;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = EngineConfig::default();
        assert!(!config.selinux.enabled);
        assert_eq!(config.default_stop_signal, Signal::SIGTERM);
        assert_eq!(config.kernel, KernelFeatures::all());
    }

    #[test]
    fn builder_pattern() {
        let config = EngineConfig::default()
            .with_selinux(true)
            .with_kernel(KernelFeatures::none())
            .with_stop_signal(Signal::SIGKILL)
            .with_paths(KeelPaths::new().rebased(Path::new("/tmp/keel")));

        assert!(config.selinux.enabled);
        assert_eq!(config.default_stop_signal, Signal::SIGKILL);
        assert!(!config.kernel.memory_limit);
        assert_eq!(config.paths.subuid, PathBuf::from("/tmp/keel/etc/subuid"));
    }

    #[test]
    fn from_toml() {
        let config = EngineConfig::from_toml(
            r#"
            default-stop-signal = 9

            [selinux]
            enabled = true

            [paths]
            seccomp-default = "/opt/keel/seccomp.json"

            [kernel]
            swap-limit = false
            "#,
        )
        .unwrap();

        assert!(config.selinux.enabled);
        assert_eq!(config.selinux.process_context, "system_u:system_r:container_t");
        assert_eq!(config.paths.seccomp_default, PathBuf::from("/opt/keel/seccomp.json"));
        assert_eq!(config.paths.subgid, PathBuf::from("/etc/subgid"));
        assert!(!config.kernel.swap_limit);
        assert!(config.kernel.memory_limit);
        assert_eq!(config.default_stop_signal, Signal::SIGKILL);

        assert!(EngineConfig::from_toml("paths = 3").is_err());
    }

    #[test]
    fn detect_on_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::default()
            .with_paths(KeelPaths::new().rebased(dir.path()))
            .detect_host();
        assert!(!config.selinux.enabled);
    }

    #[test]
    fn default_path_is_named() {
        assert!(EngineConfig::default_path().ends_with("keel/engine.toml"));
    }
}
