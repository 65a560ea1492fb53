//! Security policy resolution.
//!
//! Produces a [`SecurityConfig`] from `--security-opt` entries, capability
//! changes and the already resolved PID/IPC namespaces:
//! - SELinux process and mount labels
//! - Seccomp profile path
//! - AppArmor profile
//! - Capability add/drop
//! - no_new_privs

mod capabilities;
mod label;
mod seccomp;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use keel_common::{KeelError, KeelPaths, KeelResult};

use crate::namespace::{NamespaceMode, ResolvedNamespace};

pub use capabilities::{ALL as ALL_CAPABILITIES, DEFAULT_CAPABILITIES, effective as effective_capabilities};
pub use label::{LabelComponent, Labels, SELinuxContext, SelinuxPolicy};
pub use seccomp::UNCONFINED as SECCOMP_UNCONFINED;

/// Security configuration for a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SecurityConfig {
    /// SELinux process label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_label: Option<String>,
    /// SELinux mount label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_label: Option<String>,
    /// Seccomp profile path (or `unconfined`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seccomp_profile: Option<PathBuf>,
    /// AppArmor profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apparmor_profile: Option<String>,
    /// Capabilities to add, normalized.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cap_add: Vec<String>,
    /// Capabilities to drop, normalized.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cap_drop: Vec<String>,
    /// no_new_privs flag.
    #[serde(default)]
    pub no_new_privileges: bool,
    /// Privileged mode.
    #[serde(default)]
    pub privileged: bool,
}

impl SecurityConfig {
    /// Privileged configuration: no confinement of any kind.
    #[must_use]
    pub fn privileged() -> Self {
        Self {
            privileged: true,
            ..Self::default()
        }
    }

    /// Effective capability list for the container process.
    #[must_use]
    pub fn capabilities(&self) -> Vec<String> {
        effective_capabilities(&self.cap_add, &self.cap_drop, self.privileged)
    }
}

/// Inputs to [`resolve`].
#[derive(Debug, Clone, Copy)]
pub struct SecurityRequest<'a> {
    /// Resolved PID namespace.
    pub pid: &'a ResolvedNamespace,
    /// Resolved IPC namespace.
    pub ipc: &'a ResolvedNamespace,
    /// Raw `--security-opt` entries.
    pub security_opts: &'a [String],
    /// `--cap-add`.
    pub cap_add: &'a [String],
    /// `--cap-drop`.
    pub cap_drop: &'a [String],
    /// `--privileged`.
    pub privileged: bool,
    /// Host paths for profile probes.
    pub paths: &'a KeelPaths,
    /// Host SELinux policy.
    pub selinux: &'a SelinuxPolicy,
    /// Seed for the derived MCS level.
    pub seed: &'a [u8],
}

/// Resolve the security configuration.
///
/// Namespace-derived label components are accumulated first, then the
/// options are parsed, then the seccomp default is probed. Labels are
/// computed last, so a probe failure is reported before a label failure.
pub fn resolve(request: &SecurityRequest<'_>) -> KeelResult<SecurityConfig> {
    if request.privileged {
        tracing::debug!("Privileged container, skipping security resolution");
        return Ok(SecurityConfig::privileged());
    }

    let mut components = Vec::new();
    for ns in [request.pid, request.ipc] {
        match &ns.mode {
            NamespaceMode::Host => components.push(LabelComponent::Disable),
            NamespaceMode::Container(_) => {
                if let Some(peer_label) = ns.peer_label() {
                    components.extend(label::duplicate(peer_label));
                }
            }
            NamespaceMode::Private | NamespaceMode::Path(_) | NamespaceMode::None => {}
        }
    }

    let mut config = SecurityConfig::default();

    for opt in request.security_opts {
        let invalid = || KeelError::InvalidSecurityOpt { value: opt.clone() };

        if opt == "no-new-privileges" {
            config.no_new_privileges = true;
            continue;
        }

        let (key, value) = opt.split_once('=').ok_or_else(invalid)?;
        match key {
            "label" => components.push(LabelComponent::parse(value)?),
            "apparmor" => config.apparmor_profile = Some(value.to_string()),
            "seccomp" => config.seccomp_profile = Some(PathBuf::from(value)),
            _ => return Err(invalid()),
        }
    }

    config.cap_add = capabilities::normalize_all("cap-add", request.cap_add)?;
    config.cap_drop = capabilities::normalize_all("cap-drop", request.cap_drop)?;

    if config.seccomp_profile.is_none() {
        config.seccomp_profile = seccomp::default_profile(request.paths)?;
    }

    // Labels last: the host-mode disable markers collected above decide them.
    let labels = label::init_labels(request.selinux, &components, request.seed)?;
    config.process_label = labels.process;
    config.mount_label = labels.mount;

    tracing::debug!(
        process_label = config.process_label.as_deref().unwrap_or(""),
        seccomp = ?config.seccomp_profile,
        no_new_privileges = config.no_new_privileges,
        "Resolved security configuration"
    );

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::PeerContainer;
    use keel_common::ErrorKind;

    struct Fixture {
        _dir: tempfile::TempDir,
        paths: KeelPaths,
        selinux: SelinuxPolicy,
    }

    fn fixture(with_profile: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let paths = KeelPaths::new().with_seccomp(
            dir.path().join("override.json"),
            dir.path().join("default.json"),
        );
        if with_profile {
            std::fs::write(&paths.seccomp_default, "{}").unwrap();
        }
        Fixture {
            _dir: dir,
            paths,
            selinux: SelinuxPolicy {
                enabled: true,
                ..SelinuxPolicy::default()
            },
        }
    }

    fn private() -> ResolvedNamespace {
        ResolvedNamespace {
            mode: NamespaceMode::Private,
            peer: None,
        }
    }

    fn host() -> ResolvedNamespace {
        ResolvedNamespace {
            mode: NamespaceMode::Host,
            peer: None,
        }
    }

    fn opts(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    fn request<'a>(
        fx: &'a Fixture,
        pid: &'a ResolvedNamespace,
        ipc: &'a ResolvedNamespace,
        security_opts: &'a [String],
    ) -> SecurityRequest<'a> {
        SecurityRequest {
            pid,
            ipc,
            security_opts,
            cap_add: &[],
            cap_drop: &[],
            privileged: false,
            paths: &fx.paths,
            selinux: &fx.selinux,
            seed: b"test",
        }
    }

    #[test]
    fn no_new_privileges_in_any_position() {
        let fx = fixture(false);
        let (pid, ipc) = (private(), private());
        for list in [
            opts(&["no-new-privileges", "apparmor=foo"]),
            opts(&["apparmor=foo", "no-new-privileges"]),
            opts(&["label=type:spc_t", "no-new-privileges", "seccomp=/x.json"]),
        ] {
            let config = resolve(&request(&fx, &pid, &ipc, &list)).unwrap();
            assert!(config.no_new_privileges);
        }
    }

    #[test]
    fn privileged_ignores_options() {
        let fx = fixture(true);
        let (pid, ipc) = (private(), private());
        let list = opts(&["bogus-option", "label=type:spc_t", "seccomp=/x.json"]);
        let mut req = request(&fx, &pid, &ipc, &list);
        req.privileged = true;

        let config = resolve(&req).unwrap();
        assert_eq!(config, SecurityConfig::privileged());
        assert!(config.process_label.is_none());
        assert!(config.seccomp_profile.is_none());
        assert!(config.apparmor_profile.is_none());
    }

    #[test]
    fn invalid_options_name_the_token() {
        let fx = fixture(false);
        let (pid, ipc) = (private(), private());
        for bad in ["unknown=1", "no-new-privs", "label=colour:red"] {
            let list = opts(&[bad]);
            let err = resolve(&request(&fx, &pid, &ipc, &list)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidSyntax);
            assert!(err.to_string().contains(bad.split('=').next().unwrap_or(bad)));
        }
    }

    #[test]
    fn explicit_and_default_seccomp() {
        let fx = fixture(true);
        let (pid, ipc) = (private(), private());

        let list = opts(&["seccomp=unconfined"]);
        let config = resolve(&request(&fx, &pid, &ipc, &list)).unwrap();
        assert_eq!(config.seccomp_profile, Some(PathBuf::from(SECCOMP_UNCONFINED)));

        let config = resolve(&request(&fx, &pid, &ipc, &[])).unwrap();
        assert_eq!(config.seccomp_profile, Some(fx.paths.seccomp_default.clone()));
    }

    #[test]
    fn host_pid_disables_labels_but_keeps_seccomp() {
        let fx = fixture(true);
        let (pid, ipc) = (host(), private());

        let config = resolve(&request(&fx, &pid, &ipc, &[])).unwrap();
        assert!(config.process_label.is_none());
        assert!(config.mount_label.is_none());
        assert_eq!(config.seccomp_profile, Some(fx.paths.seccomp_default.clone()));
    }

    #[test]
    fn shared_ipc_duplicates_peer_label() {
        let fx = fixture(false);
        let pid = private();
        let ipc = ResolvedNamespace {
            mode: NamespaceMode::Container("db".to_string()),
            peer: Some(PeerContainer {
                id: "c0ffee".to_string(),
                name: "db".to_string(),
                process_label: "system_u:system_r:container_t:s0:c3,c7".to_string(),
                mount_label: String::new(),
                shm_dir: PathBuf::from("/run/keel/c0ffee/shm"),
            }),
        };

        let config = resolve(&request(&fx, &pid, &ipc, &[])).unwrap();
        assert_eq!(
            config.process_label.as_deref(),
            Some("system_u:system_r:container_t:s0:c3,c7")
        );
    }

    #[test]
    fn capabilities_are_normalized() {
        let fx = fixture(false);
        let (pid, ipc) = (private(), private());
        let add = opts(&["net_admin", "CAP_NET_ADMIN"]);
        let drop = opts(&["mknod"]);
        let mut req = request(&fx, &pid, &ipc, &[]);
        req.cap_add = &add;
        req.cap_drop = &drop;

        let config = resolve(&req).unwrap();
        assert_eq!(config.cap_add, vec!["CAP_NET_ADMIN"]);
        assert_eq!(config.cap_drop, vec!["CAP_MKNOD"]);
        assert!(config.capabilities().contains(&"CAP_NET_ADMIN".to_string()));

        let bad = opts(&["CAP_FLY"]);
        req.cap_add = &bad;
        assert!(resolve(&req).is_err());
    }

    #[test]
    fn seccomp_probe_error_reported_before_label_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("regular-file");
        std::fs::write(&file, "").unwrap();
        let paths = KeelPaths::new().with_seccomp(file.join("override.json"), file.join("default.json"));
        let selinux = SelinuxPolicy {
            enabled: true,
            process_context: "broken".to_string(),
            ..SelinuxPolicy::default()
        };
        let (pid, ipc) = (private(), private());
        let req = SecurityRequest {
            pid: &pid,
            ipc: &ipc,
            security_opts: &[],
            cap_add: &[],
            cap_drop: &[],
            privileged: false,
            paths: &paths,
            selinux: &selinux,
            seed: b"test",
        };

        assert_eq!(resolve(&req).unwrap_err().kind(), ErrorKind::Io);

        // With a readable profile location the label failure surfaces.
        let paths = KeelPaths::new().with_seccomp(dir.path().join("a.json"), dir.path().join("b.json"));
        let req = SecurityRequest { paths: &paths, ..req };
        assert_eq!(resolve(&req).unwrap_err().kind(), ErrorKind::InvalidSyntax);
    }
}
