//! Already-parsed `create` flag values.
//!
//! [`CreateOptions`] is a flat map keyed by each flag's long name. The
//! command-line front end (or any other client) fills it in; this crate
//! only interprets the semantic strings inside.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use keel_common::KeelResult;

/// Flag values for one container-creation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
#[allow(clippy::struct_excessive_bools)]
pub struct CreateOptions {
    // Identity and process
    /// Container name.
    pub name: Option<String>,
    /// Positional command arguments after the image.
    pub command: Vec<String>,
    /// `--entrypoint`; `Some([""])` clears the image entrypoint.
    pub entrypoint: Option<Vec<String>>,
    /// `--workdir`.
    pub workdir: Option<String>,
    /// `--user`.
    pub user: Option<String>,
    /// `--group-add`.
    pub group_add: Vec<String>,
    /// `--stop-signal`.
    pub stop_signal: Option<String>,
    /// `--stop-timeout` in seconds.
    pub stop_timeout: u32,
    /// `--detach`.
    pub detach: bool,
    /// `--rm`.
    pub rm: bool,
    /// `--tty`.
    pub tty: bool,
    /// `--interactive`.
    pub interactive: bool,
    /// `--read-only`.
    pub read_only: bool,

    // Environment and metadata
    /// `--env` entries (`KEY=value` or bare `KEY`).
    pub env: Vec<String>,
    /// `--env-file` paths.
    pub env_file: Vec<PathBuf>,
    /// `--label` entries.
    pub label: Vec<String>,
    /// `--label-file` paths.
    pub label_file: Vec<PathBuf>,
    /// `--annotation` entries.
    pub annotation: Vec<String>,

    // Namespaces
    /// `--pid`.
    pub pid: String,
    /// `--ipc`.
    pub ipc: String,
    /// `--uts`.
    pub uts: String,
    /// `--userns`.
    pub userns: String,
    /// `--network`.
    pub network: Option<String>,
    /// `--net`, the legacy spelling of `--network`.
    pub net: Option<String>,

    // Security
    /// `--privileged`.
    pub privileged: bool,
    /// `--security-opt` entries.
    pub security_opt: Vec<String>,
    /// `--cap-add`.
    pub cap_add: Vec<String>,
    /// `--cap-drop`.
    pub cap_drop: Vec<String>,

    // Resources
    /// `--memory`.
    pub memory: String,
    /// `--memory-reservation`.
    pub memory_reservation: String,
    /// `--memory-swap`; `-1` means unlimited.
    pub memory_swap: String,
    /// `--kernel-memory`.
    pub kernel_memory: String,
    /// `--memory-swappiness`; `-1` means unset.
    pub memory_swappiness: i64,
    /// `--oom-kill-disable`.
    pub oom_kill_disable: bool,
    /// `--oom-score-adj`.
    pub oom_score_adj: i32,
    /// `--cpu-shares`.
    pub cpu_shares: u64,
    /// `--cpu-period`.
    pub cpu_period: u64,
    /// `--cpu-quota`.
    pub cpu_quota: i64,
    /// `--cpu-rt-period`.
    pub cpu_rt_period: u64,
    /// `--cpu-rt-runtime`.
    pub cpu_rt_runtime: i64,
    /// `--cpus`.
    pub cpus: f64,
    /// `--cpuset-cpus`.
    pub cpuset_cpus: String,
    /// `--cpuset-mems`.
    pub cpuset_mems: String,
    /// `--blkio-weight`.
    pub blkio_weight: String,
    /// `--blkio-weight-device` entries (`path:weight`).
    pub blkio_weight_device: Vec<String>,
    /// `--device-read-bps` entries (`path:rate`).
    pub device_read_bps: Vec<String>,
    /// `--device-write-bps` entries.
    pub device_write_bps: Vec<String>,
    /// `--device-read-iops` entries.
    pub device_read_iops: Vec<String>,
    /// `--device-write-iops` entries.
    pub device_write_iops: Vec<String>,
    /// `--pids-limit`.
    pub pids_limit: i64,
    /// `--shm-size`.
    pub shm_size: String,
    /// `--ulimit` entries (`name=soft[:hard]`).
    pub ulimit: Vec<String>,
    /// `--cgroup-parent`.
    pub cgroup_parent: Option<String>,

    // Network
    /// `--expose` entries.
    pub expose: Vec<String>,
    /// `--publish` entries.
    pub publish: Vec<String>,
    /// `--publish-all`.
    pub publish_all: bool,
    /// `--dns`.
    pub dns: Vec<String>,
    /// `--dns-search`.
    pub dns_search: Vec<String>,
    /// `--dns-opt`.
    pub dns_opt: Vec<String>,
    /// `--add-host` entries (`host:ip`).
    pub add_host: Vec<String>,
    /// `--hostname`.
    pub hostname: Option<String>,
    /// `--ip`.
    pub ip: Option<String>,
    /// `--mac-address`.
    pub mac_address: Option<String>,
    /// `--network-alias`.
    pub network_alias: Vec<String>,
    /// `--link-local-ip` entries.
    pub link_local_ip: Vec<String>,

    // Storage
    /// `--volume` entries (`src:dest[:opts]`).
    pub volume: Vec<String>,
    /// `--tmpfs` entries (`dest[:opts]`).
    pub tmpfs: Vec<String>,
    /// `--image-volume`: bind, tmpfs or ignore.
    pub image_volume: String,
    /// `--device` entries (`host[:container][:perms]`).
    pub device: Vec<String>,

    // User namespace and kernel parameters
    /// `--uidmap` entries.
    pub uidmap: Vec<String>,
    /// `--gidmap` entries.
    pub gidmap: Vec<String>,
    /// `--subuidname`.
    pub subuidname: String,
    /// `--subgidname`.
    pub subgidname: String,
    /// `--sysctl` entries.
    pub sysctl: Vec<String>,

    // Engine handoff
    /// `--conmon-pidfile`.
    pub conmon_pidfile: Option<PathBuf>,
    /// `--log-driver`.
    pub log_driver: Option<String>,
    /// `--log-opt` entries (`key=value`).
    pub log_opt: Vec<String>,
    /// `--pod` to join.
    pub pod: Option<String>,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            name: None,
            command: Vec::new(),
            entrypoint: None,
            workdir: None,
            user: None,
            group_add: Vec::new(),
            stop_signal: None,
            stop_timeout: 10,
            detach: false,
            rm: false,
            tty: false,
            interactive: false,
            read_only: false,
            env: Vec::new(),
            env_file: Vec::new(),
            label: Vec::new(),
            label_file: Vec::new(),
            annotation: Vec::new(),
            pid: String::new(),
            ipc: String::new(),
            uts: String::new(),
            userns: String::new(),
            network: None,
            net: None,
            privileged: false,
            security_opt: Vec::new(),
            cap_add: Vec::new(),
            cap_drop: Vec::new(),
            memory: String::new(),
            memory_reservation: String::new(),
            memory_swap: String::new(),
            kernel_memory: String::new(),
            memory_swappiness: -1,
            oom_kill_disable: false,
            oom_score_adj: 0,
            cpu_shares: 0,
            cpu_period: 0,
            cpu_quota: 0,
            cpu_rt_period: 0,
            cpu_rt_runtime: 0,
            cpus: 0.0,
            cpuset_cpus: String::new(),
            cpuset_mems: String::new(),
            blkio_weight: String::new(),
            blkio_weight_device: Vec::new(),
            device_read_bps: Vec::new(),
            device_write_bps: Vec::new(),
            device_read_iops: Vec::new(),
            device_write_iops: Vec::new(),
            pids_limit: 0,
            shm_size: "65536k".to_string(),
            ulimit: Vec::new(),
            cgroup_parent: None,
            expose: Vec::new(),
            publish: Vec::new(),
            publish_all: false,
            dns: Vec::new(),
            dns_search: Vec::new(),
            dns_opt: Vec::new(),
            add_host: Vec::new(),
            hostname: None,
            ip: None,
            mac_address: None,
            network_alias: Vec::new(),
            link_local_ip: Vec::new(),
            volume: Vec::new(),
            tmpfs: Vec::new(),
            image_volume: "bind".to_string(),
            device: Vec::new(),
            uidmap: Vec::new(),
            gidmap: Vec::new(),
            subuidname: String::new(),
            subgidname: String::new(),
            sysctl: Vec::new(),
            conmon_pidfile: None,
            log_driver: None,
            log_opt: Vec::new(),
            pod: None,
        }
    }
}

impl CreateOptions {
    /// Parse options from a JSON object.
    pub fn from_json(json: &str) -> KeelResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load options from a JSON or TOML file, chosen by extension.
    pub fn load(path: &Path) -> KeelResult<Self> {
        let content = std::fs::read_to_string(path)?;
        if path.extension().is_some_and(|ext| ext == "toml") {
            return toml::from_str(&content)
                .map_err(|e| keel_common::KeelError::Serialization(e.to_string()));
        }
        Self::from_json(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = CreateOptions::default();
        assert_eq!(opts.shm_size, "65536k");
        assert_eq!(opts.image_volume, "bind");
        assert_eq!(opts.memory_swappiness, -1);
        assert_eq!(opts.stop_timeout, 10);
        assert!(opts.entrypoint.is_none());
    }

    #[test]
    fn parse_flat_json() {
        let opts = CreateOptions::from_json(
            r#"{
                "name": "web",
                "publish": ["8080:80"],
                "security-opt": ["no-new-privileges"],
                "cpu-period": 100000,
                "entrypoint": [""]
            }"#,
        )
        .unwrap();

        assert_eq!(opts.name.as_deref(), Some("web"));
        assert_eq!(opts.publish, vec!["8080:80"]);
        assert_eq!(opts.cpu_period, 100_000);
        assert_eq!(opts.entrypoint, Some(vec![String::new()]));
        assert_eq!(opts.shm_size, "65536k");
    }

    #[test]
    fn logging_pod_and_link_local_flags() {
        let opts = CreateOptions::from_json(
            r#"{
                "log-driver": "journald",
                "log-opt": ["tag=web"],
                "pod": "frontend",
                "link-local-ip": ["169.254.1.1"]
            }"#,
        )
        .unwrap();

        assert_eq!(opts.log_driver.as_deref(), Some("journald"));
        assert_eq!(opts.log_opt, vec!["tag=web"]);
        assert_eq!(opts.pod.as_deref(), Some("frontend"));
        assert_eq!(opts.link_local_ip, vec!["169.254.1.1"]);
    }

    #[test]
    fn unknown_flags_rejected() {
        assert!(CreateOptions::from_json(r#"{"no-such-flag": true}"#).is_err());
    }

    #[test]
    fn load_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opts.toml");
        std::fs::write(&path, "name = \"db\"\nmemory = \"512m\"\nenv = [\"A=1\"]\n").unwrap();

        let opts = CreateOptions::load(&path).unwrap();
        assert_eq!(opts.name.as_deref(), Some("db"));
        assert_eq!(opts.memory, "512m");
        assert_eq!(opts.env, vec!["A=1"]);
    }
}
