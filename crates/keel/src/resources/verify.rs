//! Resource verification against host kernel support.
//!
//! Limits the kernel cannot enforce are discarded with a warning. Values
//! outside what the kernel accepts are errors.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use keel_common::units::format_bytes;
use keel_common::{KeelError, KeelResult};

use super::{MIN_MEMORY, ResourceConfig};

/// Resource controls the host kernel supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
#[allow(clippy::struct_excessive_bools)]
pub struct KernelFeatures {
    /// Memory limits.
    pub memory_limit: bool,
    /// Memory plus swap limits.
    pub swap_limit: bool,
    /// Memory reservations.
    pub memory_reservation: bool,
    /// Kernel memory limits.
    pub kernel_memory: bool,
    /// Memory swappiness.
    pub swappiness: bool,
    /// Disabling the OOM killer.
    pub oom_kill_disable: bool,
    /// CPU shares.
    pub cpu_shares: bool,
    /// CFS period.
    pub cpu_cfs_period: bool,
    /// CFS quota.
    pub cpu_cfs_quota: bool,
    /// Realtime period and runtime.
    pub cpu_realtime: bool,
    /// cpuset controller.
    pub cpuset: bool,
    /// Block I/O weight.
    pub blkio_weight: bool,
    /// Per-device block I/O weight.
    pub blkio_weight_device: bool,
    /// Per-device throttles.
    pub blkio_throttle: bool,
    /// PIDs limit.
    pub pids_limit: bool,
}

impl Default for KernelFeatures {
    fn default() -> Self {
        Self::all()
    }
}

impl KernelFeatures {
    /// Every feature supported.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            memory_limit: true,
            swap_limit: true,
            memory_reservation: true,
            kernel_memory: true,
            swappiness: true,
            oom_kill_disable: true,
            cpu_shares: true,
            cpu_cfs_period: true,
            cpu_cfs_quota: true,
            cpu_realtime: true,
            cpuset: true,
            blkio_weight: true,
            blkio_weight_device: true,
            blkio_throttle: true,
            pids_limit: true,
        }
    }

    /// Nothing supported.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            memory_limit: false,
            swap_limit: false,
            memory_reservation: false,
            kernel_memory: false,
            swappiness: false,
            oom_kill_disable: false,
            cpu_shares: false,
            cpu_cfs_period: false,
            cpu_cfs_quota: false,
            cpu_realtime: false,
            cpuset: false,
            blkio_weight: false,
            blkio_weight_device: false,
            blkio_throttle: false,
            pids_limit: false,
        }
    }

    /// Probe the cgroup filesystem mounted at `cgroup_root`.
    ///
    /// A unified (v2) hierarchy is read from `cgroup.controllers`; otherwise
    /// the v1 controller files are checked one by one.
    #[must_use]
    pub fn detect(cgroup_root: &Path) -> Self {
        let controllers_file = cgroup_root.join("cgroup.controllers");
        if let Ok(controllers) = fs::read_to_string(&controllers_file) {
            let features = Self::from_v2_controllers(&controllers);
            tracing::debug!(root = %cgroup_root.display(), ?features, "Detected cgroup v2 features");
            return features;
        }

        let has = |file: &str| cgroup_root.join(file).exists();
        let features = Self {
            memory_limit: has("memory/memory.limit_in_bytes"),
            swap_limit: has("memory/memory.memsw.limit_in_bytes"),
            memory_reservation: has("memory/memory.soft_limit_in_bytes"),
            kernel_memory: has("memory/memory.kmem.limit_in_bytes"),
            swappiness: has("memory/memory.swappiness"),
            oom_kill_disable: has("memory/memory.oom_control"),
            cpu_shares: has("cpu/cpu.shares"),
            cpu_cfs_period: has("cpu/cpu.cfs_period_us"),
            cpu_cfs_quota: has("cpu/cpu.cfs_quota_us"),
            cpu_realtime: has("cpu/cpu.rt_period_us"),
            cpuset: has("cpuset/cpuset.cpus"),
            blkio_weight: has("blkio/blkio.weight"),
            blkio_weight_device: has("blkio/blkio.weight_device"),
            blkio_throttle: has("blkio/blkio.throttle.read_bps_device"),
            pids_limit: has("pids/pids.max"),
        };
        tracing::debug!(root = %cgroup_root.display(), ?features, "Detected cgroup v1 features");
        features
    }

    /// Features implied by a v2 `cgroup.controllers` listing.
    #[must_use]
    pub fn from_v2_controllers(controllers: &str) -> Self {
        let enabled = |name: &str| controllers.split_whitespace().any(|c| c == name);
        let memory = enabled("memory");
        let cpu = enabled("cpu");
        let io = enabled("io");

        Self {
            memory_limit: memory,
            swap_limit: memory,
            memory_reservation: memory,
            kernel_memory: false,
            swappiness: false,
            oom_kill_disable: false,
            cpu_shares: cpu,
            cpu_cfs_period: cpu,
            cpu_cfs_quota: cpu,
            cpu_realtime: false,
            cpuset: enabled("cpuset"),
            blkio_weight: io,
            blkio_weight_device: io,
            blkio_throttle: io,
            pids_limit: enabled("pids"),
        }
    }
}

/// Discard unsupported limits and validate the rest.
///
/// Returns the warnings for discarded limits; the first invalid value is
/// an error.
pub fn verify(resources: &mut ResourceConfig, features: &KernelFeatures) -> KeelResult<Vec<String>> {
    let mut warnings = Vec::new();
    let mut warn = |message: &str| {
        tracing::warn!("{message}");
        warnings.push(message.to_string());
    };

    // Memory
    if resources.memory > 0 && !features.memory_limit {
        warn("Your kernel does not support memory limit capabilities or the cgroup is not mounted. Limitation discarded.");
        resources.memory = 0;
        resources.memory_swap = -1;
    }
    if resources.memory > 0 && resources.memory < MIN_MEMORY {
        return Err(KeelError::policy(format!(
            "minimum memory limit allowed is {}",
            format_bytes(MIN_MEMORY)
        )));
    }
    if resources.memory > 0 && resources.memory_swap != 0 && !features.swap_limit {
        warn("Your kernel does not support swap limit capabilities or the cgroup is not mounted. Memory limited without swap.");
        resources.memory_swap = -1;
    }
    if resources.memory > 0 && resources.memory_swap > 0 && resources.memory_swap < resources.memory {
        return Err(KeelError::policy(
            "minimum memoryswap limit should be larger than memory limit, see usage",
        ));
    }
    if resources.memory == 0 && resources.memory_swap > 0 {
        return Err(KeelError::policy(
            "you should always set a memory limit when using a memoryswap limit, see usage",
        ));
    }
    if resources.memory_swappiness != -1 && !features.swappiness {
        warn("Your kernel does not support memory swappiness capabilities, or the cgroup is not mounted. Memory swappiness discarded.");
        resources.memory_swappiness = -1;
    }
    if resources.memory_swappiness != -1 && !(0..=100).contains(&resources.memory_swappiness) {
        return Err(KeelError::policy(format!(
            "invalid value: {}, valid memory swappiness range is 0-100",
            resources.memory_swappiness
        )));
    }
    if resources.memory_reservation > 0 && !features.memory_reservation {
        warn("Your kernel does not support memory soft limit capabilities or the cgroup is not mounted. Limitation discarded.");
        resources.memory_reservation = 0;
    }
    if resources.memory_reservation > 0 && resources.memory_reservation < MIN_MEMORY {
        return Err(KeelError::policy(format!(
            "minimum memory reservation allowed is {}",
            format_bytes(MIN_MEMORY)
        )));
    }
    if resources.memory > 0
        && resources.memory_reservation > 0
        && resources.memory < resources.memory_reservation
    {
        return Err(KeelError::policy(
            "minimum memory limit cannot be less than memory reservation limit, see usage",
        ));
    }
    if resources.kernel_memory > 0 && !features.kernel_memory {
        warn("Your kernel does not support kernel memory limit capabilities or the cgroup is not mounted. Limitation discarded.");
        resources.kernel_memory = 0;
    }
    if resources.kernel_memory > 0 && resources.kernel_memory < MIN_MEMORY {
        return Err(KeelError::policy(format!(
            "minimum kernel memory limit allowed is {}",
            format_bytes(MIN_MEMORY)
        )));
    }
    if resources.oom_kill_disable && !features.oom_kill_disable {
        warn("Your kernel does not support OomKillDisable. OomKillDisable discarded.");
        resources.oom_kill_disable = false;
    }
    if !(-1000..=1000).contains(&resources.oom_score_adj) {
        return Err(KeelError::policy(format!(
            "oom-score-adj {} is outside the range -1000 to 1000",
            resources.oom_score_adj
        )));
    }

    // PIDs
    if resources.pids_limit > 0 && !features.pids_limit {
        warn("Your kernel does not support pids limit capabilities or the cgroup is not mounted. PIDs limit discarded.");
        resources.pids_limit = 0;
    }

    // CPU
    if resources.cpu_shares > 0 && !features.cpu_shares {
        warn("Your kernel does not support CPU shares or the cgroup is not mounted. Shares discarded.");
        resources.cpu_shares = 0;
    }
    if resources.cpu_period > 0 && !features.cpu_cfs_period {
        warn("Your kernel does not support CPU cfs period or the cgroup is not mounted. Period discarded.");
        resources.cpu_period = 0;
    }
    if resources.cpu_period != 0 && !(1000..=1_000_000).contains(&resources.cpu_period) {
        return Err(KeelError::policy(
            "CPU cfs period cannot be less than 1ms (i.e. 1000) or larger than 1s (i.e. 1000000)",
        ));
    }
    if resources.cpu_quota > 0 && !features.cpu_cfs_quota {
        warn("Your kernel does not support CPU cfs quota or the cgroup is not mounted. Quota discarded.");
        resources.cpu_quota = 0;
    }
    if resources.cpu_quota > 0 && resources.cpu_quota < 1000 {
        return Err(KeelError::policy("CPU cfs quota cannot be less than 1ms (i.e. 1000)"));
    }
    if resources.cpus > 0.0 && !(features.cpu_cfs_period && features.cpu_cfs_quota) {
        warn("Your kernel does not support CPU cfs period/quota or the cgroup is not mounted. CPUs discarded.");
        resources.cpus = 0.0;
    }
    if (resources.cpu_rt_period > 0 || resources.cpu_rt_runtime > 0) && !features.cpu_realtime {
        warn("Your kernel does not support CPU real-time scheduler. Realtime period and runtime discarded.");
        resources.cpu_rt_period = 0;
        resources.cpu_rt_runtime = 0;
    }
    if (!resources.cpuset_cpus.is_empty() || !resources.cpuset_mems.is_empty()) && !features.cpuset {
        warn("Your kernel does not support cpuset or the cgroup is not mounted. Cpuset discarded.");
        resources.cpuset_cpus.clear();
        resources.cpuset_mems.clear();
    }

    // Block I/O
    if resources.blkio_weight > 0 && !features.blkio_weight {
        warn("Your kernel does not support Block I/O weight or the cgroup is not mounted. Weight discarded.");
        resources.blkio_weight = 0;
    }
    if resources.blkio_weight > 0 && !(10..=1000).contains(&resources.blkio_weight) {
        return Err(KeelError::policy("range of blkio weight is from 10 to 1000"));
    }
    if !resources.blkio_weight_device.is_empty() && !features.blkio_weight_device {
        warn("Your kernel does not support Block I/O weight_device or the cgroup is not mounted. Weight-device discarded.");
        resources.blkio_weight_device.clear();
    }
    if !resources.throttles.is_empty() && !features.blkio_throttle {
        warn("Your kernel does not support Block I/O throttling or the cgroup is not mounted. Throttles discarded.");
        resources.throttles = super::DeviceThrottles::default();
    }

    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_common::ErrorKind;

    const MB: i64 = 1024 * 1024;

    fn with(f: impl FnOnce(&mut ResourceConfig)) -> ResourceConfig {
        let mut config = ResourceConfig::default();
        f(&mut config);
        config
    }

    #[test]
    fn supported_limits_pass_without_warnings() {
        let mut config = with(|c| {
            c.memory = 512 * MB;
            c.memory_swap = 1024 * MB;
            c.cpu_shares = 512;
            c.pids_limit = 100;
        });
        let warnings = verify(&mut config, &KernelFeatures::all()).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(config.memory, 512 * MB);
    }

    #[test]
    fn unsupported_limits_are_discarded() {
        let mut config = with(|c| {
            c.memory = 512 * MB;
            c.cpu_shares = 512;
            c.pids_limit = 100;
            c.cpuset_cpus = "0-1".to_string();
        });
        let warnings = verify(&mut config, &KernelFeatures::none()).unwrap();

        assert_eq!(warnings.len(), 4);
        assert_eq!(config.memory, 0);
        assert_eq!(config.memory_swap, -1);
        assert_eq!(config.cpu_shares, 0);
        assert_eq!(config.pids_limit, 0);
        assert!(config.cpuset_cpus.is_empty());
    }

    #[test]
    fn memory_minimums() {
        for f in [
            (|c: &mut ResourceConfig| c.memory = MB) as fn(&mut ResourceConfig),
            |c| c.memory_reservation = MB,
            |c| c.kernel_memory = MB,
        ] {
            let mut config = with(f);
            let err = verify(&mut config, &KernelFeatures::all()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::PolicyViolation);
            assert!(err.to_string().contains("4MiB"), "{err}");
        }
    }

    #[test]
    fn swap_rules() {
        let mut config = with(|c| c.memory_swap = 512 * MB);
        let err = verify(&mut config, &KernelFeatures::all()).unwrap_err();
        assert!(err.to_string().contains("always set a memory limit"));

        let mut config = with(|c| {
            c.memory = 512 * MB;
            c.memory_swap = 256 * MB;
        });
        let err = verify(&mut config, &KernelFeatures::all()).unwrap_err();
        assert!(err.to_string().contains("larger than memory limit"));

        let mut config = with(|c| {
            c.memory = 512 * MB;
            c.memory_swap = -1;
        });
        assert!(verify(&mut config, &KernelFeatures::all()).is_ok());
    }

    #[test]
    fn reservation_above_limit() {
        let mut config = with(|c| {
            c.memory = 64 * MB;
            c.memory_reservation = 128 * MB;
        });
        assert!(verify(&mut config, &KernelFeatures::all()).is_err());
    }

    #[test]
    fn value_bounds() {
        let cases: [fn(&mut ResourceConfig); 5] = [
            |c| c.memory_swappiness = 101,
            |c| c.cpu_period = 999,
            |c| c.cpu_quota = 999,
            |c| c.blkio_weight = 5,
            |c| c.oom_score_adj = 1001,
        ];
        for case in cases {
            let mut config = with(case);
            let err = verify(&mut config, &KernelFeatures::all()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::PolicyViolation);
        }
    }

    #[test]
    fn v2_controllers() {
        let features = KernelFeatures::from_v2_controllers("cpuset cpu io memory pids\n");
        assert!(features.memory_limit);
        assert!(features.cpu_cfs_quota);
        assert!(features.pids_limit);
        assert!(!features.kernel_memory);
        assert!(!features.swappiness);

        let features = KernelFeatures::from_v2_controllers("memory");
        assert!(!features.cpu_shares);
    }

    #[test]
    fn detect_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cgroup.controllers"), "cpu memory").unwrap();
        let features = KernelFeatures::detect(dir.path());
        assert!(features.memory_limit);
        assert!(!features.pids_limit);

        let empty = tempfile::tempdir().unwrap();
        assert_eq!(KernelFeatures::detect(empty.path()), KernelFeatures::none());
    }
}
