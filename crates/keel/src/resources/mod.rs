//! Resource limit resolution.
//!
//! Sizes are parsed with binary (`RAMInBytes`) semantics except `shm-size`,
//! which uses decimal human sizes. Zero means "no limit" everywhere; it is
//! never a limit of zero.

mod ulimit;
mod verify;

use serde::{Deserialize, Serialize};

use keel_common::units::{human_size, ram_in_bytes};
use keel_common::{KeelError, KeelResult};

use crate::devices::{self, DeviceLimit};
use crate::options::CreateOptions;

pub use ulimit::Ulimit;
pub use verify::{KernelFeatures, verify};

/// Smallest memory limit the kernel accepts.
pub const MIN_MEMORY: i64 = 4 * 1024 * 1024;

/// Default CFS period used to express `--cpus`.
pub const DEFAULT_CPU_PERIOD: u64 = 100_000;

/// Per-device block I/O throttles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeviceThrottles {
    /// Read bytes per second.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub read_bps: Vec<DeviceLimit>,
    /// Write bytes per second.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub write_bps: Vec<DeviceLimit>,
    /// Read operations per second.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub read_iops: Vec<DeviceLimit>,
    /// Write operations per second.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub write_iops: Vec<DeviceLimit>,
}

impl DeviceThrottles {
    /// Whether no throttle is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read_bps.is_empty()
            && self.write_bps.is_empty()
            && self.read_iops.is_empty()
            && self.write_iops.is_empty()
    }
}

/// Resource limits for a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResourceConfig {
    /// Memory limit in bytes.
    pub memory: i64,
    /// Memory reservation in bytes.
    pub memory_reservation: i64,
    /// Memory plus swap in bytes; `-1` is unlimited.
    pub memory_swap: i64,
    /// Kernel memory limit in bytes.
    pub kernel_memory: i64,
    /// Swappiness; `-1` is unset.
    pub memory_swappiness: i64,
    /// Disable the OOM killer.
    pub oom_kill_disable: bool,
    /// OOM score adjustment.
    pub oom_score_adj: i32,
    /// CPU shares.
    pub cpu_shares: u64,
    /// CFS period in microseconds.
    pub cpu_period: u64,
    /// CFS quota in microseconds.
    pub cpu_quota: i64,
    /// Realtime period in microseconds.
    pub cpu_rt_period: u64,
    /// Realtime runtime in microseconds.
    pub cpu_rt_runtime: i64,
    /// Fractional CPU count.
    pub cpus: f64,
    /// Allowed CPUs.
    pub cpuset_cpus: String,
    /// Allowed memory nodes.
    pub cpuset_mems: String,
    /// Block I/O weight.
    pub blkio_weight: u16,
    /// Per-device block I/O weights.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blkio_weight_device: Vec<DeviceLimit>,
    /// Per-device throttles.
    #[serde(default, skip_serializing_if = "DeviceThrottles::is_empty")]
    pub throttles: DeviceThrottles,
    /// PIDs limit.
    pub pids_limit: i64,
    /// `/dev/shm` size in bytes.
    pub shm_size: i64,
    /// Process limits.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ulimits: Vec<Ulimit>,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            memory: 0,
            memory_reservation: 0,
            memory_swap: 0,
            kernel_memory: 0,
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
            blkio_weight: 0,
            blkio_weight_device: Vec::new(),
            throttles: DeviceThrottles::default(),
            pids_limit: 0,
            shm_size: 0,
            ulimits: Vec::new(),
        }
    }
}

impl ResourceConfig {
    /// CFS `(quota, period)` pair, translating `--cpus` when set.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn cfs(&self) -> (i64, u64) {
        if self.cpus > 0.0 {
            let quota = (self.cpus * DEFAULT_CPU_PERIOD as f64).round() as i64;
            return (quota, DEFAULT_CPU_PERIOD);
        }
        (self.cpu_quota, self.cpu_period)
    }
}

/// Parse a memory-sized option; empty means unset.
fn memory_field(field: &str, value: &str) -> KeelResult<i64> {
    ram_in_bytes(field, value)
}

/// Resolve resource options into a [`ResourceConfig`].
///
/// Only parsing and mutual exclusion happen here; kernel support and value
/// bounds are checked by [`verify`].
pub fn resolve(opts: &CreateOptions) -> KeelResult<ResourceConfig> {
    let memory = memory_field("memory", &opts.memory)?;
    let memory_reservation = memory_field("memory-reservation", &opts.memory_reservation)?;
    let memory_swap = match opts.memory_swap.trim() {
        "-1" => -1,
        value => memory_field("memory-swap", value)?,
    };
    let kernel_memory = memory_field("kernel-memory", &opts.kernel_memory)?;

    let blkio_weight = match opts.blkio_weight.trim() {
        "" => 0,
        value => value
            .parse::<u16>()
            .map_err(|_| KeelError::unit("blkio-weight", value))?,
    };

    if opts.cpus < 0.0 || !opts.cpus.is_finite() {
        return Err(KeelError::unit("cpus", opts.cpus.to_string()));
    }
    if opts.cpu_period != 0 && opts.cpus > 0.0 {
        return Err(KeelError::conflict("--cpu-period", "--cpus"));
    }
    if opts.cpu_quota != 0 && opts.cpus > 0.0 {
        return Err(KeelError::conflict("--cpu-quota", "--cpus"));
    }

    let shm_size = human_size("shm-size", &opts.shm_size)?;

    let blkio_weight_device = opts
        .blkio_weight_device
        .iter()
        .map(|spec| devices::parse_weight_device(spec))
        .collect::<KeelResult<Vec<_>>>()?;

    let throttles = DeviceThrottles {
        read_bps: parse_each(&opts.device_read_bps, |s| {
            devices::parse_bps_device("device-read-bps", s)
        })?,
        write_bps: parse_each(&opts.device_write_bps, |s| {
            devices::parse_bps_device("device-write-bps", s)
        })?,
        read_iops: parse_each(&opts.device_read_iops, |s| {
            devices::parse_iops_device("device-read-iops", s)
        })?,
        write_iops: parse_each(&opts.device_write_iops, |s| {
            devices::parse_iops_device("device-write-iops", s)
        })?,
    };

    let ulimits = parse_each(&opts.ulimit, Ulimit::parse)?;

    let config = ResourceConfig {
        memory,
        memory_reservation,
        memory_swap,
        kernel_memory,
        memory_swappiness: opts.memory_swappiness,
        oom_kill_disable: opts.oom_kill_disable,
        oom_score_adj: opts.oom_score_adj,
        cpu_shares: opts.cpu_shares,
        cpu_period: opts.cpu_period,
        cpu_quota: opts.cpu_quota,
        cpu_rt_period: opts.cpu_rt_period,
        cpu_rt_runtime: opts.cpu_rt_runtime,
        cpus: opts.cpus,
        cpuset_cpus: opts.cpuset_cpus.clone(),
        cpuset_mems: opts.cpuset_mems.clone(),
        blkio_weight,
        blkio_weight_device,
        throttles,
        pids_limit: opts.pids_limit,
        shm_size,
        ulimits,
    };

    tracing::debug!(
        memory = config.memory,
        memory_swap = config.memory_swap,
        cpus = config.cpus,
        pids_limit = config.pids_limit,
        "Resolved resource limits"
    );

    Ok(config)
}

fn parse_each<T>(specs: &[String], parse: impl Fn(&str) -> KeelResult<T>) -> KeelResult<Vec<T>> {
    specs.iter().map(|spec| parse(spec)).collect()
}
