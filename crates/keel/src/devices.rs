//! Host device resolution for `--device` and block I/O throttles.

use std::path::{Path, PathBuf};

use rustix::fs::FileType;
use serde::{Deserialize, Serialize};

use keel_common::units::{UnitBase, parse_size};
use keel_common::{KeelError, KeelResult};

/// Kind and number of a device node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceNumber {
    /// `c` for character devices, `b` for block devices.
    pub kind: char,
    /// Major number.
    pub major: i64,
    /// Minor number.
    pub minor: i64,
}

/// Read a device node's type and number.
pub fn stat_device(option: &str, path: &Path) -> KeelResult<DeviceNumber> {
    let stat = rustix::fs::stat(path).map_err(|e| {
        KeelError::syntax(option, format!("cannot stat {}: {e}", path.display()))
    })?;

    let kind = match FileType::from_raw_mode(stat.st_mode) {
        FileType::CharacterDevice => 'c',
        FileType::BlockDevice => 'b',
        _ => {
            return Err(KeelError::syntax(
                option,
                format!("{} is not a device node", path.display()),
            ));
        }
    };

    Ok(DeviceNumber {
        kind,
        major: i64::from(rustix::fs::major(stat.st_rdev)),
        minor: i64::from(rustix::fs::minor(stat.st_rdev)),
    })
}

/// A host device exposed inside the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeviceMapping {
    /// Device path on the host.
    pub host_path: PathBuf,
    /// Device path inside the container.
    pub container_path: PathBuf,
    /// Cgroup permissions, a subset of `rwm`.
    pub permissions: String,
    /// Resolved device number.
    pub number: DeviceNumber,
}

/// Parse `host[:container][:perms]` and resolve the host node.
pub fn parse_device(spec: &str) -> KeelResult<DeviceMapping> {
    let parts: Vec<&str> = spec.split(':').collect();
    let (host, container, permissions) = match parts.as_slice() {
        [host] => (*host, *host, "rwm"),
        [host, third] if is_permissions(third) => (*host, *host, *third),
        [host, container] => (*host, *container, "rwm"),
        [host, container, perms] => (*host, *container, *perms),
        _ => return Err(KeelError::syntax("device", format!("{spec:?} has too many fields"))),
    };

    if !is_permissions(permissions) {
        return Err(KeelError::syntax(
            "device",
            format!("invalid permissions {permissions:?}, use a combination of r, w and m"),
        ));
    }
    for path in [host, container] {
        if !path.starts_with('/') {
            return Err(KeelError::syntax("device", format!("{path:?} is not an absolute path")));
        }
    }

    let host_path = PathBuf::from(host);
    let number = stat_device("device", &host_path)?;

    Ok(DeviceMapping {
        host_path,
        container_path: PathBuf::from(container),
        permissions: permissions.to_string(),
        number,
    })
}

fn is_permissions(value: &str) -> bool {
    !value.is_empty() && value.len() <= 3 && value.chars().all(|c| matches!(c, 'r' | 'w' | 'm'))
}

/// A per-device weight or throttle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceLimit {
    /// Major number.
    pub major: i64,
    /// Minor number.
    pub minor: i64,
    /// Weight or rate.
    pub value: u64,
}

fn split_device_value<'a>(option: &str, spec: &'a str) -> KeelResult<(&'a str, &'a str)> {
    let (path, value) = spec
        .rsplit_once(':')
        .ok_or_else(|| KeelError::syntax(option, format!("{spec:?} is not in path:value format")))?;
    if !path.starts_with("/dev/") {
        return Err(KeelError::syntax(option, format!("{path:?} is not a device path")));
    }
    Ok((path, value))
}

/// Parse `--blkio-weight-device path:weight`.
pub fn parse_weight_device(spec: &str) -> KeelResult<DeviceLimit> {
    let option = "blkio-weight-device";
    let (path, weight) = split_device_value(option, spec)?;
    let weight: u16 = weight.parse().map_err(|_| KeelError::unit(option, weight))?;
    if weight > 0 && !(10..=1000).contains(&weight) {
        return Err(KeelError::syntax(option, "weight must be in the range 10 to 1000"));
    }
    let number = stat_device(option, Path::new(path))?;
    Ok(DeviceLimit {
        major: number.major,
        minor: number.minor,
        value: u64::from(weight),
    })
}

/// Parse `--device-{read,write}-bps path:rate`; rates accept sizes like `1mb`.
pub fn parse_bps_device(option: &str, spec: &str) -> KeelResult<DeviceLimit> {
    let (path, rate) = split_device_value(option, spec)?;
    let rate = parse_size(option, rate, UnitBase::Binary)?;
    let rate = u64::try_from(rate).map_err(|_| KeelError::unit(option, spec))?;
    let number = stat_device(option, Path::new(path))?;
    Ok(DeviceLimit {
        major: number.major,
        minor: number.minor,
        value: rate,
    })
}

/// Parse `--device-{read,write}-iops path:rate`.
pub fn parse_iops_device(option: &str, spec: &str) -> KeelResult<DeviceLimit> {
    let (path, rate) = split_device_value(option, spec)?;
    let rate: u64 = rate.parse().map_err(|_| KeelError::unit(option, rate))?;
    let number = stat_device(option, Path::new(path))?;
    Ok(DeviceLimit {
        major: number.major,
        minor: number.minor,
        value: rate,
    })
}
