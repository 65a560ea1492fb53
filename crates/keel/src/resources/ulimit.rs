//! `--ulimit name=soft[:hard]` parsing.

use serde::{Deserialize, Serialize};

use keel_common::{KeelError, KeelResult};

const NAMES: &[&str] = &[
    "as", "core", "cpu", "data", "fsize", "locks", "memlock", "msgqueue", "nice", "nofile",
    "nproc", "rss", "rtprio", "rttime", "sigpending", "stack",
];

/// A process resource limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ulimit {
    /// Lowercase limit name (`nofile`).
    pub name: String,
    /// Soft limit.
    pub soft: u64,
    /// Hard limit.
    pub hard: u64,
}

impl Ulimit {
    /// Parse `name=soft[:hard]`; `-1` means unlimited.
    pub fn parse(spec: &str) -> KeelResult<Self> {
        let invalid = |message: String| KeelError::syntax("ulimit", message);

        let (name, limits) = spec
            .split_once('=')
            .ok_or_else(|| invalid(format!("{spec:?} is not in name=soft[:hard] format")))?;
        let name = name.trim().to_ascii_lowercase();
        if !NAMES.contains(&name.as_str()) {
            return Err(invalid(format!("unknown limit {name:?}")));
        }

        let (soft, hard) = match limits.split_once(':') {
            Some((soft, hard)) => (limit_value(soft)?, limit_value(hard)?),
            None => {
                let value = limit_value(limits)?;
                (value, value)
            }
        };
        if soft > hard {
            return Err(invalid(format!(
                "soft limit {soft} for {name} is greater than hard limit {hard}"
            )));
        }

        Ok(Self { name, soft, hard })
    }

    /// OCI rlimit type (`RLIMIT_NOFILE`).
    #[must_use]
    pub fn rlimit_type(&self) -> String {
        format!("RLIMIT_{}", self.name.to_ascii_uppercase())
    }
}

fn limit_value(value: &str) -> KeelResult<u64> {
    let value = value.trim();
    if value == "-1" {
        return Ok(u64::MAX);
    }
    value.parse().map_err(|_| KeelError::unit("ulimit", value))
}
