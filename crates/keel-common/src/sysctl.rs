//! Namespaced sysctl validation.
//!
//! Only sysctls that are scoped to a namespace the container owns may be
//! set; anything else would leak into the host kernel.

use std::collections::BTreeMap;

use crate::error::{KeelError, KeelResult};

/// IPC-namespaced kernel sysctls.
const ALLOWED_KEYS: &[&str] = &[
    "kernel.msgmax",
    "kernel.msgmnb",
    "kernel.msgmni",
    "kernel.sem",
    "kernel.shmall",
    "kernel.shmmax",
    "kernel.shmmni",
    "kernel.shm_rmid_forced",
];

/// Prefixes of sysctl families scoped to the network or IPC namespace.
const ALLOWED_PREFIXES: &[&str] = &["net.", "fs.mqueue."];

/// Whether a sysctl key may be set inside a container.
#[must_use]
pub fn is_namespaced(key: &str) -> bool {
    ALLOWED_KEYS.contains(&key) || ALLOWED_PREFIXES.iter().any(|p| key.starts_with(p))
}

/// Validate `key=value` sysctl entries into a map.
///
/// Later entries for the same key win.
pub fn parse_sysctls(entries: &[String]) -> KeelResult<BTreeMap<String, String>> {
    let mut sysctls = BTreeMap::new();

    for entry in entries {
        let Some((key, value)) = entry.split_once('=') else {
            return Err(KeelError::syntax(
                "sysctl",
                format!("{entry:?} is not in key=value format"),
            ));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(KeelError::syntax("sysctl", format!("{entry:?} has an empty key")));
        }
        if !is_namespaced(key) {
            return Err(KeelError::policy(format!(
                "sysctl {key:?} is not allowed in a container"
            )));
        }
        sysctls.insert(key.to_string(), value.trim().to_string());
    }

    Ok(sysctls)
}
