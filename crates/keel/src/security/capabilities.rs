//! Linux capability validation and effective set computation.

use std::collections::BTreeSet;
use std::str::FromStr;

use caps::Capability;

use keel_common::{KeelError, KeelResult};

/// Keyword selecting every capability.
pub const ALL: &str = "ALL";

/// Capabilities granted to unprivileged containers.
pub const DEFAULT_CAPABILITIES: [Capability; 14] = [
    Capability::CAP_CHOWN,
    Capability::CAP_DAC_OVERRIDE,
    Capability::CAP_FSETID,
    Capability::CAP_FOWNER,
    Capability::CAP_MKNOD,
    Capability::CAP_NET_RAW,
    Capability::CAP_SETGID,
    Capability::CAP_SETUID,
    Capability::CAP_SETFCAP,
    Capability::CAP_SETPCAP,
    Capability::CAP_NET_BIND_SERVICE,
    Capability::CAP_SYS_CHROOT,
    Capability::CAP_KILL,
    Capability::CAP_AUDIT_WRITE,
];

/// Normalize a `--cap-add`/`--cap-drop` entry to `ALL` or `CAP_<NAME>`.
pub fn normalize(option: &str, name: &str) -> KeelResult<String> {
    let upper = name.trim().to_ascii_uppercase();
    if upper == ALL {
        return Ok(upper);
    }

    let full = if upper.starts_with("CAP_") {
        upper
    } else {
        format!("CAP_{upper}")
    };
    Capability::from_str(&full)
        .map(|cap| cap.to_string())
        .map_err(|_| KeelError::syntax(option, format!("unknown capability {name:?}")))
}

/// Normalize a list of capability names, dropping duplicates.
pub fn normalize_all(option: &str, names: &[String]) -> KeelResult<Vec<String>> {
    let mut seen = BTreeSet::new();
    for name in names {
        seen.insert(normalize(option, name)?);
    }
    Ok(seen.into_iter().collect())
}

fn all_names() -> BTreeSet<String> {
    caps::all().into_iter().map(|cap| cap.to_string()).collect()
}

/// Effective capability list, sorted.
///
/// Privileged containers get every capability. Otherwise the defaults are
/// reduced by `drop` and extended by `add`; `ALL` in either list applies to
/// the whole set.
#[must_use]
pub fn effective(add: &[String], drop: &[String], privileged: bool) -> Vec<String> {
    if privileged {
        return all_names().into_iter().collect();
    }

    let mut set: BTreeSet<String> = if drop.iter().any(|c| c == ALL) {
        BTreeSet::new()
    } else {
        DEFAULT_CAPABILITIES
            .iter()
            .map(ToString::to_string)
            .filter(|cap| !drop.contains(cap))
            .collect()
    };

    if add.iter().any(|c| c == ALL) {
        set.extend(all_names());
    } else {
        set.extend(add.iter().cloned());
    }

    set.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn normalize_names() {
        assert_eq!(normalize("cap-add", "net_admin").unwrap(), "CAP_NET_ADMIN");
        assert_eq!(normalize("cap-add", "CAP_SYS_ADMIN").unwrap(), "CAP_SYS_ADMIN");
        assert_eq!(normalize("cap-drop", "all").unwrap(), "ALL");
        assert!(normalize("cap-add", "CAP_FLY").is_err());
    }

    #[test]
    fn default_set() {
        let caps = effective(&[], &[], false);
        assert_eq!(caps.len(), DEFAULT_CAPABILITIES.len());
        assert!(caps.contains(&"CAP_CHOWN".to_string()));
        assert!(!caps.contains(&"CAP_SYS_ADMIN".to_string()));
    }

    #[test]
    fn add_and_drop() {
        let caps = effective(&list(&["CAP_NET_ADMIN"]), &list(&["CAP_MKNOD"]), false);
        assert!(caps.contains(&"CAP_NET_ADMIN".to_string()));
        assert!(!caps.contains(&"CAP_MKNOD".to_string()));

        let caps = effective(&list(&["CAP_KILL"]), &list(&["ALL"]), false);
        assert_eq!(caps, list(&["CAP_KILL"]));
    }

    #[test]
    fn privileged_gets_everything() {
        let caps = effective(&[], &list(&["ALL"]), true);
        assert!(caps.contains(&"CAP_SYS_ADMIN".to_string()));
        assert!(caps.len() > DEFAULT_CAPABILITIES.len());
    }
}
