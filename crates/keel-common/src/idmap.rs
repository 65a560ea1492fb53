//! UID/GID mapping specs for user namespaces.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{KeelError, KeelResult};

/// UID/GID mapping entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdMap {
    /// Container ID (start).
    pub container_id: u32,
    /// Host ID (start).
    pub host_id: u32,
    /// Range size.
    pub size: u32,
}

impl IdMap {
    /// Create a new ID mapping.
    #[must_use]
    pub const fn new(container_id: u32, host_id: u32, size: u32) -> Self {
        Self {
            container_id,
            host_id,
            size,
        }
    }

    /// Parse one or more `container:host:size` triples separated by commas.
    pub fn parse_list(option: &str, spec: &str) -> KeelResult<Vec<Self>> {
        spec.split(',')
            .map(|triple| {
                let fields: Vec<&str> = triple.trim().split(':').collect();
                let [container, host, size] = fields.as_slice() else {
                    return Err(KeelError::syntax(
                        option,
                        format!("{triple:?} is not container:host:size"),
                    ));
                };
                let number = |s: &str| {
                    s.parse::<u32>()
                        .map_err(|_| KeelError::syntax(option, format!("{s:?} is not an ID")))
                };
                let map = Self::new(number(*container)?, number(*host)?, number(*size)?);
                if map.size == 0 {
                    return Err(KeelError::syntax(option, "mapping size must be positive"));
                }
                Ok(map)
            })
            .collect()
    }
}

/// Resolved ID mappings for a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdMappings {
    /// UID mappings; empty means the host mapping is used.
    pub uid_map: Vec<IdMap>,
    /// GID mappings; empty means the host mapping is used.
    pub gid_map: Vec<IdMap>,
}

impl IdMappings {
    /// Whether UIDs are shared with the host (no user namespace remapping).
    #[must_use]
    pub fn host_uid_mapping(&self) -> bool {
        self.uid_map.is_empty()
    }

    /// Whether GIDs are shared with the host.
    #[must_use]
    pub fn host_gid_mapping(&self) -> bool {
        self.gid_map.is_empty()
    }
}

/// Inputs for [`parse_id_mappings`].
#[derive(Debug, Clone, Copy)]
pub struct IdMappingRequest<'a> {
    /// `--uidmap` entries.
    pub uid_map: &'a [String],
    /// `--gidmap` entries.
    pub gid_map: &'a [String],
    /// `--subuidname`.
    pub subuid_name: &'a str,
    /// `--subgidname`.
    pub subgid_name: &'a str,
    /// Path of the subordinate UID file (normally `/etc/subuid`).
    pub subuid_file: &'a Path,
    /// Path of the subordinate GID file (normally `/etc/subgid`).
    pub subgid_file: &'a Path,
}

/// Resolve user namespace mappings.
///
/// Missing GID maps default to the UID maps and vice versa; the same holds
/// for subordinate ID names. Subordinate ranges are listed first.
pub fn parse_id_mappings(request: &IdMappingRequest<'_>) -> KeelResult<IdMappings> {
    let (uid_specs, gid_specs) = match (request.uid_map.is_empty(), request.gid_map.is_empty()) {
        (false, true) => (request.uid_map, request.uid_map),
        (true, false) => (request.gid_map, request.gid_map),
        _ => (request.uid_map, request.gid_map),
    };

    let (subuid_name, subgid_name) = match (request.subuid_name, request.subgid_name) {
        (u, "") => (u, u),
        ("", g) => (g, g),
        (u, g) => (u, g),
    };

    let mut mappings = IdMappings::default();

    if !subuid_name.is_empty() {
        mappings.uid_map = read_subordinate_ranges(request.subuid_file, subuid_name)?;
        mappings.gid_map = read_subordinate_ranges(request.subgid_file, subgid_name)?;
    }

    for spec in uid_specs {
        mappings.uid_map.extend(IdMap::parse_list("uidmap", spec)?);
    }
    for spec in gid_specs {
        mappings.gid_map.extend(IdMap::parse_list("gidmap", spec)?);
    }

    tracing::debug!(
        uid_ranges = mappings.uid_map.len(),
        gid_ranges = mappings.gid_map.len(),
        "Resolved ID mappings"
    );

    Ok(mappings)
}

/// Read the ranges assigned to `name` from a subuid/subgid file and lay them
/// out consecutively starting at container ID 0.
fn read_subordinate_ranges(path: &Path, name: &str) -> KeelResult<Vec<IdMap>> {
    let content = fs::read_to_string(path)?;

    let mut next_container_id: u32 = 0;
    let mut maps = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split(':').collect();
        let [owner, start, count] = parts.as_slice() else {
            continue;
        };
        if *owner != name {
            continue;
        }
        if let (Ok(start), Ok(count)) = (start.parse::<u32>(), count.parse::<u32>()) {
            maps.push(IdMap::new(next_container_id, start, count));
            next_container_id = next_container_id.saturating_add(count);
        }
    }

    if maps.is_empty() {
        return Err(KeelError::policy(format!(
            "no subordinate ID ranges found for {name:?} in {}",
            path.display()
        )));
    }

    Ok(maps)
}
