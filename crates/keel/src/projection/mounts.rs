//! Mount table for the runtime spec.

use std::path::PathBuf;

use once_cell::sync::Lazy;

use keel_oci::runtime::Mount;

use crate::config::CreateConfig;
use crate::storage::ImageVolumeType;

/// Kernel filesystems every container gets, except `/dev/shm`.
static BASE_MOUNTS: Lazy<Vec<Mount>> = Lazy::new(|| {
    vec![
        Mount::kernel("/proc", "proc", "proc", &["nosuid", "noexec", "nodev"]),
        Mount::kernel(
            "/dev",
            "tmpfs",
            "tmpfs",
            &["nosuid", "strictatime", "mode=755", "size=65536k"],
        ),
        Mount::kernel(
            "/dev/pts",
            "devpts",
            "devpts",
            &["nosuid", "noexec", "newinstance", "ptmxmode=0666", "mode=0620", "gid=5"],
        ),
        Mount::kernel("/dev/mqueue", "mqueue", "mqueue", &["nosuid", "noexec", "nodev"]),
        Mount::kernel("/sys", "sysfs", "sysfs", &["nosuid", "noexec", "nodev", "ro"]),
    ]
});

/// Paths hidden from unprivileged containers.
pub const MASKED_PATHS: &[&str] = &[
    "/proc/acpi",
    "/proc/kcore",
    "/proc/keys",
    "/proc/latency_stats",
    "/proc/timer_list",
    "/proc/timer_stats",
    "/proc/sched_debug",
    "/proc/scsi",
    "/sys/firmware",
];

/// Paths mounted read-only in unprivileged containers.
pub const READONLY_PATHS: &[&str] = &[
    "/proc/asound",
    "/proc/bus",
    "/proc/fs",
    "/proc/irq",
    "/proc/sys",
    "/proc/sysrq-trigger",
];

/// Volume options that are relabel requests, not mount flags.
const RELABEL_OPTIONS: &[&str] = &["z", "Z"];

pub(super) fn mounts(config: &CreateConfig) -> Vec<Mount> {
    let mut mounts = BASE_MOUNTS.clone();

    mounts.push(match &config.namespaces.shm_dir {
        Some(dir) => Mount {
            destination: PathBuf::from("/dev/shm"),
            mount_type: Some("bind".to_string()),
            source: Some(dir.clone()),
            options: vec!["bind".to_string(), "private".to_string()],
        },
        None => {
            let size = format!("size={}", config.resources.shm_size);
            Mount::kernel(
                "/dev/shm",
                "tmpfs",
                "shm",
                &["nosuid", "noexec", "nodev", "mode=1777", size.as_str()],
            )
        }
    });

    for volume in &config.storage.volumes {
        let mut options: Vec<String> = volume
            .options
            .iter()
            .filter(|o| !RELABEL_OPTIONS.contains(&o.as_str()))
            .cloned()
            .collect();
        if !options.iter().any(|o| o == "bind" || o == "rbind") {
            options.push("rbind".to_string());
        }
        mounts.push(Mount {
            destination: volume.destination.clone(),
            mount_type: Some("bind".to_string()),
            source: Some(volume.source.clone()),
            options,
        });
    }

    for tmpfs in &config.storage.tmpfs {
        mounts.push(Mount {
            destination: tmpfs.destination.clone(),
            mount_type: Some("tmpfs".to_string()),
            source: Some(PathBuf::from("tmpfs")),
            options: tmpfs.options.clone(),
        });
    }

    if config.storage.image_volume_type == ImageVolumeType::Tmpfs {
        let taken: Vec<&PathBuf> = mounts.iter().map(|m| &m.destination).collect();
        let image_tmpfs: Vec<Mount> = config
            .storage
            .image_volumes
            .iter()
            .filter(|path| !taken.contains(path))
            .map(|path| Mount {
                destination: path.clone(),
                mount_type: Some("tmpfs".to_string()),
                source: Some(PathBuf::from("tmpfs")),
                options: vec!["rw".to_string(), "nodev".to_string(), "nosuid".to_string()],
            })
            .collect();
        mounts.extend(image_tmpfs);
    }

    mounts
}
