//! Bind volumes, tmpfs mounts and image volume handling.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use keel_common::{KeelError, KeelResult};
use keel_oci::ImageMetadata;

/// Options applied to a tmpfs mount without any of its own.
pub const DEFAULT_TMPFS_OPTIONS: &[&str] = &["rw", "noexec", "nosuid", "nodev", "size=65536k"];

/// What to do with volumes the image declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageVolumeType {
    /// Bind-mount the volume from container storage.
    #[default]
    Bind,
    /// Mount a tmpfs at each volume path.
    Tmpfs,
    /// Leave the paths in the image rootfs.
    Ignore,
}

impl ImageVolumeType {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bind => "bind",
            Self::Tmpfs => "tmpfs",
            Self::Ignore => "ignore",
        }
    }
}

impl fmt::Display for ImageVolumeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageVolumeType {
    type Err = KeelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bind" => Ok(Self::Bind),
            "tmpfs" => Ok(Self::Tmpfs),
            "ignore" => Ok(Self::Ignore),
            _ => Err(KeelError::policy(format!(
                "invalid image-volume type {s:?}. Pick one of bind, tmpfs, or ignore"
            ))),
        }
    }
}

/// A `--volume` bind mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VolumeMount {
    /// Host path.
    pub source: PathBuf,
    /// Container path.
    pub destination: PathBuf,
    /// Mount options in the order given.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

/// Option groups where at most one member may appear.
const OPTION_CLASSES: &[&[&str]] = &[
    &["rw", "ro"],
    &["z", "Z"],
    &["shared", "rshared", "slave", "rslave", "private", "rprivate"],
    &["bind", "rbind"],
    &["exec", "noexec"],
    &["dev", "nodev"],
    &["suid", "nosuid"],
];

impl VolumeMount {
    /// Parse `src:dest[:opts]`. Both paths must be absolute.
    pub fn parse(spec: &str) -> KeelResult<Self> {
        let invalid = |message: String| KeelError::syntax("volume", message);

        let parts: Vec<&str> = spec.split(':').collect();
        let (source, destination, options) = match parts.as_slice() {
            [source, destination] => (*source, *destination, ""),
            [source, destination, options] => (*source, *destination, *options),
            _ => return Err(invalid(format!("{spec:?} is not in src:dest[:options] format"))),
        };

        for path in [source, destination] {
            if !path.starts_with('/') {
                return Err(invalid(format!("{path:?} is not an absolute path")));
            }
        }

        let options: Vec<String> = if options.is_empty() {
            Vec::new()
        } else {
            options.split(',').map(ToString::to_string).collect()
        };
        validate_options(spec, &options)?;

        Ok(Self {
            source: PathBuf::from(source),
            destination: PathBuf::from(destination),
            options,
        })
    }
}

fn validate_options(spec: &str, options: &[String]) -> KeelResult<()> {
    let mut seen = vec![false; OPTION_CLASSES.len()];
    for option in options {
        let class = OPTION_CLASSES
            .iter()
            .position(|class| class.contains(&option.as_str()))
            .ok_or_else(|| {
                KeelError::syntax("volume", format!("invalid option {option:?} in {spec:?}"))
            })?;
        if seen[class] {
            return Err(KeelError::syntax(
                "volume",
                format!("{spec:?} sets more than one of {}", OPTION_CLASSES[class].join(", ")),
            ));
        }
        seen[class] = true;
    }
    Ok(())
}

/// A `--tmpfs` mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TmpfsMount {
    /// Container path.
    pub destination: PathBuf,
    /// Mount options.
    pub options: Vec<String>,
}

impl TmpfsMount {
    /// Parse `dest[:opts]`.
    pub fn parse(spec: &str) -> KeelResult<Self> {
        let (destination, options) = spec.split_once(':').unwrap_or((spec, ""));
        if !destination.starts_with('/') {
            return Err(KeelError::syntax(
                "tmpfs",
                format!("{destination:?} is not an absolute path"),
            ));
        }
        let options = if options.is_empty() {
            DEFAULT_TMPFS_OPTIONS.iter().map(ToString::to_string).collect()
        } else {
            options.split(',').map(ToString::to_string).collect()
        };
        Ok(Self {
            destination: PathBuf::from(destination),
            options,
        })
    }
}

/// Resolved storage settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageConfig {
    /// Bind mounts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<VolumeMount>,
    /// Tmpfs mounts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tmpfs: Vec<TmpfsMount>,
    /// Image volume handling.
    pub image_volume_type: ImageVolumeType,
    /// Volumes the image declares.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_volumes: Vec<PathBuf>,
}

impl StorageConfig {
    /// Whether image volumes are bind-mounted from container storage.
    #[must_use]
    pub fn uses_image_volumes(&self) -> bool {
        self.image_volume_type == ImageVolumeType::Bind
    }
}

/// Resolve `--volume`, `--tmpfs` and `--image-volume`.
///
/// Two mounts targeting the same container path are rejected.
pub fn resolve(
    volumes: &[String],
    tmpfs: &[String],
    image_volume: &str,
    image: &ImageMetadata,
) -> KeelResult<StorageConfig> {
    let image_volume_type: ImageVolumeType = image_volume.parse()?;
    let volumes = volumes
        .iter()
        .map(|spec| VolumeMount::parse(spec))
        .collect::<KeelResult<Vec<_>>>()?;
    let tmpfs = tmpfs
        .iter()
        .map(|spec| TmpfsMount::parse(spec))
        .collect::<KeelResult<Vec<_>>>()?;

    let mut destinations = BTreeSet::new();
    let all = volumes
        .iter()
        .map(|v| (&v.destination, "--volume"))
        .chain(tmpfs.iter().map(|t| (&t.destination, "--tmpfs")));
    for (destination, option) in all {
        if !destinations.insert(destination) {
            return Err(KeelError::conflict(
                format!("{option} {}", destination.display()),
                "another mount at the same destination",
            ));
        }
    }

    Ok(StorageConfig {
        volumes,
        tmpfs,
        image_volume_type,
        image_volumes: image.volume_paths().map(PathBuf::from).collect(),
    })
}
