//! Environment, label and annotation merging.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use keel_common::{KeelError, KeelResult};
use keel_oci::ImageMetadata;

/// Default `PATH` for containers.
pub const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// The base environment every container starts from.
///
/// Returns a new map on every call; callers own and mutate their copy.
#[must_use]
pub fn default_environment() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("PATH".to_string(), DEFAULT_PATH.to_string()),
        ("TERM".to_string(), "xterm".to_string()),
    ])
}

/// Where bare `KEY` entries take their value from.
#[derive(Debug, Clone, Default)]
pub enum HostEnv {
    /// The calling process's environment.
    #[default]
    Process,
    /// A fixed map.
    Fixed(BTreeMap<String, String>),
}

impl HostEnv {
    fn get(&self, key: &str) -> Option<String> {
        match self {
            Self::Process => std::env::var(key).ok(),
            Self::Fixed(vars) => vars.get(key).cloned(),
        }
    }
}

/// Build the container environment.
///
/// Later sources win: defaults, image env, env files in order, then `--env`.
/// A bare `KEY` takes the host value and is skipped when the host has none.
pub fn merge_environment(
    image: &ImageMetadata,
    env_files: &[PathBuf],
    env: &[String],
    host: &HostEnv,
) -> KeelResult<BTreeMap<String, String>> {
    let mut merged = default_environment();

    for entry in &image.env {
        match entry.split_once('=') {
            Some((key, value)) => merged.insert(key.to_string(), value.to_string()),
            None => merged.insert(entry.clone(), String::new()),
        };
    }

    for file in env_files {
        for line in read_kv_file("env-file", file)? {
            apply_env(&mut merged, "env-file", &line, host)?;
        }
    }
    for entry in env {
        apply_env(&mut merged, "env", entry, host)?;
    }

    Ok(merged)
}

fn apply_env(
    merged: &mut BTreeMap<String, String>,
    option: &str,
    entry: &str,
    host: &HostEnv,
) -> KeelResult<()> {
    match entry.split_once('=') {
        Some(("", _)) => Err(KeelError::syntax(option, format!("{entry:?} has an empty name"))),
        Some((key, value)) => {
            merged.insert(key.to_string(), value.to_string());
            Ok(())
        }
        None => {
            if entry.trim().is_empty() || entry.contains(char::is_whitespace) {
                return Err(KeelError::syntax(option, format!("invalid variable {entry:?}")));
            }
            if let Some(value) = host.get(entry) {
                merged.insert(entry.to_string(), value);
            }
            Ok(())
        }
    }
}

/// Build the label set.
///
/// Label files are applied in order, then `--label`. Image labels only fill
/// keys the user did not set.
pub fn merge_labels(
    image: &ImageMetadata,
    label_files: &[PathBuf],
    labels: &[String],
) -> KeelResult<BTreeMap<String, String>> {
    let mut merged = BTreeMap::new();
    for file in label_files {
        for line in read_kv_file("label-file", file)? {
            let (key, value) = split_label("label-file", &line)?;
            merged.insert(key, value);
        }
    }
    for entry in labels {
        let (key, value) = split_label("label", entry)?;
        merged.insert(key, value);
    }
    for (key, value) in &image.labels {
        merged.entry(key.clone()).or_insert_with(|| value.clone());
    }
    Ok(merged)
}

fn split_label(option: &str, entry: &str) -> KeelResult<(String, String)> {
    let (key, value) = entry.split_once('=').unwrap_or((entry, ""));
    if key.is_empty() {
        return Err(KeelError::syntax(option, format!("{entry:?} has an empty key")));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Parse `--annotation key=value` entries.
pub fn parse_annotations(entries: &[String]) -> KeelResult<BTreeMap<String, String>> {
    parse_key_values("annotation", entries)
}

/// Parse `--log-opt key=value` entries.
pub fn parse_log_options(entries: &[String]) -> KeelResult<BTreeMap<String, String>> {
    parse_key_values("log-opt", entries)
}

fn parse_key_values(option: &str, entries: &[String]) -> KeelResult<BTreeMap<String, String>> {
    entries
        .iter()
        .map(|entry| match entry.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => Err(KeelError::syntax(
                option,
                format!("{entry:?} is not in key=value format"),
            )),
        })
        .collect()
}

/// Non-empty, non-comment lines of a key/value file.
fn read_kv_file(option: &str, path: &Path) -> KeelResult<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| {
        KeelError::syntax(option, format!("cannot read {}: {e}", path.display()))
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(ToString::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn host() -> HostEnv {
        HostEnv::Fixed(BTreeMap::from([("HOME".to_string(), "/root".to_string())]))
    }

    #[test]
    fn default_environment_is_fresh() {
        let mut first = default_environment();
        first.insert("FOO".into(), "bar".into());
        let second = default_environment();
        assert!(!second.contains_key("FOO"));
        assert_eq!(second["PATH"], DEFAULT_PATH);
        assert_eq!(second["TERM"], "xterm");
    }

    #[test]
    fn later_sources_win() {
        let mut image = ImageMetadata::new("sha256:abc", "app");
        image.env = vec!["PATH=/opt/bin".into(), "MODE=image".into()];

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# comment\nMODE=file\n\nFROM_FILE=1").unwrap();

        let env = merge_environment(
            &image,
            &[file.path().to_path_buf()],
            &["MODE=flag".into(), "HOME".into(), "MISSING".into()],
            &host(),
        )
        .unwrap();

        assert_eq!(env["PATH"], "/opt/bin");
        assert_eq!(env["MODE"], "flag");
        assert_eq!(env["FROM_FILE"], "1");
        assert_eq!(env["HOME"], "/root");
        assert!(!env.contains_key("MISSING"));
    }

    #[test]
    fn bad_env_entries() {
        let image = ImageMetadata::new("sha256:abc", "app");
        assert!(merge_environment(&image, &[], &["=x".into()], &host()).is_err());
        assert!(
            merge_environment(&image, &[PathBuf::from("/nonexistent/env")], &[], &host()).is_err()
        );
    }

    #[test]
    fn image_labels_fill_missing_keys() {
        let mut image = ImageMetadata::new("sha256:abc", "app");
        image.labels.insert("tier".into(), "image".into());
        image.labels.insert("vendor".into(), "acme".into());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "owner=ops").unwrap();

        let labels =
            merge_labels(&image, &[file.path().to_path_buf()], &["tier=web".into(), "flag".into()])
                .unwrap();
        assert_eq!(labels["tier"], "web");
        assert_eq!(labels["vendor"], "acme");
        assert_eq!(labels["owner"], "ops");
        assert_eq!(labels["flag"], "");
    }

    #[test]
    fn annotations() {
        let parsed = parse_annotations(&["io.keel.x=1".into()]).unwrap();
        assert_eq!(parsed["io.keel.x"], "1");
        assert!(parse_annotations(&["novalue".into()]).is_err());
    }

    #[test]
    fn log_options() {
        let parsed = parse_log_options(&["max-size=10m".into(), "tag=".into()]).unwrap();
        assert_eq!(parsed["max-size"], "10m");
        assert_eq!(parsed["tag"], "");

        let err = parse_log_options(&["=10m".into()]).unwrap_err();
        assert!(err.to_string().contains("log-opt"));
    }
}
