//! Seccomp profile selection.
//!
//! The profile itself is loaded by the execution engine; here we only pick
//! which file it should load.

use std::io;
use std::path::{Path, PathBuf};

use keel_common::{KeelPaths, KeelResult};

/// `seccomp=unconfined` runs without a filter.
pub const UNCONFINED: &str = "unconfined";

/// Probe the override profile, then the default profile.
///
/// A missing file is skipped; `Ok(None)` means no confinement is applied.
/// Any other I/O error is returned as is.
pub fn default_profile(paths: &KeelPaths) -> KeelResult<Option<PathBuf>> {
    for candidate in [&paths.seccomp_override, &paths.seccomp_default] {
        if probe(candidate)? {
            tracing::debug!(profile = %candidate.display(), "Using seccomp profile");
            return Ok(Some(candidate.clone()));
        }
    }

    tracing::debug!("No seccomp profile found");
    Ok(None)
}

fn probe(path: &Path) -> KeelResult<bool> {
    match std::fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn paths_in(dir: &Path) -> KeelPaths {
        KeelPaths::new().with_seccomp(dir.join("override.json"), dir.join("default.json"))
    }

    #[test]
    fn override_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        fs::write(&paths.seccomp_override, "{}").unwrap();
        fs::write(&paths.seccomp_default, "{}").unwrap();

        assert_eq!(default_profile(&paths).unwrap(), Some(paths.seccomp_override.clone()));
    }

    #[test]
    fn falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        fs::write(&paths.seccomp_default, "{}").unwrap();

        assert_eq!(default_profile(&paths).unwrap(), Some(paths.seccomp_default.clone()));
    }

    #[test]
    fn absent_profiles_are_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(default_profile(&paths_in(dir.path())).unwrap(), None);
    }

    #[test]
    fn other_io_errors_propagate() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        fs::write(&file, "").unwrap();
        // A path below a regular file fails with ENOTDIR, not ENOENT.
        let paths = KeelPaths::new().with_seccomp(file.join("seccomp.json"), file.join("x.json"));

        let err = default_profile(&paths).unwrap_err();
        assert_eq!(err.kind(), keel_common::ErrorKind::Io);
    }
}
