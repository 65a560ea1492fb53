//! Entrypoint and command resolution.

use serde::{Deserialize, Serialize};

use keel_common::{KeelError, KeelResult};
use keel_oci::ImageMetadata;

/// The process a container runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResolvedCommand {
    /// Effective entrypoint; empty when cleared or absent.
    pub entrypoint: Vec<String>,
    /// Full argv: entrypoint followed by arguments.
    pub command: Vec<String>,
}

/// Merge user overrides with the image's entrypoint and CMD.
///
/// `entrypoint` is `None` when the flag was not given. An explicit entrypoint
/// that joins to an empty string clears the image entrypoint. Once the flag is
/// given, the image CMD is never appended.
pub fn resolve(
    entrypoint: Option<&[String]>,
    args: &[String],
    image: &ImageMetadata,
) -> KeelResult<ResolvedCommand> {
    let image_cmd = image.cmd.as_deref().unwrap_or_default();

    let resolved_entrypoint: Vec<String> = match entrypoint {
        None => image.entrypoint.clone().unwrap_or_default(),
        Some(user) if user.concat().is_empty() => Vec::new(),
        Some(user) => user.to_vec(),
    };

    let mut command = resolved_entrypoint.clone();
    if !args.is_empty() {
        command.extend_from_slice(args);
    } else if entrypoint.is_none() {
        command.extend_from_slice(image_cmd);
    }

    if command.is_empty() {
        return Err(KeelError::NoCommand);
    }

    tracing::debug!(?command, "Resolved container command");

    Ok(ResolvedCommand {
        entrypoint: resolved_entrypoint,
        command,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_common::ErrorKind;

    fn argv(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    fn image() -> ImageMetadata {
        ImageMetadata::new("sha256:abc", "sh")
            .with_entrypoint(["/bin/sh"])
            .with_cmd(["-c", "echo hi"])
    }

    #[test]
    fn image_defaults() {
        let resolved = resolve(None, &[], &image()).unwrap();
        assert_eq!(resolved.command, argv(&["/bin/sh", "-c", "echo hi"]));
        assert_eq!(resolved.entrypoint, argv(&["/bin/sh"]));
    }

    #[test]
    fn args_replace_cmd() {
        let resolved = resolve(None, &argv(&["-x"]), &image()).unwrap();
        assert_eq!(resolved.command, argv(&["/bin/sh", "-x"]));
    }

    #[test]
    fn explicit_entrypoint_drops_image_cmd() {
        let ep = argv(&["/bin/bash"]);
        let resolved = resolve(Some(&ep), &[], &image()).unwrap();
        assert_eq!(resolved.command, argv(&["/bin/bash"]));

        let resolved = resolve(Some(&ep), &argv(&["-l"]), &image()).unwrap();
        assert_eq!(resolved.command, argv(&["/bin/bash", "-l"]));
    }

    #[test]
    fn empty_entrypoint_clears() {
        let cleared = argv(&[""]);
        let resolved = resolve(Some(&cleared), &argv(&["ls"]), &image()).unwrap();
        assert_eq!(resolved.command, argv(&["ls"]));
        assert!(resolved.entrypoint.is_empty());

        let err = resolve(Some(&cleared), &[], &image()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn nothing_to_run() {
        let bare = ImageMetadata::new("sha256:def", "scratch");
        assert!(matches!(resolve(None, &[], &bare), Err(KeelError::NoCommand)));
    }
}
