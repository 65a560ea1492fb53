//! Common error types for keel.
//!
//! Every [`KeelError`] belongs to exactly one [`ErrorKind`], the taxonomy
//! callers match on when they only care about the class of failure.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`KeelError`].
pub type KeelResult<T> = Result<T, KeelError>;

/// Broad classification of a [`KeelError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed mode, option, or value string.
    InvalidSyntax,
    /// Two options that cannot be used together.
    ConflictingOptions,
    /// A referenced container or a required command is missing.
    NotFound,
    /// A size or number failed to parse.
    InvalidUnit,
    /// The value is well-formed but not allowed.
    PolicyViolation,
    /// Host I/O failure during a probe or file read.
    Io,
    /// Internal consistency fault.
    Internal,
}

/// Errors produced while synthesizing a container configuration.
#[derive(Error, Diagnostic, Debug)]
pub enum KeelError {
    /// A namespace mode string matched no known grammar.
    #[error("--{option} {value:?} is not valid")]
    #[diagnostic(
        code(keel::namespace::invalid_mode),
        help("Use one of: host, private, none, container:<id-or-name>, ns:<path>")
    )]
    InvalidMode {
        /// The flag the mode was given for (pid, ipc, uts, userns, network).
        option: String,
        /// The rejected mode string.
        value: String,
    },

    /// A `--security-opt` entry could not be parsed.
    #[error("invalid --security-opt: {value:?}")]
    #[diagnostic(
        code(keel::security::invalid_opt),
        help("Supported options: no-new-privileges, label=<v>, apparmor=<v>, seccomp=<v>")
    )]
    InvalidSecurityOpt {
        /// The offending token.
        value: String,
    },

    /// A stop signal name or number could not be parsed.
    #[error("invalid signal: {value}")]
    #[diagnostic(code(keel::signal::invalid))]
    InvalidSignal {
        /// The rejected signal string.
        value: String,
    },

    /// Generic malformed input for a named option.
    #[error("invalid value for {option}: {message}")]
    #[diagnostic(code(keel::syntax))]
    InvalidSyntax {
        /// The option whose value was malformed.
        option: String,
        /// What was wrong with it.
        message: String,
    },

    /// Two options that cannot be set together.
    #[error("{first} and {second} cannot be set together")]
    #[diagnostic(code(keel::options::conflict))]
    ConflictingOptions {
        /// The first option.
        first: String,
        /// The second option.
        second: String,
    },

    /// A referenced container does not exist.
    #[error("container {reference:?} not found")]
    #[diagnostic(code(keel::container::not_found))]
    ContainerNotFound {
        /// The reference (ID or name) that could not be resolved.
        reference: String,
    },

    /// Nothing to run after merging image and user command settings.
    #[error("no command specified on command line or as CMD or ENTRYPOINT in this image")]
    #[diagnostic(
        code(keel::command::missing),
        help("Pass a command after the image name or use --entrypoint")
    )]
    NoCommand,

    /// A size or number failed to parse.
    #[error("invalid value for {field}: {value:?}")]
    #[diagnostic(
        code(keel::unit::invalid),
        help("Use sizes like '512m', '1g', '256MiB' or a plain byte count")
    )]
    InvalidUnit {
        /// The field being parsed.
        field: String,
        /// The rejected value.
        value: String,
    },

    /// A well-formed value that is not permitted.
    #[error("{message}")]
    #[diagnostic(code(keel::policy))]
    PolicyViolation {
        /// Description of the violation.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(keel::io))]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    #[diagnostic(code(keel::serialization))]
    Serialization(String),

    /// Internal error (should not happen).
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(keel::internal),
        help("This is a bug, please report it at https://github.com/keel-containers/keel/issues")
    )]
    Internal {
        /// The error message.
        message: String,
    },
}

impl KeelError {
    /// The taxonomy class of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidMode { .. }
            | Self::InvalidSecurityOpt { .. }
            | Self::InvalidSignal { .. }
            | Self::InvalidSyntax { .. } => ErrorKind::InvalidSyntax,
            Self::ConflictingOptions { .. } => ErrorKind::ConflictingOptions,
            Self::ContainerNotFound { .. } | Self::NoCommand => ErrorKind::NotFound,
            Self::InvalidUnit { .. } => ErrorKind::InvalidUnit,
            Self::PolicyViolation { .. } => ErrorKind::PolicyViolation,
            Self::Io(_) | Self::Serialization(_) => ErrorKind::Io,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Shorthand for [`KeelError::InvalidSyntax`].
    pub fn syntax(option: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSyntax {
            option: option.into(),
            message: message.into(),
        }
    }

    /// Shorthand for [`KeelError::InvalidUnit`].
    pub fn unit(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidUnit {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Shorthand for [`KeelError::ConflictingOptions`].
    pub fn conflict(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self::ConflictingOptions {
            first: first.into(),
            second: second.into(),
        }
    }

    /// Shorthand for [`KeelError::PolicyViolation`].
    pub fn policy(message: impl Into<String>) -> Self {
        Self::PolicyViolation {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for KeelError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
