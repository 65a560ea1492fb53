//! # keel-common
//!
//! Shared utilities and types for keel.
//!
//! This crate provides the leaf-level building blocks used by the
//! configuration resolvers:
//! - The error taxonomy
//! - Size, signal, ID-mapping and sysctl parsers
//! - Container name validation
//! - Host paths probed during synthesis

#![warn(missing_docs)]

pub mod error;
pub mod idmap;
pub mod name;
pub mod paths;
pub mod signal;
pub mod sysctl;
pub mod units;

pub use error::{ErrorKind, KeelError, KeelResult};
pub use idmap::{IdMap, IdMappings};
pub use name::ContainerName;
pub use paths::KeelPaths;
pub use signal::Signal;
