//! # Keel
//!
//! Keel turns container create requests into a validated configuration and
//! projects it onto an OCI runtime spec plus the engine's construction
//! options.
//!
//! ## Features
//!
//! - **Namespace modes**: private, host, container-shared and path-joined namespaces
//! - **Security**: SELinux labels, seccomp and AppArmor profiles, capabilities
//! - **Resources**: memory, CPU, block I/O and PIDs limits checked against kernel support
//! - **Networking**: port bindings, DNS and host-table entries
//! - **Determinism**: identical inputs serialize to identical artifacts
//!
//! ## Usage
//!
//! ```no_run
//! use keel::config::{EngineConfig, Synthesizer};
//! use keel::lookup::ContainerRegistry;
//! use keel::options::CreateOptions;
//! use keel::projection::project;
//! use keel_oci::ImageMetadata;
//!
//! # fn example() -> keel_common::KeelResult<()> {
//! let engine = EngineConfig::detect();
//! let registry = ContainerRegistry::new();
//! let image = ImageMetadata::new("sha256:abc", "busybox").with_cmd(["sh"]);
//!
//! let synthesis = Synthesizer::new(&engine, &registry)
//!     .synthesize(&CreateOptions::default(), &image)?;
//! let projection = project(&synthesis.config);
//! let artifact = synthesis.config.to_artifact()?;
//! # let _ = (projection, artifact);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod cli;
pub mod command;
pub mod config;
pub mod devices;
pub mod environment;
pub mod lookup;
pub mod namespace;
pub mod network;
pub mod options;
pub mod projection;
pub mod resources;
pub mod security;
pub mod storage;

pub use config::{CreateConfig, EngineConfig, Synthesis, Synthesizer};
pub use lookup::{ContainerLookup, ContainerRegistry, PeerContainer};
pub use options::CreateOptions;
pub use projection::{CreateOption, Projection, project};
