//! # keel-oci
//!
//! OCI (Open Container Initiative) types for keel.
//!
//! This crate provides Rust types for:
//! - OCI Runtime Specification (config.json)
//! - Image execution defaults read during synthesis

#![warn(missing_docs)]

pub mod image;
pub mod runtime;

pub use image::ImageMetadata;
pub use runtime::Spec;
