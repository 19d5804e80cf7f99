//! fwc-core: firmware composition pipeline
//!
//! This crate builds reproducible router firmware images by driving a
//! containerized image-builder toolchain: context preparation, idempotent
//! archive retrieval, two-tier image caching, and the firmware build itself,
//! plus materialization of rendered router configuration.

mod context;
mod error;
mod fetch;
mod manifest;
mod pipeline;

pub mod engine;
pub mod uci;

pub use context::{CONTAINERFILE_NAME, prepare_context_dir};
pub use error::Error;
pub use fetch::ensure_archive;
pub use manifest::{FileEntry, FirmwareSpec, Manifest, PackageDelta};
pub use pipeline::{
    BASE_IMAGE_TAG, CONTAINER_FILES_DIR, CONTAINER_RESULT_DIR, FirmwareBuilder,
};

/// Result type for core operations
pub type Result<T, E = Error> = std::result::Result<T, E>;
