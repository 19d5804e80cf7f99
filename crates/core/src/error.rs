//! Error types for fwc-core

use std::path::PathBuf;

use thiserror::Error;

use crate::engine::EngineError;

/// Errors that can occur while composing a firmware image
///
/// Every variant is terminal for the current firmware: the pipeline never
/// catches and retries, it unwinds to the caller.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to create context directory '{path}': {message}")]
    ContextCreation { path: PathBuf, message: String },

    #[error("failed to retrieve '{url}': {message}")]
    ArchiveRetrieval { url: String, message: String },

    #[error("base image build failed (tag '{tag}'): {message}")]
    BaseImageBuild { tag: String, message: String },

    #[error("builder image build failed (tag '{tag}'): {message}")]
    BuilderImageBuild { tag: String, message: String },

    #[error("firmware build failed: {0}")]
    FirmwareBuild(String),

    #[error("failed to create config files: {0}")]
    ConfigCreation(String),

    #[error("invalid manifest: {0}")]
    Manifest(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
