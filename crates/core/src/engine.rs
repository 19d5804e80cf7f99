//! Container engine contract
//!
//! The pipeline drives a container engine through this narrow trait: one
//! read-only image inspection, one image build, one container run. A concrete
//! backend (see the `fwc-podman` crate) is selected by configuration at
//! process start; the pipeline itself never talks to an engine directly.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors reported by a container engine backend
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine could not be reached or invoked at all
    #[error("container engine unreachable: {0}")]
    Transport(String),

    /// An image build was attempted and failed
    #[error("image build failed: {0}")]
    Build(String),

    /// A container could not be started
    #[error("container run failed: {0}")]
    Run(String),
}

/// A bind mount from the host into a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    /// Absolute path on the host
    pub host: PathBuf,
    /// Mount point inside the container
    pub container: PathBuf,
    /// Mount read-only
    pub read_only: bool,
}

impl Mount {
    /// Create a read-write bind mount
    pub fn read_write(host: impl Into<PathBuf>, container: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
            read_only: false,
        }
    }

    /// Create a read-only bind mount
    pub fn read_only(host: impl Into<PathBuf>, container: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
            read_only: true,
        }
    }
}

/// Output of a finished container run
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    /// Process exit code; non-zero means the containerized command failed
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Contract between the build pipeline and a container engine
pub trait ContainerEngine {
    /// Check whether an image with the given tag is present in the engine's
    /// image store. Read-only; issues no mutation.
    fn image_exists(&self, tag: &str) -> Result<bool, EngineError>;

    /// Build an image from a prepared context directory (containing a
    /// `Containerfile`) and tag it. Returns the build log on success.
    fn build_image(&self, context_dir: &Path, tag: &str) -> Result<String, EngineError>;

    /// Run `command` in a container created from `image` with the given bind
    /// mounts, blocking until it exits. A non-zero exit code is reported via
    /// [`RunOutput`], not as an error; errors are reserved for the engine
    /// itself failing.
    fn run_container(
        &self,
        image: &str,
        mounts: &[Mount],
        command: &[String],
    ) -> Result<RunOutput, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_constructors() {
        let rw = Mount::read_write("/tmp/out", "/openwrt/result");
        assert!(!rw.read_only);
        assert_eq!(rw.container, PathBuf::from("/openwrt/result"));

        let ro = Mount::read_only("/tmp/files", "/openwrt/files");
        assert!(ro.read_only);
    }

    #[test]
    fn test_run_output_success() {
        assert!(RunOutput::default().success());
        assert!(
            !RunOutput {
                exit_code: 2,
                ..Default::default()
            }
            .success()
        );
    }
}
