//! Podman backend for the container engine contract
//!
//! Drives the `podman` command line tool. The podman REST bindings are not
//! usable from Rust without pulling in a full HTTP-over-unix-socket stack, and
//! the CLI exposes everything the contract needs, so this backend shells out
//! and parses exit statuses. Remote engines are reachable through podman's
//! own `--connection` mechanism.

use std::path::Path;
use std::process::Command;

use tracing::{debug, info};

use fwc_core::CONTAINERFILE_NAME;
use fwc_core::engine::{ContainerEngine, EngineError, Mount, RunOutput};

/// A container engine backed by the podman CLI
#[derive(Debug, Clone)]
pub struct PodmanEngine {
    program: String,
    connection: Option<String>,
}

impl PodmanEngine {
    /// Create an engine invoking `program` (normally just `podman`)
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            connection: None,
        }
    }

    /// Use a named podman connection (`podman --connection <name>`), for
    /// engines reachable over a remote socket
    pub fn with_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(connection) = &self.connection {
            cmd.args(["--connection", connection]);
        }
        cmd
    }
}

impl Default for PodmanEngine {
    fn default() -> Self {
        Self::new("podman")
    }
}

impl ContainerEngine for PodmanEngine {
    fn image_exists(&self, tag: &str) -> Result<bool, EngineError> {
        let output = self
            .command()
            .args(["image", "exists", tag])
            .output()
            .map_err(|e| EngineError::Transport(format!("failed to run {}: {e}", self.program)))?;

        // `podman image exists` uses exit status 1 for "absent"; anything
        // else non-zero means the engine itself failed
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(EngineError::Transport(format!(
                "podman image exists {tag}: {}",
                String::from_utf8_lossy(&output.stderr).trim_end()
            ))),
        }
    }

    fn build_image(&self, context_dir: &Path, tag: &str) -> Result<String, EngineError> {
        info!("podman build -t {} {}", tag, context_dir.display());

        let output = self
            .command()
            .arg("build")
            .arg("-f")
            .arg(context_dir.join(CONTAINERFILE_NAME))
            .args(["-t", tag])
            .arg(context_dir)
            .output()
            .map_err(|e| EngineError::Transport(format!("failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            return Err(EngineError::Build(
                String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn run_container(
        &self,
        image: &str,
        mounts: &[Mount],
        command: &[String],
    ) -> Result<RunOutput, EngineError> {
        let mut cmd = self.command();
        cmd.args(["run", "--rm"]);
        for mount in mounts {
            cmd.arg("-v").arg(volume_arg(mount));
        }
        cmd.arg(image);
        cmd.args(command);

        debug!("running: {:?}", cmd);

        let output = cmd
            .output()
            .map_err(|e| EngineError::Run(format!("failed to run {}: {e}", self.program)))?;

        Ok(RunOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Format a mount as a podman `-v` argument, with SELinux relabeling
fn volume_arg(mount: &Mount) -> String {
    let options = if mount.read_only { "ro,Z" } else { "Z" };
    format!(
        "{}:{}:{options}",
        mount.host.display(),
        mount.container.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_arg_read_write() {
        let mount = Mount::read_write("/tmp/out", "/openwrt/result");
        assert_eq!(volume_arg(&mount), "/tmp/out:/openwrt/result:Z");
    }

    #[test]
    fn test_volume_arg_read_only() {
        let mount = Mount::read_only("/tmp/files", "/openwrt/files");
        assert_eq!(volume_arg(&mount), "/tmp/files:/openwrt/files:ro,Z");
    }

    #[test]
    fn test_missing_binary_is_transport_error() {
        let engine = PodmanEngine::new("definitely-not-a-container-engine");
        assert!(matches!(
            engine.image_exists("fwc-base"),
            Err(EngineError::Transport(_))
        ));
    }
}
