//! Context directory preparation for container image builds

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::{Error, Result};

/// Name of the build recipe file inside every context directory
pub const CONTAINERFILE_NAME: &str = "Containerfile";

/// Prepare a context directory for a container image build.
///
/// Creates `context_dir` (and parents) if absent, then writes the
/// `Containerfile` and each auxiliary file into it. Recipe and auxiliary
/// files are disposable scaffolding and are overwritten unconditionally;
/// the directory itself is only ever created, never recreated.
pub fn prepare_context_dir(
    context_dir: &Path,
    containerfile: &str,
    files: &[(&str, &str)],
) -> Result<()> {
    if context_dir.exists() {
        if !context_dir.is_dir() {
            return Err(Error::ContextCreation {
                path: context_dir.to_path_buf(),
                message: "context exists but is not a directory".to_string(),
            });
        }
    } else {
        info!("creating context directory: {}", context_dir.display());
        fs::create_dir_all(context_dir).map_err(|e| Error::ContextCreation {
            path: context_dir.to_path_buf(),
            message: e.to_string(),
        })?;
    }

    let containerfile_path = context_dir.join(CONTAINERFILE_NAME);
    info!("creating {}", containerfile_path.display());
    debug!("containerfile contents:\n{}", containerfile);
    fs::write(&containerfile_path, containerfile).map_err(|e| Error::ContextCreation {
        path: containerfile_path,
        message: e.to_string(),
    })?;

    for (name, contents) in files {
        let path = context_dir.join(name);
        info!("creating {}", path.display());
        debug!("contents:\n{}", contents);
        fs::write(&path, contents).map_err(|e| Error::ContextCreation {
            path,
            message: e.to_string(),
        })?;
    }

    Ok(())
}
