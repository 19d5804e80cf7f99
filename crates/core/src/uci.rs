//! Materialization of rendered router configuration
//!
//! The configuration renderer (an external collaborator behind the
//! [`ConfigRenderer`] trait) produces one UCI text blob with back-to-back
//! per-package sections. This module splits that blob along package
//! boundaries into discrete files under `etc/config/`, and packs them into a
//! sysupgrade archive for in-place firmware upgrades.

use std::fs::{self, File};
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::{debug, info};

use crate::{Error, Result};

/// Where UCI package files live relative to the firmware root
pub const CONFIG_SUBPATH: &str = "etc/config";

/// Boundary token the renderer emits before each package section
const PACKAGE_BOUNDARY: &str = "package ";

/// Error reported by a configuration renderer backend
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct RenderError(pub String);

/// Contract between the materializer and the configuration renderer
pub trait ConfigRenderer {
    /// Render a declarative configuration tree into one UCI text blob
    fn render(&self, config: &serde_json::Value) -> Result<String, RenderError>;

    /// Validate the configuration tree against the renderer's schema
    fn validate(&self, config: &serde_json::Value) -> Result<(), RenderError>;
}

/// Split a rendered blob into (package name, body) sections.
///
/// Each section starts with the package name on its first line, followed by
/// one blank separator line, followed by the body. An empty leading segment
/// before the first boundary is discarded.
pub fn split_packages(rendered: &str) -> Vec<(String, String)> {
    rendered
        .split(PACKAGE_BOUNDARY)
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let lines: Vec<&str> = segment.split('\n').collect();
            let name = lines[0].to_string();
            let body = if lines.len() > 2 {
                lines[2..].join("\n")
            } else {
                String::new()
            };
            (name, body)
        })
        .collect()
}

/// Materialize a rendered configuration blob as discrete package files under
/// `<files_dir>/etc/config/`.
///
/// These are user-visible generated artifacts, not scaffolding: an existing
/// target file is an error and is left untouched.
pub fn materialize(rendered: &str, files_dir: &Path) -> Result<()> {
    if !files_dir.is_dir() {
        return Err(Error::ConfigCreation(format!(
            "{} does not exist",
            files_dir.display()
        )));
    }

    let config_dir = files_dir.join(CONFIG_SUBPATH);
    fs::create_dir_all(&config_dir).map_err(|e| {
        Error::ConfigCreation(format!(
            "failed to create parent directory {}: {e}",
            config_dir.display()
        ))
    })?;

    for (name, body) in split_packages(rendered) {
        let path = config_dir.join(&name);

        if path.exists() {
            return Err(Error::ConfigCreation(format!(
                "error writing to {}: file already exists",
                path.display()
            )));
        }

        fs::write(&path, &body)?;
        info!("file written: {}", path.display());
        debug!("{}", body);
    }

    Ok(())
}

/// Validate, render, and pack a configuration as a sysupgrade archive at
/// `<archive_dir>/<base_name>.tar.gz`.
///
/// Validation runs first; a schema violation surfaces as a config-creation
/// error, never silently coerced.
pub fn materialize_upgrade_archive(
    renderer: &dyn ConfigRenderer,
    config: &serde_json::Value,
    base_name: &str,
    archive_dir: &Path,
) -> Result<()> {
    if !archive_dir.is_dir() {
        return Err(Error::ConfigCreation(format!(
            "{} does not exist",
            archive_dir.display()
        )));
    }

    renderer
        .validate(config)
        .map_err(|e| Error::ConfigCreation(format!("configuration failed validation: {e}")))?;

    let rendered = renderer
        .render(config)
        .map_err(|e| Error::ConfigCreation(format!("rendering failed: {e}")))?;

    let archive_path = archive_dir.join(format!("{base_name}.tar.gz"));
    if archive_path.exists() {
        return Err(Error::ConfigCreation(format!(
            "error writing to {}: file already exists",
            archive_path.display()
        )));
    }

    let encoder = GzEncoder::new(File::create(&archive_path)?, Compression::default());
    let mut archive = tar::Builder::new(encoder);

    for (name, body) in split_packages(&rendered) {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        archive.append_data(
            &mut header,
            format!("{CONFIG_SUBPATH}/{name}"),
            body.as_bytes(),
        )?;
    }

    archive
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .map_err(Error::Io)?;

    info!("sysupgrade archive written: {}", archive_path.display());

    Ok(())
}
