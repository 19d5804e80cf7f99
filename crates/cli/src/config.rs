//! Composer configuration: TOML file with environment overrides

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Default origin for image-builder release archives
pub const DEFAULT_BASE_URL: &str = "https://downloads.openwrt.org/";

/// Process-wide composer configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Name of the container engine backend to use
    pub container_engine: String,
    /// Base URL for image-builder archives
    pub openwrt_base_url: String,
    /// Directory for the context cache and build directories
    /// (default: `./fwc` under the current directory)
    pub work_dir: Option<PathBuf>,
    pub podman: PodmanConfig,
}

/// Settings for the podman backend
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PodmanConfig {
    /// The podman executable to invoke
    pub program: String,
    /// Named podman connection for remote engines
    pub connection: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            container_engine: "podman".to_string(),
            openwrt_base_url: DEFAULT_BASE_URL.to_string(),
            work_dir: None,
            podman: PodmanConfig::default(),
        }
    }
}

impl Default for PodmanConfig {
    fn default() -> Self {
        Self {
            program: "podman".to_string(),
            connection: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file if given, otherwise start from
    /// defaults. `FWC_*` environment variables override either source.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("cannot read config file {}", path.display()))?;
                toml::from_str(&text)
                    .with_context(|| format!("cannot parse config file {}", path.display()))?
            }
            None => Config::default(),
        };

        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(value) = env::var("FWC_CONTAINER_ENGINE") {
            self.container_engine = value;
        }
        if let Ok(value) = env::var("FWC_OPENWRT_BASE_URL") {
            self.openwrt_base_url = value;
        }
        if let Ok(value) = env::var("FWC_WORK_DIR") {
            self.work_dir = Some(PathBuf::from(value));
        }
    }
}
