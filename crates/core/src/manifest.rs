//! Manifest types describing the firmwares to build

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// Additive/subtractive package-name list applied to a firmware's default
/// package set
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PackageDelta {
    /// Packages to add, in manifest order
    #[serde(default)]
    pub add: Vec<String>,
    /// Packages to remove, in manifest order
    #[serde(default)]
    pub remove: Vec<String>,
}

impl PackageDelta {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    /// Serialize the delta into the token string expected by the image
    /// builder's `make PACKAGES=<str>` invocation: added packages first,
    /// removed packages prefixed with `-`, all space-joined.
    pub fn as_args_string(&self) -> String {
        let tokens: Vec<String> = self
            .add
            .iter()
            .cloned()
            .chain(self.remove.iter().map(|pkg| format!("-{pkg}")))
            .collect();
        let packages = tokens.join(" ");

        debug!("packages string: {}", packages);

        packages
    }
}

/// A file to place inside the firmware image, with literal contents
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEntry {
    /// Target path within the firmware root, interpreted relative to `/`
    pub path: PathBuf,
    pub contents: String,
}

impl FileEntry {
    /// Write this file under `location`, creating parent directories.
    ///
    /// Unlike context scaffolding, these are user-supplied artifacts: an
    /// existing file at the target path is an error, never overwritten.
    pub fn create_at(&self, location: &Path) -> Result<()> {
        if !location.is_dir() {
            return Err(Error::ConfigCreation(format!(
                "{} does not exist",
                location.display()
            )));
        }

        let relative = self.path.strip_prefix("/").unwrap_or(&self.path);
        let full_path = location.join(relative);

        if full_path.exists() {
            return Err(Error::ConfigCreation(format!(
                "error writing to {}: file already exists",
                full_path.display()
            )));
        }

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigCreation(format!(
                    "failed to create parent directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        fs::write(&full_path, &self.contents)?;
        debug!("file written: {}", full_path.display());

        Ok(())
    }
}

/// One firmware image's full build parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirmwareSpec {
    pub version: String,
    pub target: String,
    pub sub_target: String,
    pub profile: String,
    /// Extra name embedded in the firmware image file name
    #[serde(default, rename = "name")]
    pub extra_name: Option<String>,
    #[serde(default)]
    pub packages: Option<PackageDelta>,
    #[serde(default)]
    pub files: Option<Vec<FileEntry>>,
}

impl FirmwareSpec {
    /// Identity key used for uniqueness checks across a batch. Two specs with
    /// the same key would overwrite each other's firmware.
    pub fn identity(&self) -> (&str, &str, &str, &str, Option<&str>) {
        (
            &self.target,
            &self.sub_target,
            &self.profile,
            &self.version,
            self.extra_name.as_deref(),
        )
    }

    /// Write all of this spec's files as a tree under `location`
    pub fn create_file_tree(&self, location: &Path) -> Result<()> {
        if let Some(files) = &self.files {
            for file in files {
                file.create_at(location)?;
            }
        }
        Ok(())
    }
}

/// A manifest listing the firmwares to build as one batch
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Manifest {
    pub firmwares: Vec<FirmwareSpec>,
}

impl Manifest {
    /// Load a manifest from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Manifest(format!("cannot read {}: {e}", path.display())))?;
        let manifest: Manifest = serde_yaml::from_str(&text)
            .map_err(|e| Error::Manifest(format!("cannot parse {}: {e}", path.display())))?;

        debug!("manifest read: {}", path.display());

        Ok(manifest)
    }

    /// Validate the batch: every (target, sub_target, profile, version,
    /// extra_name) identity must be unique so firmwares do not overwrite each
    /// other. This is a manifest error, not a pipeline error.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        let mut dupes = Vec::new();

        for fw in &self.firmwares {
            if !seen.insert(fw.identity()) {
                dupes.push(format!("{:?}", fw.identity()));
            }
        }

        if !dupes.is_empty() {
            return Err(Error::Manifest(format!(
                "duplicate firmwares specified: {}",
                dupes.join(", ")
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn spec(version: &str, extra_name: Option<&str>) -> FirmwareSpec {
        FirmwareSpec {
            version: version.to_string(),
            target: "x86".to_string(),
            sub_target: "64".to_string(),
            profile: "generic".to_string(),
            extra_name: extra_name.map(String::from),
            packages: None,
            files: None,
        }
    }

    #[test]
    fn test_package_delta_serializes_add_then_remove() {
        let delta = PackageDelta {
            add: vec!["a".to_string(), "b".to_string()],
            remove: vec!["c".to_string()],
        };
        assert_eq!(delta.as_args_string(), "a b -c");
    }

    #[test]
    fn test_package_delta_empty() {
        let delta = PackageDelta::default();
        assert!(delta.is_empty());
        assert_eq!(delta.as_args_string(), "");
    }

    #[test]
    fn test_validate_rejects_duplicate_identity() {
        let manifest = Manifest {
            firmwares: vec![spec("23.05.0", None), spec("23.05.0", None)],
        };
        assert!(matches!(manifest.validate(), Err(Error::Manifest(_))));
    }

    #[test]
    fn test_validate_retains_specs_differing_only_in_extra_name() {
        let manifest = Manifest {
            firmwares: vec![spec("23.05.0", None), spec("23.05.0", Some("office"))],
        };
        manifest.validate().unwrap();
    }

    #[test]
    fn test_manifest_from_yaml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
firmwares:
  - version: "23.05.0"
    target: x86
    sub_target: "64"
    profile: generic
    packages:
      add: [luci]
      remove: [ppp]
    files:
      - path: /etc/hostname
        contents: "router\n"
"#
        )
        .unwrap();

        let manifest = Manifest::from_yaml_file(file.path()).unwrap();
        assert_eq!(manifest.firmwares.len(), 1);

        let fw = &manifest.firmwares[0];
        assert_eq!(fw.extra_name, None);
        assert_eq!(fw.packages.as_ref().unwrap().as_args_string(), "luci -ppp");
        assert_eq!(
            fw.files.as_ref().unwrap()[0].path,
            PathBuf::from("/etc/hostname")
        );
    }

    #[test]
    fn test_manifest_from_yaml_file_rejects_garbage() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "firmwares: [{{target: x86}}]").unwrap();
        assert!(matches!(
            Manifest::from_yaml_file(file.path()),
            Err(Error::Manifest(_))
        ));
    }

    #[test]
    fn test_file_entry_written_relative_to_root() {
        let dir = TempDir::new().unwrap();
        let entry = FileEntry {
            path: PathBuf::from("/etc/config/network"),
            contents: "option x 1\n".to_string(),
        };

        entry.create_at(dir.path()).unwrap();

        let written = dir.path().join("etc/config/network");
        assert_eq!(fs::read_to_string(written).unwrap(), "option x 1\n");
    }

    #[test]
    fn test_file_entry_never_overwrites() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("etc")).unwrap();
        fs::write(dir.path().join("etc/hostname"), "keep").unwrap();

        let entry = FileEntry {
            path: PathBuf::from("/etc/hostname"),
            contents: "clobber".to_string(),
        };

        assert!(matches!(
            entry.create_at(dir.path()),
            Err(Error::ConfigCreation(_))
        ));
        // Pre-existing contents are untouched
        assert_eq!(
            fs::read_to_string(dir.path().join("etc/hostname")).unwrap(),
            "keep"
        );
    }

    #[test]
    fn test_file_entry_requires_existing_location() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let entry = FileEntry {
            path: PathBuf::from("/etc/hostname"),
            contents: "x".to_string(),
        };
        assert!(matches!(
            entry.create_at(&missing),
            Err(Error::ConfigCreation(_))
        ));
    }
}
