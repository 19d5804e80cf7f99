//! The staged firmware build pipeline
//!
//! A [`FirmwareBuilder`] drives one firmware build through a strictly
//! sequential state machine: check the shared base image, check the
//! per-(version, target, sub_target) builder image, rebuild whichever is
//! missing, then run the actual firmware build in a container. Every check
//! and build is delegated to a [`ContainerEngine`] backend; every external
//! failure aborts the whole build for this firmware with no retry.

use std::path::{Path, PathBuf, absolute};

use tracing::{debug, info};

use crate::context::prepare_context_dir;
use crate::engine::{ContainerEngine, Mount};
use crate::fetch::{ensure_archive, normalize_base_url};
use crate::manifest::FirmwareSpec;
use crate::{Error, Result};

/// Tag of the shared base image; process-wide constant, one per host
pub const BASE_IMAGE_TAG: &str = "fwc-base";

/// Directory inside the build container where firmware output lands
pub const CONTAINER_RESULT_DIR: &str = "/openwrt/result";

/// Directory inside the build container where included files are mounted
pub const CONTAINER_FILES_DIR: &str = "/openwrt/files";

const ENTRYPOINT_SCRIPT_NAME: &str = "entrypoint.sh";

const ENTRYPOINT_SCRIPT: &str = "#!/bin/bash\nset -e\nexec \"$@\"\n";

const BASE_CONTAINERFILE: &str = r#"FROM fedora:39
RUN dnf -y install \
  @c-development \
  @development-tools \
  @development-libs \
  zlib-static \
  which \
  diffutils \
  python2 \
  wget \
  xz \
  rsync \
  perl-FindBin \
  time && dnf clean all
COPY entrypoint.sh /entrypoint.sh
RUN chmod 755 /entrypoint.sh
ENTRYPOINT ["/entrypoint.sh"]
CMD ["/bin/bash"]
"#;

fn builder_containerfile(archive_file: &str, archive_dir: &str) -> String {
    format!(
        r#"FROM {BASE_IMAGE_TAG}
COPY {ENTRYPOINT_SCRIPT_NAME} /{ENTRYPOINT_SCRIPT_NAME}
RUN chmod 755 /{ENTRYPOINT_SCRIPT_NAME}
RUN groupadd openwrt && useradd -g openwrt openwrt
RUN mkdir /openwrt && chown openwrt:openwrt /openwrt
WORKDIR /openwrt
COPY --chown=openwrt:openwrt {archive_file} .
USER openwrt
RUN tar -xf {archive_file}
WORKDIR /openwrt/{archive_dir}
ENTRYPOINT ["/{ENTRYPOINT_SCRIPT_NAME}"]
CMD ["/bin/bash"]
"#
    )
}

/// Builds one firmware image by driving a container engine through the
/// base-image, builder-image, and firmware stages
pub struct FirmwareBuilder<E> {
    engine: E,
    version: String,
    target: String,
    sub_target: String,
    profile: String,
    extra_name: Option<String>,
    /// Serialized package delta; `None` when the spec had no or an empty delta
    packages: Option<String>,
    base_url: String,
    archive_dir: String,
    archive_file: String,
    builder_image_tag: String,
    base_context_dir: PathBuf,
    builder_context_dir: PathBuf,
}

impl<E: ContainerEngine> FirmwareBuilder<E> {
    /// Create a builder for one firmware spec.
    ///
    /// `work_dir` holds the persistent context-directory cache shared across
    /// pipeline invocations; `base_url` is the release origin the builder
    /// archive is fetched from.
    pub fn new(engine: E, spec: &FirmwareSpec, work_dir: &Path, base_url: &str) -> Self {
        let archive_dir = format!(
            "openwrt-imagebuilder-{}-{}-{}.Linux-x86_64",
            spec.version, spec.target, spec.sub_target
        );
        let archive_file = format!("{archive_dir}.tar.xz");

        Self {
            engine,
            version: spec.version.clone(),
            target: spec.target.clone(),
            sub_target: spec.sub_target.clone(),
            profile: spec.profile.clone(),
            extra_name: spec.extra_name.clone(),
            packages: spec
                .packages
                .as_ref()
                .filter(|delta| !delta.is_empty())
                .map(|delta| delta.as_args_string()),
            base_url: normalize_base_url(base_url),
            builder_image_tag: format!(
                "fwc-{}-{}-{}",
                spec.version, spec.target, spec.sub_target
            ),
            base_context_dir: work_dir.join("base"),
            builder_context_dir: work_dir
                .join(&spec.version)
                .join(&spec.target)
                .join(&spec.sub_target),
            archive_dir,
            archive_file,
        }
    }

    /// Tag of the builder image this pipeline will use; unique per
    /// (version, target, sub_target)
    pub fn builder_image_tag(&self) -> &str {
        &self.builder_image_tag
    }

    /// Run the full pipeline for this firmware.
    ///
    /// `output_dir` receives the built firmware (mounted read-write into the
    /// container); `files_dir`, when given, is mounted read-only and its tree
    /// is embedded in the image.
    pub fn build_firmware(&self, output_dir: &Path, files_dir: Option<&Path>) -> Result<()> {
        if self.engine.image_exists(BASE_IMAGE_TAG)? {
            info!("base image found");
        } else {
            info!("building base image");
            self.prepare_base_context()?;
            let log = self
                .engine
                .build_image(&self.base_context_dir, BASE_IMAGE_TAG)
                .map_err(|e| Error::BaseImageBuild {
                    tag: BASE_IMAGE_TAG.to_string(),
                    message: e.to_string(),
                })?;
            debug!("base image build log:\n{}", log);
        }

        if self.engine.image_exists(&self.builder_image_tag)? {
            info!("builder image found");
        } else {
            info!("building builder image: {}", self.builder_image_tag);
            self.prepare_builder_context()?;
            self.retrieve_builder_archive()?;
            let log = self
                .engine
                .build_image(&self.builder_context_dir, &self.builder_image_tag)
                .map_err(|e| Error::BuilderImageBuild {
                    tag: self.builder_image_tag.clone(),
                    message: e.to_string(),
                })?;
            debug!("builder image build log:\n{}", log);
        }

        let firmware = format!(
            "openwrt-{}-{}-{}-{}",
            self.version, self.target, self.sub_target, self.profile
        );
        info!("building firmware: {}", firmware);

        let mut build_cmd = vec![
            "make".to_string(),
            "image".to_string(),
            format!("PROFILE={}", self.profile),
            format!("BIN_DIR={CONTAINER_RESULT_DIR}"),
        ];

        if let Some(packages) = &self.packages {
            build_cmd.push(format!("PACKAGES={packages}"));
        }

        if files_dir.is_some() {
            build_cmd.push(format!("FILES={CONTAINER_FILES_DIR}"));
        }

        if let Some(name) = &self.extra_name {
            build_cmd.push(format!("EXTRA_IMAGE_NAME={name}"));
        }

        let mut mounts = vec![Mount::read_write(absolute(output_dir)?, CONTAINER_RESULT_DIR)];
        if let Some(files_dir) = files_dir {
            mounts.push(Mount::read_only(absolute(files_dir)?, CONTAINER_FILES_DIR));
        }

        let output = self
            .engine
            .run_container(&self.builder_image_tag, &mounts, &build_cmd)
            .map_err(|e| Error::FirmwareBuild(e.to_string()))?;

        if !output.success() {
            return Err(Error::FirmwareBuild(format!(
                "builder container exited with status {}: {}",
                output.exit_code,
                output.stderr.trim_end()
            )));
        }

        for line in output.stdout.lines() {
            debug!("{}", line);
        }

        Ok(())
    }

    fn prepare_base_context(&self) -> Result<()> {
        prepare_context_dir(
            &self.base_context_dir,
            BASE_CONTAINERFILE,
            &[(ENTRYPOINT_SCRIPT_NAME, ENTRYPOINT_SCRIPT)],
        )
    }

    fn prepare_builder_context(&self) -> Result<()> {
        prepare_context_dir(
            &self.builder_context_dir,
            &builder_containerfile(&self.archive_file, &self.archive_dir),
            &[(ENTRYPOINT_SCRIPT_NAME, ENTRYPOINT_SCRIPT)],
        )
    }

    /// Stage the image-builder archive into the builder context. Skipped
    /// entirely when the archive is already present on disk.
    fn retrieve_builder_archive(&self) -> Result<()> {
        let archive_path = self.builder_context_dir.join(&self.archive_file);
        ensure_archive(
            &archive_path,
            &self.base_url,
            &self.version,
            &self.target,
            &self.sub_target,
            &self.archive_file,
        )
    }
}
