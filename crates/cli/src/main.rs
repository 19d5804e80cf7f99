use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::{Term, style};
use tracing::info;
use tracing_subscriber::EnvFilter;

use fwc_core::{FirmwareBuilder, FirmwareSpec, Manifest};
use fwc_podman::PodmanEngine;

mod config;

use config::Config;

/// fwc - reproducible firmware image builds in containers
#[derive(Parser)]
#[command(name = "fwc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build all firmwares listed in a manifest
    Build {
        /// Path to the YAML manifest
        manifest: PathBuf,

        /// Configuration file; defaults and FWC_* environment variables are
        /// used when absent
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Validate a manifest without building anything
    Check {
        /// Path to the YAML manifest
        manifest: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; -v raises the default level, RUST_LOG still wins
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .without_time()
        .init();

    match cli.command {
        Commands::Build { manifest, config } => cmd_build(&manifest, config.as_deref()),
        Commands::Check { manifest } => cmd_check(&manifest),
    }
}

fn load_manifest(term: &Term, path: &Path) -> Result<Manifest> {
    let manifest = match Manifest::from_yaml_file(path).and_then(|m| {
        m.validate()?;
        Ok(m)
    }) {
        Ok(manifest) => manifest,
        Err(e) => {
            term.write_line(&format!("{} {}", style("error:").red().bold(), e))?;
            std::process::exit(1);
        }
    };

    Ok(manifest)
}

fn cmd_check(manifest_path: &Path) -> Result<()> {
    let term = Term::stderr();
    let manifest = load_manifest(&term, manifest_path)?;

    for fw in &manifest.firmwares {
        println!(
            "{} {} ({} {}/{}, profile {})",
            style("ok:").green().bold(),
            firmware_name(fw),
            fw.version,
            fw.target,
            fw.sub_target,
            fw.profile,
        );
    }
    println!("{} firmware(s), manifest valid", manifest.firmwares.len());

    Ok(())
}

fn cmd_build(manifest_path: &Path, config_path: Option<&Path>) -> Result<()> {
    let term = Term::stderr();

    let config = Config::load(config_path)?;
    let manifest = load_manifest(&term, manifest_path)?;

    let work_dir = config
        .work_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("fwc"));
    fs::create_dir_all(&work_dir)
        .with_context(|| format!("failed to create work directory {}", work_dir.display()))?;

    // One persistent build directory per invocation; firmware output must
    // survive the process
    let build_dir = tempfile::Builder::new()
        .prefix("build-")
        .tempdir_in(&work_dir)
        .context("failed to create build directory")?
        .keep();
    info!("created build directory: {}", build_dir.display());

    let mut failed = 0usize;

    for fw in &manifest.firmwares {
        term.write_line(&format!(
            "{} Building {}",
            style("::").cyan().bold(),
            firmware_name(fw)
        ))?;

        match build_one(&config, fw, &work_dir, &build_dir) {
            Ok(output_dir) => {
                term.write_line(&format!(
                    "{} Firmware written to {}",
                    style("ok:").green().bold(),
                    output_dir.display()
                ))?;
            }
            Err(e) => {
                term.write_line(&format!(
                    "{} {}: {:#}",
                    style("error:").red().bold(),
                    firmware_name(fw),
                    e
                ))?;
                failed += 1;
            }
        }
    }

    if failed > 0 {
        term.write_line(&format!(
            "{} {failed} of {} firmware build(s) failed",
            style("error:").red().bold(),
            manifest.firmwares.len()
        ))?;
        std::process::exit(1);
    }

    Ok(())
}

/// Build a single firmware: set up its files/output directories, write the
/// included file tree, and run the pipeline
fn build_one(
    config: &Config,
    fw: &FirmwareSpec,
    work_dir: &Path,
    build_dir: &Path,
) -> Result<PathBuf> {
    let fw_dir = build_dir
        .join(&fw.target)
        .join(&fw.sub_target)
        .join(&fw.profile);
    let files_dir = fw_dir.join("files");
    let output_dir = fw_dir.join("firmware");

    for dir in [&files_dir, &output_dir] {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create directory {}", dir.display()))?;
        info!("created directory: {}", dir.display());
    }

    fw.create_file_tree(&files_dir)
        .context("failed to create files for inclusion in firmware")?;

    if config.container_engine != "podman" {
        anyhow::bail!(
            "unsupported container engine: {}",
            config.container_engine
        );
    }

    let mut engine = PodmanEngine::new(&config.podman.program);
    if let Some(connection) = &config.podman.connection {
        engine = engine.with_connection(connection);
    }

    let builder = FirmwareBuilder::new(engine, fw, work_dir, &config.openwrt_base_url);
    let mounted_files = fw.files.is_some().then_some(files_dir.as_path());
    builder
        .build_firmware(&output_dir, mounted_files)
        .map_err(anyhow::Error::from)?;

    Ok(output_dir)
}

fn firmware_name(fw: &FirmwareSpec) -> String {
    let mut name = format!(
        "openwrt-{}-{}-{}-{}",
        fw.version, fw.target, fw.sub_target, fw.profile
    );
    if let Some(extra) = &fw.extra_name {
        name.push('-');
        name.push_str(extra);
    }
    name
}
