//! bids-convert - DICOM to BIDS conversion
//!
//! Converts a tree of DICOM series folders into a BIDS dataset, one participant (or
//! participant/session pair) at a time, and resumes cleanly after an interrupted run.

use anyhow::{Context, Result};
use bids_common::config::{ConfigFileResolver, LoggingConfig};
use bids_convert::config::{ConfigOverrides, ConversionConfig};
use bids_convert::services::{Dcm2niix, Defacer, Pydeface, SubstringClassifier};
use bids_convert::workflow::{self, Toolkit};
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for bids-convert
#[derive(Parser, Debug)]
#[command(name = "bids-convert")]
#[command(about = "Convert DICOM series folders into a BIDS dataset")]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(short, long, env = "BIDS_CONVERT_CONFIG")]
    config: Option<PathBuf>,

    /// Input root (overrides `input_dir`)
    #[arg(short, long)]
    input_dir: Option<PathBuf>,

    /// Output root (overrides `output_dir`)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Progress file (overrides `progress_file`)
    #[arg(short, long)]
    progress_file: Option<PathBuf>,

    /// Log level; `RUST_LOG` takes precedence
    #[arg(long, env = "BIDS_CONVERT_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Convert every unit not yet done (default)
    Convert,
    /// Show per-unit progress without changing anything
    Status,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = ConfigFileResolver::new()
        .resolve(args.config.as_deref())
        .context("No configuration file")?;

    let overrides = ConfigOverrides {
        input_dir: args.input_dir,
        output_dir: args.output_dir,
        progress_file: args.progress_file,
        log_level: args.log_level,
    };
    let config = ConversionConfig::load(&config_path, overrides)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    init_tracing(&config.logging)?;

    info!(
        "Starting bids-convert v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Configuration: {}", config_path.display());
    info!("Input: {}", config.input_dir.display());
    info!("Output: {}", config.output_dir.display());

    match args.command.unwrap_or(Command::Convert) {
        Command::Convert => convert(&config),
        Command::Status => status(&config),
    }
}

fn convert(config: &ConversionConfig) -> Result<()> {
    let converter = Dcm2niix::new(&config.tools.dcm2niix);
    let pydeface = Pydeface::new(&config.tools.pydeface);
    let classifier = SubstringClassifier::new(config.classifier.clone());

    let defacer: Option<&dyn Defacer> = if config.options.deface_anatomical {
        Some(&pydeface)
    } else {
        None
    };

    let tools = Toolkit {
        converter: &converter,
        defacer,
        classifier: &classifier,
    };

    let report = workflow::run_conversion(config, tools)?;
    println!("{}", report.render());

    if report.aborted {
        anyhow::bail!("conversion aborted");
    }
    if report.has_failures() {
        anyhow::bail!("{} unit(s) were not converted", report.failed.len());
    }
    Ok(())
}

fn status(config: &ConversionConfig) -> Result<()> {
    info!("Progress file: {}", config.progress_file().display());

    for entry in workflow::unit_statuses(config)? {
        let status = match entry.status {
            Some(status) => format!("{:?}", status),
            None => "untracked".to_string(),
        };
        let output = if entry.output_present { "present" } else { "absent" };
        println!("{:<24} {:<10} output {}", entry.unit.to_string(), status, output);
    }
    Ok(())
}

/// Stderr logging, or a log file when configured
///
/// `RUST_LOG` overrides the configured level.
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("Invalid log level")?;

    match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}
