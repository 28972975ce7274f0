//! External conversion tools
//!
//! DICOM → NIfTI conversion goes through `dcm2niix`, defacing through `pydeface`. Both are
//! run to completion synchronously and their exit status is checked.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use thiserror::Error;
use tracing::debug;

/// External tool errors
#[derive(Debug, Error)]
pub enum ToolError {
    /// Binary not found in PATH (or at the configured path)
    #[error("{0} not found")]
    BinaryNotFound(String),

    /// Process could not be started
    #[error("Failed to execute {tool}: {message}")]
    ExecutionError { tool: String, message: String },

    /// Process exited with a non-zero status
    #[error("{tool} exited with {status}: {stderr}")]
    NonZeroExit {
        tool: String,
        status: String,
        stderr: String,
    },
}

/// Inputs for one converter invocation
#[derive(Debug, Clone, Copy)]
pub struct ConversionRequest<'a> {
    /// DICOM series folder
    pub source: &'a Path,
    /// Destination directory (created beforehand)
    pub output_dir: &'a Path,
    /// Output base file name, without extension
    pub file_stem: &'a str,
    /// dcm2niix `-z` value
    pub z_flag: &'a str,
}

pub trait DicomConverter {
    fn convert(&self, request: &ConversionRequest<'_>) -> Result<(), ToolError>;
}

pub trait Defacer {
    /// Deface `image` in place
    fn deface(&self, image: &Path) -> Result<(), ToolError>;
}

/// `dcm2niix -z <flag> -o <out> -f <stem> <source>`
#[derive(Debug, Clone)]
pub struct Dcm2niix {
    binary: PathBuf,
}

impl Dcm2niix {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl DicomConverter for Dcm2niix {
    fn convert(&self, request: &ConversionRequest<'_>) -> Result<(), ToolError> {
        let args: [&OsStr; 7] = [
            OsStr::new("-z"),
            OsStr::new(request.z_flag),
            OsStr::new("-o"),
            request.output_dir.as_os_str(),
            OsStr::new("-f"),
            OsStr::new(request.file_stem),
            request.source.as_os_str(),
        ];
        run_tool(&self.binary, &args).map(|_| ())
    }
}

/// `pydeface --outfile <image> --force <image>`
#[derive(Debug, Clone)]
pub struct Pydeface {
    binary: PathBuf,
}

impl Pydeface {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Defacer for Pydeface {
    fn deface(&self, image: &Path) -> Result<(), ToolError> {
        let args: [&OsStr; 4] = [
            OsStr::new("--outfile"),
            image.as_os_str(),
            OsStr::new("--force"),
            image.as_os_str(),
        ];
        run_tool(&self.binary, &args).map(|_| ())
    }
}

/// Run `binary args...` to completion, failing on spawn errors and non-zero exits
pub fn run_tool(binary: &Path, args: &[&OsStr]) -> Result<Output, ToolError> {
    let tool = binary.display().to_string();
    debug!(
        tool = %tool,
        args = ?args,
        "Running external tool"
    );

    let output = match Command::new(binary).args(args).output() {
        Ok(output) => output,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ToolError::BinaryNotFound(tool));
        }
        Err(e) => {
            return Err(ToolError::ExecutionError {
                tool,
                message: e.to_string(),
            })
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stderr = if stderr.is_empty() {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        } else {
            stderr
        };
        return Err(ToolError::NonZeroExit {
            tool,
            status: output.status.to_string(),
            stderr,
        });
    }

    Ok(output)
}
