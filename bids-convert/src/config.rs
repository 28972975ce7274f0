//! Conversion configuration
//!
//! Loaded once from TOML at startup and passed by reference into the workflow. Nothing in
//! here changes during a run.
//!
//! Two layouts are supported:
//! - **single-session**: top-level `[runs.*]` and `[subject_runs]`, output goes to
//!   `output_dir/subject/`
//! - **multi-session**: one `[[sessions]]` block per session, each with its own `runs` and
//!   `subject_runs`, output goes to `output_dir/subject/session/`

use crate::models::{RunTypes, SubjectRuns};
use crate::services::folder_classifier::ClassifierPatterns;
use bids_common::config::LoggingConfig;
use bids_common::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Values accepted by dcm2niix `-z`
const VALID_Z_FLAGS: &[&str] = &["y", "o", "i", "n", "3"];

#[derive(Debug, Clone, Deserialize)]
pub struct ConversionConfig {
    /// Root holding `subject[/session]/<source folder>`
    pub input_dir: PathBuf,

    /// BIDS output root
    pub output_dir: PathBuf,

    /// Progress ledger path; defaults to `<output_dir>_progress.json` beside the output root
    #[serde(default)]
    pub progress_file: Option<PathBuf>,

    /// Subjects to process, in order. Empty means discover from `input_dir`.
    #[serde(default)]
    pub subjects: Vec<String>,

    #[serde(default)]
    pub exclude_subjects: Vec<String>,

    /// Single-session run types
    #[serde(default)]
    pub runs: RunTypes,

    /// Single-session subject → run type
    #[serde(default)]
    pub subject_runs: SubjectRuns,

    /// Multi-session plans, processed in the order listed
    #[serde(default)]
    pub sessions: Vec<SessionPlan>,

    #[serde(default)]
    pub tasks: TaskSettings,

    /// Block label appended to conditional task names, per subject
    #[serde(default)]
    pub subject_blocks: BTreeMap<String, String>,

    #[serde(default)]
    pub options: ProcessingOptions,

    #[serde(default)]
    pub tools: ToolPaths,

    #[serde(default)]
    pub classifier: ClassifierPatterns,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Run tables for one session
#[derive(Debug, Clone, Deserialize)]
pub struct SessionPlan {
    pub id: String,
    #[serde(default)]
    pub runs: RunTypes,
    #[serde(default)]
    pub subject_runs: SubjectRuns,
}

/// Borrowed view over either layout
#[derive(Debug, Clone, Copy)]
pub struct SessionView<'a> {
    pub session: Option<&'a str>,
    pub runs: &'a RunTypes,
    pub subject_runs: &'a SubjectRuns,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskSettings {
    /// Every task that gets a `task-<name>_bold.json` sidecar
    #[serde(default)]
    pub task_names_full: Vec<String>,

    /// Tasks whose name gets the subject's block label appended
    #[serde(default)]
    pub task_names_cond: Vec<String>,

    /// Tasks never converted and never given a sidecar
    #[serde(default)]
    pub ignore_tasks: Vec<String>,

    #[serde(default)]
    pub scanner: ScannerInfo,
}

impl TaskSettings {
    pub fn is_ignored(&self, task: &str) -> bool {
        self.ignore_tasks.iter().any(|t| t == task)
    }

    pub fn is_conditional(&self, task: &str) -> bool {
        self.task_names_cond.iter().any(|t| t == task)
    }
}

/// Fixed acquisition metadata written into task sidecars
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ScannerInfo {
    #[serde(default = "default_repetition_time")]
    pub repetition_time: f64,
    #[serde(default = "default_manufacturer")]
    pub manufacturer: String,
    #[serde(default = "default_model_name")]
    pub model_name: String,
    #[serde(default = "default_field_strength")]
    pub field_strength: f64,
}

impl Default for ScannerInfo {
    fn default() -> Self {
        Self {
            repetition_time: default_repetition_time(),
            manufacturer: default_manufacturer(),
            model_name: default_model_name(),
            field_strength: default_field_strength(),
        }
    }
}

fn default_repetition_time() -> f64 {
    2.0
}

fn default_manufacturer() -> String {
    "Siemens".to_string()
}

fn default_model_name() -> String {
    "MAGNETOM Tim Trio".to_string()
}

fn default_field_strength() -> f64 {
    3.0
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ProcessingOptions {
    /// dcm2niix `-z` value
    #[serde(default = "default_z_flag")]
    pub z_flag: String,

    #[serde(default)]
    pub deface_anatomical: bool,

    /// Load, reconcile and persist the progress ledger
    #[serde(default = "default_true")]
    pub auto_detect_progress: bool,

    #[serde(default = "default_true")]
    pub process_field_maps: bool,

    /// Abort the whole run when a unit's input directory is missing
    #[serde(default)]
    pub halt_on_missing_input: bool,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            z_flag: default_z_flag(),
            deface_anatomical: false,
            auto_detect_progress: true,
            process_field_maps: true,
            halt_on_missing_input: false,
        }
    }
}

fn default_z_flag() -> String {
    "3".to_string()
}

fn default_true() -> bool {
    true
}

/// External binaries
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ToolPaths {
    #[serde(default = "default_dcm2niix")]
    pub dcm2niix: PathBuf,
    #[serde(default = "default_pydeface")]
    pub pydeface: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            dcm2niix: default_dcm2niix(),
            pydeface: default_pydeface(),
        }
    }
}

fn default_dcm2niix() -> PathBuf {
    PathBuf::from("dcm2niix")
}

fn default_pydeface() -> PathBuf {
    PathBuf::from("pydeface")
}

/// Command-line configuration overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub input_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub progress_file: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl ConversionConfig {
    /// Read, apply overrides, and validate
    pub fn load(path: &Path, overrides: ConfigOverrides) -> Result<Self> {
        let mut config: ConversionConfig = bids_common::config::load_toml(path)?;
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ConversionConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(input_dir) = overrides.input_dir {
            self.input_dir = input_dir;
        }
        if let Some(output_dir) = overrides.output_dir {
            self.output_dir = output_dir;
        }
        if let Some(progress_file) = overrides.progress_file {
            self.progress_file = Some(progress_file);
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let has_single = !self.runs.is_empty() || !self.subject_runs.is_empty();
        if has_single && !self.sessions.is_empty() {
            return Err(Error::Config(
                "top-level runs/subject_runs cannot be combined with [[sessions]]".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for plan in &self.sessions {
            if plan.id.trim().is_empty() {
                return Err(Error::Config("session id must not be empty".to_string()));
            }
            if !seen.insert(plan.id.as_str()) {
                return Err(Error::Config(format!("duplicate session id '{}'", plan.id)));
            }
        }

        if !VALID_Z_FLAGS.contains(&self.options.z_flag.as_str()) {
            return Err(Error::Config(format!(
                "z_flag '{}' is not one of {:?}",
                self.options.z_flag, VALID_Z_FLAGS
            )));
        }

        if self.input_dir.as_os_str().is_empty() || self.output_dir.as_os_str().is_empty() {
            return Err(Error::Config(
                "input_dir and output_dir must be set".to_string(),
            ));
        }

        Ok(())
    }

    pub fn is_multi_session(&self) -> bool {
        !self.sessions.is_empty()
    }

    /// Sessions in configuration order; a single `None` session for single-session layouts
    pub fn session_views(&self) -> Vec<SessionView<'_>> {
        if self.is_multi_session() {
            self.sessions
                .iter()
                .map(|plan| SessionView {
                    session: Some(plan.id.as_str()),
                    runs: &plan.runs,
                    subject_runs: &plan.subject_runs,
                })
                .collect()
        } else {
            vec![SessionView {
                session: None,
                runs: &self.runs,
                subject_runs: &self.subject_runs,
            }]
        }
    }

    pub fn session_view(&self, session: Option<&str>) -> Option<SessionView<'_>> {
        self.session_views()
            .into_iter()
            .find(|view| view.session == session)
    }

    pub fn progress_file(&self) -> PathBuf {
        if let Some(path) = &self.progress_file {
            return path.clone();
        }
        let name = self
            .output_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        self.output_dir.with_file_name(format!("{}_progress.json", name))
    }

    pub fn is_excluded(&self, subject: &str) -> bool {
        self.exclude_subjects.iter().any(|s| s == subject)
    }
}
