//! Temporary input/output trees and configurations

use bids_convert::config::ConversionConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Two subjects, one run type with two functional runs
pub const STANDARD_CONFIG: &str = r#"
subjects = ["sub-01", "sub-02"]

[tasks]
task_names_full = ["rest", "nback"]

[runs.standard]
MOCOSERIES_0004 = { task = "rest", run = "01" }
MOCOSERIES_0006 = { task = "nback", run = "01" }

[subject_runs]
sub-01 = "standard"
sub-02 = "standard"
"#;

/// Raw input under `raw/`, BIDS output under `bids/`
pub struct Dataset {
    root: TempDir,
}

impl Dataset {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("raw")).unwrap();
        Self { root }
    }

    pub fn input(&self) -> PathBuf {
        self.root.path().join("raw")
    }

    pub fn output(&self) -> PathBuf {
        self.root.path().join("bids")
    }

    pub fn progress_file(&self) -> PathBuf {
        self.root.path().join("bids_progress.json")
    }

    /// Create DICOM series folders under `raw/<unit_path>/`
    pub fn add_series(&self, unit_path: &str, folders: &[&str]) -> &Self {
        for folder in folders {
            let dir = self.input().join(unit_path).join(folder);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("IM_0001.dcm"), b"DICM").unwrap();
        }
        self
    }

    /// Anatomical, field-map pair and both standard functional folders
    pub fn add_standard_subject(&self, unit_path: &str) -> &Self {
        self.add_series(
            unit_path,
            &[
                "T1_MPR_0002",
                "FIELD_MAP_0008",
                "FIELD_MAP_0009",
                "MOCOSERIES_0004",
                "MOCOSERIES_0006",
            ],
        )
    }

    /// Parse `body` with this dataset's input and output roots prepended
    pub fn config(&self, body: &str) -> ConversionConfig {
        let content = format!(
            "input_dir = {}\noutput_dir = {}\n{}",
            toml_path(&self.input()),
            toml_path(&self.output()),
            body
        );
        ConversionConfig::from_toml_str(&content).unwrap()
    }

    pub fn output_file(&self, relative: &str) -> PathBuf {
        self.output().join(relative)
    }

    pub fn read_progress(&self) -> serde_json::Value {
        let text = fs::read_to_string(self.progress_file()).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    pub fn write_progress(&self, value: serde_json::Value) {
        fs::write(self.progress_file(), value.to_string()).unwrap();
    }
}

fn toml_path(path: &Path) -> String {
    format!("'{}'", path.display())
}
