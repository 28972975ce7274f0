//! In-process stand-ins for dcm2niix and pydeface
//!
//! The fake converter writes the files dcm2niix would produce for a request:
//! - `anat/` and `func/`: `<stem>.nii` plus a `<stem>.json` sidecar
//! - `fmap/`: the magnitude echoes for the first folder of a pair, the phase-difference echo
//!   for the second

use bids_convert::services::{ConversionRequest, Defacer, DicomConverter, ToolError};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One recorded converter call
#[derive(Debug, Clone, PartialEq)]
pub struct ConverterCall {
    pub source: PathBuf,
    pub output_dir: PathBuf,
    pub stem: String,
}

#[derive(Default)]
pub struct FakeConverter {
    calls: Mutex<Vec<ConverterCall>>,
    fmap_calls: Mutex<HashMap<String, usize>>,
    fail_on: Option<String>,
    panic_on: Option<String>,
    no_sidecar_for: Option<String>,
}

impl FakeConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with a non-zero exit for sources whose path contains `pattern`
    pub fn failing_on(mut self, pattern: &str) -> Self {
        self.fail_on = Some(pattern.to_string());
        self
    }

    /// Panic mid-conversion for sources whose path contains `pattern`
    pub fn panicking_on(mut self, pattern: &str) -> Self {
        self.panic_on = Some(pattern.to_string());
        self
    }

    /// Skip writing the JSON sidecar for sources whose path contains `pattern`
    pub fn without_sidecar_for(mut self, pattern: &str) -> Self {
        self.no_sidecar_for = Some(pattern.to_string());
        self
    }

    pub fn calls(&self) -> Vec<ConverterCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn stems(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.stem).collect()
    }

    /// Calls whose source lies under `fragment` (e.g. `sub-01/ses-1`)
    pub fn calls_under(&self, fragment: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.source.to_string_lossy().contains(fragment))
            .count()
    }

    fn write_outputs(&self, request: &ConversionRequest<'_>) {
        let dir = request.output_dir;
        let stem = request.file_stem;
        let source = request.source.to_string_lossy();

        if dir.ends_with("fmap") {
            let mut counts = self.fmap_calls.lock().unwrap();
            let count = counts.entry(stem.to_string()).or_insert(0);
            *count += 1;
            let suffixes: &[&str] = if *count == 1 {
                &["_e1_1.nii", "_e1.json", "_e2_1.nii", "_e2.json"]
            } else {
                &["_e2_ph_1.nii", "_e2_ph.json"]
            };
            for suffix in suffixes {
                write(dir, &format!("{}{}", stem, suffix));
            }
            return;
        }

        write(dir, &format!("{}.nii", stem));
        let skip_sidecar = self
            .no_sidecar_for
            .as_deref()
            .map(|p| source.contains(p))
            .unwrap_or(false);
        if !skip_sidecar {
            fs::write(
                dir.join(format!("{}.json", stem)),
                r#"{"ConversionSoftware": "dcm2niix"}"#,
            )
            .unwrap();
        }
    }
}

impl DicomConverter for FakeConverter {
    fn convert(&self, request: &ConversionRequest<'_>) -> Result<(), ToolError> {
        self.calls.lock().unwrap().push(ConverterCall {
            source: request.source.to_path_buf(),
            output_dir: request.output_dir.to_path_buf(),
            stem: request.file_stem.to_string(),
        });

        let source = request.source.to_string_lossy().into_owned();
        if self.fail_on.as_deref().map(|p| source.contains(p)).unwrap_or(false) {
            return Err(ToolError::NonZeroExit {
                tool: "dcm2niix".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "corrupt DICOM".to_string(),
            });
        }

        if self.panic_on.as_deref().map(|p| source.contains(p)).unwrap_or(false) {
            // Leave partial output behind before dying, like a killed process would
            write(request.output_dir, &format!("{}.nii", request.file_stem));
            panic!("converter killed while converting {}", source);
        }

        self.write_outputs(request);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeDefacer {
    images: Mutex<Vec<PathBuf>>,
    fail: bool,
}

impl FakeDefacer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn images(&self) -> Vec<PathBuf> {
        self.images.lock().unwrap().clone()
    }
}

impl Defacer for FakeDefacer {
    fn deface(&self, image: &Path) -> Result<(), ToolError> {
        self.images.lock().unwrap().push(image.to_path_buf());
        if self.fail {
            return Err(ToolError::BinaryNotFound("pydeface".to_string()));
        }
        Ok(())
    }
}

fn write(dir: &Path, name: &str) {
    fs::write(dir.join(name), b"nifti").unwrap();
}
