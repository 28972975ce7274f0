//! BIDS file and directory naming

use crate::models::ProcessingUnit;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ANAT_DIR: &str = "anat";
pub const FMAP_DIR: &str = "fmap";
pub const FUNC_DIR: &str = "func";

/// dcm2niix echo suffixes → BIDS field-map names, matched in this order
pub const FIELD_MAP_RENAMES: &[(&str, &str)] = &[
    ("e1_1.nii", "magnitude1.nii"),
    ("e1.json", "magnitude1.json"),
    ("e2_1.nii", "magnitude2.nii"),
    ("e2.json", "magnitude2.json"),
    ("e2_ph_1.nii", "phasediff.nii"),
    ("e2_ph.json", "phasediff.json"),
];

/// `<prefix>_run-<index>_T1w`
pub fn anat_stem(unit: &ProcessingUnit, run_index: usize) -> String {
    format!("{}_run-{}_T1w", unit.file_prefix(), run_index)
}

/// `<prefix>_run-<index>`; the converter appends the echo suffix
pub fn fmap_stem(unit: &ProcessingUnit, run_index: usize) -> String {
    format!("{}_run-{}", unit.file_prefix(), run_index)
}

/// `<prefix>_task-<task>_run-<run>_bold`
pub fn func_stem(unit: &ProcessingUnit, task: &str, run: &str) -> String {
    format!("{}_task-{}_run-{}_bold", unit.file_prefix(), task, run)
}

/// `task-<task>_bold.json`
pub fn task_sidecar_name(task: &str) -> String {
    format!("task-{}_bold.json", task)
}

/// New name for a converter-emitted field-map file, if any table entry matches
///
/// Files already carrying a BIDS field-map name are left alone (`magnitude1.json` itself
/// ends in `e1.json`).
pub fn field_map_target_name(file_name: &str) -> Option<String> {
    if FIELD_MAP_RENAMES
        .iter()
        .any(|(_, bids)| file_name.contains(bids.split('.').next().unwrap_or(*bids)))
    {
        return None;
    }
    FIELD_MAP_RENAMES
        .iter()
        .find(|(suffix, _)| file_name.contains(suffix))
        .map(|(suffix, bids)| file_name.replacen(suffix, bids, 1))
}

/// Rename every matching file in `fmap_dir`. Each file is renamed at most once.
///
/// Returns `(old, new)` pairs in the order performed.
pub fn rename_field_maps(fmap_dir: &Path) -> io::Result<Vec<(PathBuf, PathBuf)>> {
    let mut names: Vec<String> = fs::read_dir(fmap_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    let mut renamed = Vec::new();
    for name in names {
        if let Some(target) = field_map_target_name(&name) {
            let from = fmap_dir.join(&name);
            let to = fmap_dir.join(&target);
            fs::rename(&from, &to)?;
            debug!("Renamed {} -> {}", name, target);
            renamed.push((from, to));
        }
    }
    Ok(renamed)
}

/// NIfTI files in `dir` produced for `stem` (`<stem>*.nii` or `<stem>*.nii.gz`), sorted
pub fn nifti_outputs(dir: &Path, stem: &str) -> io::Result<Vec<PathBuf>> {
    let mut found: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .map(|n| n.to_string_lossy())
                .map(|n| n.starts_with(stem) && (n.ends_with(".nii") || n.ends_with(".nii.gz")))
                .unwrap_or(false)
        })
        .collect();
    found.sort();
    Ok(found)
}
