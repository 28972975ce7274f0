//! JSON sidecars: dataset-level task descriptions and per-run field insertion

use crate::config::TaskSettings;
use crate::services::bids_naming::task_sidecar_name;
use bids_common::json_io::{read_json, write_json_atomic};
use bids_common::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Content of `task-<name>_bold.json`
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct TaskSidecar {
    pub repetition_time: f64,
    pub task_name: String,
    pub manufacturer: String,
    pub manufacturers_model_name: String,
    pub magnetic_field_strength: f64,
}

impl TaskSidecar {
    pub fn for_task(task: &str, settings: &TaskSettings) -> Self {
        let scanner = &settings.scanner;
        Self {
            repetition_time: scanner.repetition_time,
            task_name: task.to_string(),
            manufacturer: scanner.manufacturer.clone(),
            manufacturers_model_name: scanner.model_name.clone(),
            magnetic_field_strength: scanner.field_strength,
        }
    }
}

/// Write one sidecar per non-ignored task into `output_root`
pub fn write_task_sidecars(output_root: &Path, settings: &TaskSettings) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for task in &settings.task_names_full {
        if settings.is_ignored(task) {
            continue;
        }
        let path = output_root.join(task_sidecar_name(task));
        write_json_atomic(&path, &TaskSidecar::for_task(task, settings))?;
        written.push(path);
    }
    if !written.is_empty() {
        info!("Wrote {} task sidecar(s) to {}", written.len(), output_root.display());
    }
    Ok(written)
}

/// Set `field` to `value` in the JSON object stored at `path`
///
/// The file must already exist; it is read once, updated and rewritten.
pub fn insert_field(path: &Path, field: &str, value: &str) -> Result<()> {
    if !path.exists() {
        return Err(Error::NotFound(path.display().to_string()));
    }

    let mut document: serde_json::Value = read_json(path)?;
    let object = document.as_object_mut().ok_or_else(|| {
        Error::InvalidInput(format!("{} is not a JSON object", path.display()))
    })?;
    object.insert(field.to_string(), serde_json::Value::String(value.to_string()));

    write_json_atomic(path, &document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScannerInfo;
    use tempfile::TempDir;

    fn settings() -> TaskSettings {
        TaskSettings {
            task_names_full: vec!["sometask".into(), "someothertask".into(), "skipme".into()],
            task_names_cond: Vec::new(),
            ignore_tasks: vec!["skipme".into()],
            scanner: ScannerInfo::default(),
        }
    }

    #[test]
    fn test_task_sidecars_skip_ignored_tasks() {
        let dir = TempDir::new().unwrap();
        let written = write_task_sidecars(dir.path(), &settings()).unwrap();

        assert_eq!(written.len(), 2);
        assert!(dir.path().join("task-sometask_bold.json").exists());
        assert!(!dir.path().join("task-skipme_bold.json").exists());
    }

    #[test]
    fn test_task_sidecar_schema() {
        let dir = TempDir::new().unwrap();
        write_task_sidecars(dir.path(), &settings()).unwrap();

        let value: serde_json::Value =
            read_json(&dir.path().join("task-someothertask_bold.json")).unwrap();
        assert_eq!(value["TaskName"], "someothertask");
        assert_eq!(value["RepetitionTime"], 2.0);
        assert_eq!(value["Manufacturer"], "Siemens");
        assert_eq!(value["ManufacturersModelName"], "MAGNETOM Tim Trio");
        assert_eq!(value["MagneticFieldStrength"], 3.0);
    }

    #[test]
    fn test_insert_field_keeps_existing_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, r#"{"EchoTime": 0.03}"#).unwrap();

        insert_field(&path, "TaskName", "rest").unwrap();

        let value: serde_json::Value = read_json(&path).unwrap();
        assert_eq!(value["TaskName"], "rest");
        assert_eq!(value["EchoTime"], 0.03);
    }

    #[test]
    fn test_insert_field_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = insert_field(&dir.path().join("absent.json"), "TaskName", "rest");
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_insert_field_rejects_non_object() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("list.json");
        std::fs::write(&path, "[1, 2]").unwrap();

        let result = insert_field(&path, "TaskName", "rest");
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
