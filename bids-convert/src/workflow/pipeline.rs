//! Top-level conversion run
//!
//! Resolves the configured units, prepares the output root, reconciles the progress ledger
//! and hands the units to the [`SubjectProcessor`].

use crate::config::ConversionConfig;
use crate::models::{ConversionReport, ProcessingUnit, UnitStatus};
use crate::services::{folder_scanner, sidecar};
use crate::workflow::progress_ledger::ProgressLedger;
use crate::workflow::subject_processor::{SubjectProcessor, Toolkit};
use anyhow::{Context, Result};
use std::fs;
use tracing::{info, warn};

/// Progress of one configured unit, as shown by `status`
#[derive(Debug, Clone, PartialEq)]
pub struct UnitProgress {
    pub unit: ProcessingUnit,
    /// `None` when the unit is not in the ledger yet
    pub status: Option<UnitStatus>,
    pub output_present: bool,
}

/// Subjects to process, in order
///
/// Uses the configured list when present, otherwise every directory in the input root whose
/// name contains `sub`. Excluded subjects are removed either way.
pub fn resolve_subjects(config: &ConversionConfig) -> Result<Vec<String>> {
    let candidates = if config.subjects.is_empty() {
        let found = folder_scanner::discover_subjects(&config.input_dir).with_context(|| {
            format!("discovering subjects in {}", config.input_dir.display())
        })?;
        info!("Discovered {} subject folder(s) in input root", found.len());
        found
    } else {
        config.subjects.clone()
    };

    let subjects: Vec<String> = candidates
        .into_iter()
        .filter(|subject| {
            let excluded = config.is_excluded(subject);
            if excluded {
                info!("{}: excluded by configuration", subject);
            }
            !excluded
        })
        .collect();

    Ok(subjects)
}

/// Every (session, subject) pair, sessions in configuration order
pub fn configured_units(config: &ConversionConfig, subjects: &[String]) -> Vec<ProcessingUnit> {
    config
        .session_views()
        .iter()
        .flat_map(|view| {
            subjects.iter().map(move |subject| {
                ProcessingUnit::new(subject.clone(), view.session.map(String::from))
            })
        })
        .collect()
}

/// Run a full conversion
pub fn run_conversion(config: &ConversionConfig, tools: Toolkit<'_>) -> Result<ConversionReport> {
    if !config.input_dir.is_dir() {
        anyhow::bail!("input directory {} does not exist", config.input_dir.display());
    }

    fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("creating output root {}", config.output_dir.display()))?;

    sidecar::write_task_sidecars(&config.output_dir, &config.tasks)
        .context("writing task sidecars")?;

    let subjects = resolve_subjects(config)?;
    let units = configured_units(config, &subjects);
    if units.is_empty() {
        warn!("No units to process");
    }
    info!(
        "{} subject(s), {} session(s), {} unit(s)",
        subjects.len(),
        config.session_views().len(),
        units.len()
    );

    let processor = SubjectProcessor::new(config, tools);

    let report = if config.options.auto_detect_progress {
        let mut ledger = ProgressLedger::load(&config.progress_file());
        let outcome = ledger
            .reconcile(&units, &config.output_dir)
            .context("reconciling progress ledger")?;
        let mut report = processor.run(&outcome.to_process, Some(&mut ledger));
        report.already_done = outcome.already_done;
        report
    } else {
        info!("Progress tracking disabled, processing every unit");
        processor.run(&units, None)
    };

    info!(
        "Run finished: {} completed, {} already done, {} not converted",
        report.completed.len(),
        report.already_done.len(),
        report.failed.len()
    );

    Ok(report)
}

/// Read-only progress overview; neither the ledger nor the output tree is modified
pub fn unit_statuses(config: &ConversionConfig) -> Result<Vec<UnitProgress>> {
    let subjects = resolve_subjects(config)?;
    let ledger = ProgressLedger::load(&config.progress_file());

    Ok(configured_units(config, &subjects)
        .into_iter()
        .map(|unit| UnitProgress {
            status: ledger.status(&unit),
            output_present: unit.dir_under(&config.output_dir).exists(),
            unit,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn config_with(input: &Path, body: &str) -> ConversionConfig {
        let toml = format!(
            "input_dir = {:?}\noutput_dir = {:?}\n{}",
            input.display().to_string(),
            input.join("out").display().to_string(),
            body
        );
        ConversionConfig::from_toml_str(&toml).unwrap()
    }

    #[test]
    fn test_resolve_subjects_from_configuration() {
        let dir = TempDir::new().unwrap();
        let config = config_with(
            dir.path(),
            "subjects = [\"sub-02\", \"sub-01\", \"sub-03\"]\nexclude_subjects = [\"sub-03\"]\n",
        );

        assert_eq!(resolve_subjects(&config).unwrap(), vec!["sub-02", "sub-01"]);
    }

    #[test]
    fn test_resolve_subjects_discovers_sorted_folders() {
        let dir = TempDir::new().unwrap();
        for name in ["sub-02", "sub-01", "sub-03", "notes"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        let config = config_with(dir.path(), "exclude_subjects = [\"sub-03\"]\n");

        assert_eq!(resolve_subjects(&config).unwrap(), vec!["sub-01", "sub-02"]);
    }

    #[test]
    fn test_configured_units_single_session() {
        let dir = TempDir::new().unwrap();
        let config = config_with(dir.path(), "");
        let units = configured_units(&config, &["sub-01".to_string(), "sub-02".to_string()]);

        assert_eq!(
            units,
            vec![ProcessingUnit::single("sub-01"), ProcessingUnit::single("sub-02")]
        );
    }

    #[test]
    fn test_configured_units_follow_session_order() {
        let dir = TempDir::new().unwrap();
        let config = config_with(
            dir.path(),
            "[[sessions]]\nid = \"ses-2\"\n\n[[sessions]]\nid = \"ses-1\"\n",
        );
        let units = configured_units(&config, &["sub-01".to_string(), "sub-02".to_string()]);

        assert_eq!(
            units,
            vec![
                ProcessingUnit::in_session("sub-01", "ses-2"),
                ProcessingUnit::in_session("sub-02", "ses-2"),
                ProcessingUnit::in_session("sub-01", "ses-1"),
                ProcessingUnit::in_session("sub-02", "ses-1"),
            ]
        );
    }

    #[test]
    fn test_unit_statuses_is_read_only() {
        let dir = TempDir::new().unwrap();
        let config = config_with(dir.path(), "subjects = [\"sub-01\"]\n");
        fs::create_dir_all(config.output_dir.join("sub-01")).unwrap();

        let statuses = unit_statuses(&config).unwrap();

        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].status, None);
        assert!(statuses[0].output_present);
        assert!(!config.progress_file().exists());
        assert!(config.output_dir.join("sub-01").exists());
    }
}
