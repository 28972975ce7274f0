//! Per-unit conversion
//!
//! Walks the configured units in order and, for each one not already done:
//! 1. resolves its run table (subject → run type → folder → task/run/anatomical slot)
//! 2. converts anatomical folders into `anat/`, optionally defacing the results
//! 3. converts field-map folders pairwise into `fmap/` and renames echo files to BIDS names
//! 4. converts every declared functional folder into `func/`
//! 5. compares declared and present functional folders
//! 6. marks the unit done and persists the ledger
//!
//! Problems are recorded in the [`ConversionReport`] and the loop moves on to the next unit.
//! Only a ledger write failure (or a missing input directory with `halt_on_missing_input`)
//! stops the run early; the report is returned either way.

use crate::config::{ConversionConfig, SessionView};
use crate::models::{
    AnatomicalSlot, ConversionIssue, ConversionReport, IssueKind, IssueSeverity, ProcessingUnit,
    RunTable,
};
use crate::services::bids_naming::{
    self, anat_stem, fmap_stem, func_stem, ANAT_DIR, FMAP_DIR, FUNC_DIR,
};
use crate::services::folder_scanner::{self, ClassifiedFolders};
use crate::services::sidecar;
use crate::services::{ConversionRequest, Defacer, DicomConverter, FolderClassifier};
use crate::workflow::progress_ledger::ProgressLedger;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// External collaborators used while converting
#[derive(Clone, Copy)]
pub struct Toolkit<'a> {
    pub converter: &'a dyn DicomConverter,
    /// Only consulted when `deface_anatomical` is set
    pub defacer: Option<&'a dyn Defacer>,
    pub classifier: &'a dyn FolderClassifier,
}

/// Result of processing one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitOutcome {
    Completed,
    NotConverted,
    Abort,
}

/// One functional run resolved before anything is converted
#[derive(Debug, Clone)]
struct PlannedRun<'a> {
    folder: &'a str,
    task_label: String,
    run: &'a str,
    anat: AnatomicalSlot,
}

pub struct SubjectProcessor<'a> {
    config: &'a ConversionConfig,
    tools: Toolkit<'a>,
}

impl<'a> SubjectProcessor<'a> {
    pub fn new(config: &'a ConversionConfig, tools: Toolkit<'a>) -> Self {
        Self { config, tools }
    }

    /// Process `units` in order
    ///
    /// With a ledger, done units are skipped and each completed unit is persisted before
    /// the next one starts. Without one, every unit is processed.
    ///
    /// A progress file that cannot be written stops the run with a critical issue; the report
    /// collected so far is still returned.
    pub fn run(
        &self,
        units: &[ProcessingUnit],
        mut ledger: Option<&mut ProgressLedger>,
    ) -> ConversionReport {
        let mut report = ConversionReport::default();

        for (position, unit) in units.iter().enumerate() {
            if let Some(ledger) = ledger.as_deref() {
                if ledger.is_done(unit) {
                    report.already_done.push(unit.clone());
                    continue;
                }
            }

            info!("processing participant: {} ({}/{})", unit, position + 1, units.len());

            match self.process_unit(unit, &mut report) {
                UnitOutcome::Completed => {
                    if let Some(ledger) = ledger.as_deref_mut() {
                        ledger.mark_done(unit);
                        if let Err(e) = ledger.persist() {
                            note(
                                &mut report,
                                ConversionIssue::critical(
                                    unit,
                                    IssueKind::LedgerWriteFailed,
                                    format!(
                                        "{}: progress file {} could not be written ({}), stopping",
                                        unit,
                                        ledger.path().display(),
                                        e
                                    ),
                                ),
                            );
                            report.failed.push(unit.clone());
                            report.aborted = true;
                            break;
                        }
                    }
                    info!("{}: conversion complete", unit);
                    report.completed.push(unit.clone());
                }
                UnitOutcome::NotConverted => {
                    report.failed.push(unit.clone());
                }
                UnitOutcome::Abort => {
                    report.failed.push(unit.clone());
                    report.aborted = true;
                    error!("Run aborted at {}", unit);
                    break;
                }
            }
        }

        report
    }

    fn process_unit(&self, unit: &ProcessingUnit, report: &mut ConversionReport) -> UnitOutcome {
        let Some(run_table) = self.resolve_run_table(unit, report) else {
            return UnitOutcome::NotConverted;
        };
        let Some(planned) = self.plan_functional_runs(unit, run_table, report) else {
            return UnitOutcome::NotConverted;
        };

        let input_dir = unit.dir_under(&self.config.input_dir);
        if !input_dir.is_dir() {
            let message = format!(
                "Path {} does not exist for {} in the input folder.",
                input_dir.display(),
                unit.subject
            );
            if self.config.options.halt_on_missing_input {
                note(
                    report,
                    ConversionIssue::critical(unit, IssueKind::MissingInputDirectory, message),
                );
                return UnitOutcome::Abort;
            }
            note(
                report,
                ConversionIssue::skip(unit, IssueKind::MissingInputDirectory, message),
            );
            return UnitOutcome::NotConverted;
        }

        let folders = match folder_scanner::classify_folders(&input_dir, self.tools.classifier) {
            Ok(folders) => folders,
            Err(e) => {
                note(report, ConversionIssue::skip(unit, IssueKind::OutputError, e.to_string()));
                return UnitOutcome::NotConverted;
            }
        };

        let unit_out = unit.dir_under(&self.config.output_dir);

        if !self.convert_anatomical(unit, &folders, &unit_out, report) {
            return UnitOutcome::NotConverted;
        }

        if self.config.options.process_field_maps
            && !self.convert_field_maps(unit, &folders, &unit_out, report)
        {
            return UnitOutcome::NotConverted;
        }

        if !self.convert_functional(unit, &planned, &input_dir, &folders, &unit_out, report) {
            return UnitOutcome::NotConverted;
        }

        check_folder_sets(unit, run_table, &folders, report);

        UnitOutcome::Completed
    }

    fn resolve_run_table(
        &self,
        unit: &ProcessingUnit,
        report: &mut ConversionReport,
    ) -> Option<&'a RunTable> {
        let view: Option<SessionView<'a>> = self.config.session_view(unit.session.as_deref());
        let assigned = view.and_then(|v| v.subject_runs.get(&unit.subject).map(|rt| (v, rt)));

        let Some((view, run_type)) = assigned else {
            note(
                report,
                ConversionIssue::skip(
                    unit,
                    IssueKind::MissingRunAssignment,
                    format!(
                        "{}: does not have a specific subject run assigned! Check the subject_runs table.",
                        unit
                    ),
                ),
            );
            return None;
        };

        match view.runs.get(run_type) {
            Some(table) => Some(table),
            None => {
                note(
                    report,
                    ConversionIssue::skip(
                        unit,
                        IssueKind::UnknownRunType,
                        format!(
                            "{}: run type {} was not found in the runs table",
                            unit.subject, run_type
                        ),
                    ),
                );
                None
            }
        }
    }

    /// Resolve task labels for every non-ignored run; `None` if a block label is missing
    fn plan_functional_runs<'t>(
        &self,
        unit: &ProcessingUnit,
        run_table: &'t RunTable,
        report: &mut ConversionReport,
    ) -> Option<Vec<PlannedRun<'t>>> {
        let tasks = &self.config.tasks;
        let mut planned = Vec::new();

        for (folder, entry) in run_table {
            if tasks.is_ignored(&entry.task) {
                continue;
            }

            let task_label = if tasks.is_conditional(&entry.task) {
                match self.config.subject_blocks.get(&unit.subject) {
                    Some(block) => format!("{}{}", entry.task, block),
                    None => {
                        note(
                            report,
                            ConversionIssue::skip(
                                unit,
                                IssueKind::MissingBlockLabel,
                                format!(
                                    "{}: task {} is conditional but no block label is configured for this subject",
                                    unit.subject, entry.task
                                ),
                            ),
                        );
                        return None;
                    }
                }
            } else {
                entry.task.clone()
            };

            planned.push(PlannedRun {
                folder,
                task_label,
                run: &entry.run,
                anat: entry.anat,
            });
        }

        Some(planned)
    }

    fn convert_anatomical(
        &self,
        unit: &ProcessingUnit,
        folders: &ClassifiedFolders,
        unit_out: &Path,
        report: &mut ConversionReport,
    ) -> bool {
        let Some(anat_dir) = create_output_dir(unit, unit_out, ANAT_DIR, report) else {
            return false;
        };

        for (index, folder) in folders.anatomical.iter().enumerate() {
            let stem = anat_stem(unit, index + 1);
            if !self.convert_one(unit, &folder.path, &anat_dir, &stem, report) {
                return false;
            }

            if self.config.options.deface_anatomical {
                self.deface_outputs(unit, &anat_dir, &stem, report);
            }
        }

        true
    }

    fn deface_outputs(
        &self,
        unit: &ProcessingUnit,
        anat_dir: &Path,
        stem: &str,
        report: &mut ConversionReport,
    ) {
        let Some(defacer) = self.tools.defacer else {
            return;
        };

        let images = match bids_naming::nifti_outputs(anat_dir, stem) {
            Ok(images) => images,
            Err(e) => {
                note(
                    report,
                    ConversionIssue::warning(
                        unit,
                        IssueKind::DefaceFailed,
                        format!("{}: cannot list {} outputs: {}", unit.subject, stem, e),
                    ),
                );
                return;
            }
        };

        for image in images {
            if let Err(e) = defacer.deface(&image) {
                note(
                    report,
                    ConversionIssue::warning(
                        unit,
                        IssueKind::DefaceFailed,
                        format!("{}: defacing {} failed: {}", unit.subject, image.display(), e),
                    ),
                );
            }
        }
    }

    fn convert_field_maps(
        &self,
        unit: &ProcessingUnit,
        folders: &ClassifiedFolders,
        unit_out: &Path,
        report: &mut ConversionReport,
    ) -> bool {
        if folders.field_maps.is_empty() {
            return true;
        }
        if folders.field_maps.len() % 2 != 0 {
            warn!(
                "{}: odd number of field-map folders ({}), the last one has no partner",
                unit,
                folders.field_maps.len()
            );
        }

        let Some(fmap_dir) = create_output_dir(unit, unit_out, FMAP_DIR, report) else {
            return false;
        };

        for (index, pair) in folders.field_maps.chunks(2).enumerate() {
            let stem = fmap_stem(unit, index + 1);
            for folder in pair {
                if !self.convert_one(unit, &folder.path, &fmap_dir, &stem, report) {
                    return false;
                }
            }
        }

        match bids_naming::rename_field_maps(&fmap_dir) {
            Ok(renamed) => {
                info!("{}: renamed {} field-map files", unit, renamed.len());
                true
            }
            Err(e) => {
                note(
                    report,
                    ConversionIssue::skip(
                        unit,
                        IssueKind::OutputError,
                        format!("{}: renaming field maps failed: {}", unit.subject, e),
                    ),
                );
                false
            }
        }
    }

    fn convert_functional(
        &self,
        unit: &ProcessingUnit,
        planned: &[PlannedRun<'_>],
        input_dir: &Path,
        folders: &ClassifiedFolders,
        unit_out: &Path,
        report: &mut ConversionReport,
    ) -> bool {
        let Some(func_dir) = create_output_dir(unit, unit_out, FUNC_DIR, report) else {
            return false;
        };

        for run in planned {
            let source = input_dir.join(run.folder);
            if !source.is_dir() {
                // Reported by the folder-set check
                continue;
            }

            let stem = func_stem(unit, &run.task_label, run.run);
            if !self.convert_one(unit, &source, &func_dir, &stem, report) {
                return false;
            }

            let sidecar_path = func_dir.join(format!("{}.json", stem));
            if let Err(e) = sidecar::insert_field(&sidecar_path, "TaskName", &run.task_label) {
                note(
                    report,
                    ConversionIssue::warning(
                        unit,
                        IssueKind::SidecarMissing,
                        format!(
                            "{}: TaskName not added to {}: {}",
                            unit.subject,
                            sidecar_path.display(),
                            e
                        ),
                    ),
                );
            }

            if run.anat != AnatomicalSlot::FirstAnat {
                let anat_name = folders
                    .anatomical
                    .get(run.anat.index())
                    .map(|f| f.name.clone())
                    .unwrap_or_else(|| {
                        format!(
                            "(none: only {} anatomical folder(s) found)",
                            folders.anatomical.len()
                        )
                    });
                note(
                    report,
                    ConversionIssue::warning(
                        unit,
                        IssueKind::SecondAnatomicalSlot,
                        format!(
                            "{}: Anatomical image {} will be used for {}",
                            unit.subject, anat_name, run.folder
                        ),
                    ),
                );
            }
        }

        true
    }

    fn convert_one(
        &self,
        unit: &ProcessingUnit,
        source: &Path,
        output_dir: &Path,
        stem: &str,
        report: &mut ConversionReport,
    ) -> bool {
        let request = ConversionRequest {
            source,
            output_dir,
            file_stem: stem,
            z_flag: &self.config.options.z_flag,
        };

        match self.tools.converter.convert(&request) {
            Ok(()) => true,
            Err(e) => {
                note(
                    report,
                    ConversionIssue::skip(
                        unit,
                        IssueKind::ConverterFailed,
                        format!(
                            "{}: converting {} to {} failed: {}",
                            unit.subject,
                            source.display(),
                            stem,
                            e
                        ),
                    ),
                );
                false
            }
        }
    }
}

/// Warn when declared and present functional folders differ
fn check_folder_sets(
    unit: &ProcessingUnit,
    run_table: &RunTable,
    folders: &ClassifiedFolders,
    report: &mut ConversionReport,
) {
    let declared: BTreeSet<&str> = run_table.keys().map(String::as_str).collect();
    let present: BTreeSet<&str> = folders.functional_names().collect();
    let difference: Vec<&str> = declared.symmetric_difference(&present).copied().collect();

    if !difference.is_empty() {
        note(
            report,
            ConversionIssue::warning(
                unit,
                IssueKind::FolderSetMismatch,
                format!(
                    "{}: {{{}}} was not paired with a corresponding functional image folder in the directory or in the run table.",
                    unit.subject,
                    difference.join(", ")
                ),
            ),
        );
    }
}

fn create_output_dir(
    unit: &ProcessingUnit,
    unit_out: &Path,
    name: &str,
    report: &mut ConversionReport,
) -> Option<PathBuf> {
    let dir = unit_out.join(name);
    match fs::create_dir_all(&dir) {
        Ok(()) => Some(dir),
        Err(e) => {
            note(
                report,
                ConversionIssue::skip(
                    unit,
                    IssueKind::OutputError,
                    format!("{}: cannot create {}: {}", unit.subject, dir.display(), e),
                ),
            );
            None
        }
    }
}

/// Log an issue at its severity and record it
fn note(report: &mut ConversionReport, issue: ConversionIssue) {
    match issue.severity {
        IssueSeverity::Warning => warn!("{}", issue.message),
        IssueSeverity::Skip | IssueSeverity::Critical => error!("{}", issue.message),
    }
    report.record(issue);
}
