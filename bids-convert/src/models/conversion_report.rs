//! Conversion issues and the end-of-run report
//!
//! Issues are collected in the order they happen and printed together once the run ends.

use crate::models::ProcessingUnit;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Issue severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IssueSeverity {
    /// Output still produced, needs manual review
    Warning,
    /// Unit (or one of its runs) was not converted, the run continues
    Skip,
    /// The run was aborted
    Critical,
}

/// What went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueKind {
    /// Subject has no run-type assigned
    MissingRunAssignment,
    /// Assigned run-type is not registered
    UnknownRunType,
    /// Input subject/session directory absent
    MissingInputDirectory,
    /// Conditional task without a block label for the subject
    MissingBlockLabel,
    /// Functional run paired with the second anatomical acquisition
    SecondAnatomicalSlot,
    /// Declared and present functional folders differ
    FolderSetMismatch,
    /// Converter failed to run or exited non-zero
    ConverterFailed,
    /// Defacer failed to run or exited non-zero
    DefaceFailed,
    /// Converter did not emit the expected JSON sidecar
    SidecarMissing,
    /// Filesystem error while preparing or renaming outputs
    OutputError,
    /// Progress file could not be written after a unit completed
    LedgerWriteFailed,
}

/// A single recorded issue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionIssue {
    /// Unit label (`sub-01` or `sub-01 - ses-1`)
    pub unit: String,
    pub kind: IssueKind,
    pub message: String,
    pub severity: IssueSeverity,
    pub occurred_at: DateTime<Utc>,
}

impl ConversionIssue {
    pub fn warning(unit: &ProcessingUnit, kind: IssueKind, message: String) -> Self {
        Self::new(unit, kind, message, IssueSeverity::Warning)
    }

    pub fn skip(unit: &ProcessingUnit, kind: IssueKind, message: String) -> Self {
        Self::new(unit, kind, message, IssueSeverity::Skip)
    }

    pub fn critical(unit: &ProcessingUnit, kind: IssueKind, message: String) -> Self {
        Self::new(unit, kind, message, IssueSeverity::Critical)
    }

    fn new(
        unit: &ProcessingUnit,
        kind: IssueKind,
        message: String,
        severity: IssueSeverity,
    ) -> Self {
        Self {
            unit: unit.to_string(),
            kind,
            message,
            severity,
            occurred_at: Utc::now(),
        }
    }
}

/// Outcome of one conversion run
#[derive(Debug, Clone, Default)]
pub struct ConversionReport {
    /// Units converted and marked done during this run
    pub completed: Vec<ProcessingUnit>,
    /// Units already done before this run started
    pub already_done: Vec<ProcessingUnit>,
    /// Units attempted but left not done
    pub failed: Vec<ProcessingUnit>,
    /// Every issue, in the order recorded
    pub issues: Vec<ConversionIssue>,
    /// Set when the run stopped before visiting every unit
    pub aborted: bool,
}

impl ConversionReport {
    pub fn record(&mut self, issue: ConversionIssue) {
        self.issues.push(issue);
    }

    pub fn issues_of(&self, kind: IssueKind) -> impl Iterator<Item = &ConversionIssue> {
        self.issues.iter().filter(move |i| i.kind == kind)
    }

    pub fn has_failures(&self) -> bool {
        self.aborted || !self.failed.is_empty()
    }

    /// Human-readable end-of-run summary
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "****************** CONVERSION COMPLETED ******************");
        let _ = writeln!(
            out,
            "converted: {}  already done: {}  not converted: {}{}",
            self.completed.len(),
            self.already_done.len(),
            self.failed.len(),
            if self.aborted { "  (run aborted)" } else { "" }
        );

        if self.issues.is_empty() {
            let _ = writeln!(out, "No errors or notes were recorded.");
            return out;
        }

        let _ = writeln!(
            out,
            "Errors and notes regarding the BIDS conversion process:"
        );
        for issue in &self.issues {
            let _ = writeln!(
                out,
                "[{:?}] {}: {}",
                issue.severity, issue.unit, issue.message
            );
        }
        out
    }
}
