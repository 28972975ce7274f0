//! Data models for bids-convert

pub mod conversion_report;
pub mod run_spec;
pub mod unit;

pub use conversion_report::{ConversionIssue, ConversionReport, IssueKind, IssueSeverity};
pub use run_spec::{AnatomicalSlot, RunEntry, RunTable, RunTypes, SubjectRuns};
pub use unit::{ProcessingUnit, UnitStatus};
