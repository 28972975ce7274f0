//! Conversion workflow
//!
//! Units are processed one at a time, in configuration order:
//! 1. Load the progress ledger and reconcile it with the output tree
//! 2. Skip units already done
//! 3. Convert anatomical, field-map and functional folders of the next unit
//! 4. Mark it done and persist the ledger before moving on
//!
//! A crash or kill between steps 3 and 4 leaves the unit `not_done` with partial output,
//! which the next run's reconciliation deletes.

pub mod pipeline;
pub mod progress_ledger;
pub mod subject_processor;

pub use pipeline::{configured_units, resolve_subjects, run_conversion, unit_statuses, UnitProgress};
pub use progress_ledger::{ProgressLedger, ReconcileOutcome};
pub use subject_processor::{SubjectProcessor, Toolkit};
