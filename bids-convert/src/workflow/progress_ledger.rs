//! Progress ledger: which units are done, persisted as JSON
//!
//! The ledger records `done` / `not_done` per unit and is reconciled against the output tree
//! at the start of every run:
//!
//! | ledger     | output dir | meaning            | action                          |
//! |------------|------------|--------------------|---------------------------------|
//! | (missing)  | any        | new unit           | add as `not_done`               |
//! | `not_done` | present    | interrupted run    | delete the directory, redo      |
//! | `done`     | absent     | output was removed | reset to `not_done`, redo       |
//! | `done`     | present    | complete           | skip                            |
//!
//! File format: single-session units are top-level `"sub-01": "done"` entries, multi-session
//! units are nested under their session, `"ses-1": {"sub-01": "not_done"}`.
//!
//! The ledger is persisted after every completed unit, so a crash loses at most the unit that
//! was in flight.

use crate::models::{ProcessingUnit, UnitStatus};
use bids_common::json_io::{read_json, write_json_atomic};
use bids_common::Result;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One top-level value of the progress file, as written
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum LedgerNode {
    Status(UnitStatus),
    Session(BTreeMap<String, UnitStatus>),
}

type LedgerDocument = BTreeMap<String, LedgerNode>;

/// What reconciliation found, per category, in configuration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    /// Units that still need processing (every `not_done` configured unit)
    pub to_process: Vec<ProcessingUnit>,
    /// Units already done with output present
    pub already_done: Vec<ProcessingUnit>,
    /// Units seen for the first time
    pub discovered: Vec<ProcessingUnit>,
    /// `not_done` units whose partial output was deleted
    pub interrupted: Vec<ProcessingUnit>,
    /// `done` units whose output was missing
    pub lost: Vec<ProcessingUnit>,
}

#[derive(Debug, Clone)]
pub struct ProgressLedger {
    path: PathBuf,
    entries: BTreeMap<ProcessingUnit, UnitStatus>,
    /// The file on disk had content that was dropped; copy it aside before overwriting
    backup_pending: bool,
}

impl ProgressLedger {
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
            backup_pending: false,
        }
    }

    /// Load the ledger at `path`
    ///
    /// A missing file yields an empty ledger. Unreadable or malformed content never aborts the
    /// run: entries that cannot be parsed are dropped with a warning (their units count as
    /// new), and the file is copied to `<name>.bak` by the first [`persist`](Self::persist).
    /// Loading itself never writes anything.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            info!("No progress file at {}, starting fresh", path.display());
            return Self::empty(path);
        }

        let document = match read_json::<BTreeMap<String, Value>>(path) {
            Ok(document) => document,
            Err(e) => {
                warn!(
                    "Progress file {} could not be read ({}), treating it as empty",
                    path.display(),
                    e
                );
                let mut ledger = Self::empty(path);
                ledger.backup_pending = true;
                return ledger;
            }
        };

        let (entries, rejected) = entries_from_document(document);
        let ledger = Self {
            path: path.to_path_buf(),
            entries,
            backup_pending: rejected > 0,
        };
        info!(
            "Loaded progress file {} ({} units, {} rejected)",
            path.display(),
            ledger.len(),
            rejected
        );
        ledger
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn status(&self, unit: &ProcessingUnit) -> Option<UnitStatus> {
        self.entries.get(unit).copied()
    }

    pub fn is_done(&self, unit: &ProcessingUnit) -> bool {
        self.status(unit) == Some(UnitStatus::Done)
    }

    pub fn mark_done(&mut self, unit: &ProcessingUnit) {
        self.entries.insert(unit.clone(), UnitStatus::Done);
    }

    /// Bring the ledger in line with `output_root` for the configured `units`, then persist
    ///
    /// Partial output of interrupted units is deleted here. Entries for units that are no
    /// longer configured are left untouched.
    pub fn reconcile(
        &mut self,
        units: &[ProcessingUnit],
        output_root: &Path,
    ) -> Result<ReconcileOutcome> {
        let mut outcome = ReconcileOutcome::default();

        for unit in units {
            if !self.entries.contains_key(unit) {
                self.entries.insert(unit.clone(), UnitStatus::NotDone);
                outcome.discovered.push(unit.clone());
            }
        }

        for unit in units {
            let unit_dir = unit.dir_under(output_root);
            let status = self.status(unit).unwrap_or(UnitStatus::NotDone);

            match (status, unit_dir.exists()) {
                (UnitStatus::NotDone, true) => {
                    warn!(
                        "{}: Process was interrupted. Participant will be re-processed. Removing {}",
                        unit,
                        unit_dir.display()
                    );
                    fs::remove_dir_all(&unit_dir)?;
                    outcome.interrupted.push(unit.clone());
                    outcome.to_process.push(unit.clone());
                }
                (UnitStatus::NotDone, false) => {
                    outcome.to_process.push(unit.clone());
                }
                (UnitStatus::Done, false) => {
                    warn!(
                        "{}: Processed data not found. Participant will be re-processed.",
                        unit
                    );
                    self.entries.insert(unit.clone(), UnitStatus::NotDone);
                    outcome.lost.push(unit.clone());
                    outcome.to_process.push(unit.clone());
                }
                (UnitStatus::Done, true) => {
                    debug!("{}: already converted", unit);
                    outcome.already_done.push(unit.clone());
                }
            }
        }

        self.persist()?;

        info!(
            "Reconciled progress: {} to process, {} done, {} new, {} interrupted, {} lost",
            outcome.to_process.len(),
            outcome.already_done.len(),
            outcome.discovered.len(),
            outcome.interrupted.len(),
            outcome.lost.len()
        );

        Ok(outcome)
    }

    /// Overwrite the progress file with the full ledger
    pub fn persist(&mut self) -> Result<()> {
        if self.backup_pending {
            backup(&self.path);
            self.backup_pending = false;
        }
        write_json_atomic(&self.path, &self.to_document())?;
        debug!("Progress written to {}", self.path.display());
        Ok(())
    }

    fn to_document(&self) -> LedgerDocument {
        let mut document = LedgerDocument::new();
        for (unit, status) in &self.entries {
            match &unit.session {
                None => {
                    document.insert(unit.subject.clone(), LedgerNode::Status(*status));
                }
                Some(session) => {
                    let node = document
                        .entry(session.clone())
                        .or_insert_with(|| LedgerNode::Session(BTreeMap::new()));
                    if let LedgerNode::Status(_) = node {
                        warn!(
                            "Progress key '{}' is both a subject and a session; keeping the session",
                            session
                        );
                        *node = LedgerNode::Session(BTreeMap::new());
                    }
                    if let LedgerNode::Session(subjects) = node {
                        subjects.insert(unit.subject.clone(), *status);
                    }
                }
            }
        }
        document
    }
}

/// Parse each entry on its own; returns the entries kept and the number rejected
fn entries_from_document(
    document: BTreeMap<String, Value>,
) -> (BTreeMap<ProcessingUnit, UnitStatus>, usize) {
    let mut entries = BTreeMap::new();
    let mut rejected = 0;

    for (key, node) in document {
        match node {
            Value::Object(subjects) => {
                for (subject, status) in subjects {
                    let unit = ProcessingUnit::in_session(subject, key.clone());
                    match parse_status(&unit, status) {
                        Some(status) => {
                            entries.insert(unit, status);
                        }
                        None => rejected += 1,
                    }
                }
            }
            status => {
                let unit = ProcessingUnit::single(key);
                match parse_status(&unit, status) {
                    Some(status) => {
                        entries.insert(unit, status);
                    }
                    None => rejected += 1,
                }
            }
        }
    }

    (entries, rejected)
}

fn parse_status(unit: &ProcessingUnit, value: Value) -> Option<UnitStatus> {
    match serde_json::from_value::<UnitStatus>(value.clone()) {
        Ok(status) => Some(status),
        Err(_) => {
            warn!(
                "{}: unrecognised progress status {}, the unit is treated as new",
                unit, value
            );
            None
        }
    }
}

/// Keep a copy of a progress file that is about to lose entries
fn backup(path: &Path) {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".bak");
    let backup_path = path.with_file_name(name);

    match fs::copy(path, &backup_path) {
        Ok(_) => warn!("Original progress file saved as {}", backup_path.display()),
        Err(e) => warn!(
            "Could not save a copy of {} to {}: {}",
            path.display(),
            backup_path.display(),
            e
        ),
    }
}
