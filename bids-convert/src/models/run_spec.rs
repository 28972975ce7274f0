//! Run specifications: which functional source folder becomes which BIDS run

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which anatomical acquisition a functional run is paired with
///
/// Anatomical folders are indexed by their sorted position in the subject directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnatomicalSlot {
    #[default]
    FirstAnat,
    SecondAnat,
}

impl AnatomicalSlot {
    pub fn index(self) -> usize {
        match self {
            AnatomicalSlot::FirstAnat => 0,
            AnatomicalSlot::SecondAnat => 1,
        }
    }
}

/// One declared functional run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEntry {
    /// BIDS task label
    pub task: String,
    /// Run number as written into the file name (e.g. "01")
    pub run: String,
    #[serde(default)]
    pub anat: AnatomicalSlot,
}

/// Source folder name → run entry
pub type RunTable = BTreeMap<String, RunEntry>;

/// Run-type name → run table
pub type RunTypes = BTreeMap<String, RunTable>;

/// Subject → run-type name
pub type SubjectRuns = BTreeMap<String, String>;
