//! Processing units and their persisted status

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// One subject, optionally within one session
///
/// Ordering sorts by session first, then subject, which is also the order the
/// progress file is written in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessingUnit {
    pub session: Option<String>,
    pub subject: String,
}

impl ProcessingUnit {
    pub fn new(subject: impl Into<String>, session: Option<String>) -> Self {
        Self {
            session,
            subject: subject.into(),
        }
    }

    /// Unit in a single-session layout
    pub fn single(subject: impl Into<String>) -> Self {
        Self::new(subject, None)
    }

    /// Unit in a multi-session layout
    pub fn in_session(subject: impl Into<String>, session: impl Into<String>) -> Self {
        Self::new(subject, Some(session.into()))
    }

    /// `root/subject[/session]`
    pub fn dir_under(&self, root: &Path) -> PathBuf {
        let dir = root.join(&self.subject);
        match &self.session {
            Some(session) => dir.join(session),
            None => dir,
        }
    }

    /// Prefix shared by every BIDS file name of this unit: `sub-01_ses-1` or `sub-01`
    pub fn file_prefix(&self) -> String {
        match &self.session {
            Some(session) => format!("{}_{}", self.subject, session),
            None => self.subject.clone(),
        }
    }
}

impl fmt::Display for ProcessingUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.session {
            Some(session) => write!(f, "{} - {}", self.subject, session),
            None => write!(f, "{}", self.subject),
        }
    }
}

/// Persisted unit status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    NotDone,
    Done,
}
