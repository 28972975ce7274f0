//! Source folder classification
//!
//! Maps a DICOM series folder name to the role it plays in a subject directory. The matching
//! rules live behind [`FolderClassifier`] so they can be swapped without touching the
//! per-unit processing loop.

use serde::Deserialize;

/// Role of a source folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FolderRole {
    /// T1-weighted structural acquisition
    Anatomical,
    /// Field-map echo
    FieldMap,
    /// Any other series; candidates for the run table
    Functional,
    /// Never converted, never reported
    Ignored,
}

pub trait FolderClassifier {
    fn classify(&self, folder_name: &str) -> FolderRole;
}

/// Substring patterns used by [`SubstringClassifier`]
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ClassifierPatterns {
    #[serde(default = "default_anatomical")]
    pub anatomical: String,
    #[serde(default = "default_field_map")]
    pub field_map: String,
    /// Folder names containing any of these are ignored
    #[serde(default)]
    pub ignore: Vec<String>,
}

impl Default for ClassifierPatterns {
    fn default() -> Self {
        Self {
            anatomical: default_anatomical(),
            field_map: default_field_map(),
            ignore: Vec::new(),
        }
    }
}

fn default_anatomical() -> String {
    "T1_MPR".to_string()
}

fn default_field_map() -> String {
    "FIELD".to_string()
}

/// Case-sensitive substring matching, checked in the order ignore → anatomical → field map
#[derive(Debug, Clone, Default)]
pub struct SubstringClassifier {
    patterns: ClassifierPatterns,
}

impl SubstringClassifier {
    pub fn new(patterns: ClassifierPatterns) -> Self {
        Self { patterns }
    }
}

impl FolderClassifier for SubstringClassifier {
    fn classify(&self, folder_name: &str) -> FolderRole {
        // Hidden entries (.DS_Store and friends) are never acquisitions
        if folder_name.starts_with('.') {
            return FolderRole::Ignored;
        }
        if self
            .patterns
            .ignore
            .iter()
            .any(|p| !p.is_empty() && folder_name.contains(p.as_str()))
        {
            return FolderRole::Ignored;
        }
        if folder_name.contains(self.patterns.anatomical.as_str()) {
            return FolderRole::Anatomical;
        }
        if folder_name.contains(self.patterns.field_map.as_str()) {
            return FolderRole::FieldMap;
        }
        FolderRole::Functional
    }
}
