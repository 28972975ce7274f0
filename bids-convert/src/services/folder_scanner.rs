//! Source folder discovery
//!
//! Lists the immediate sub-directories of an input directory. Entries are always sorted by
//! file name, so run indices derived from their position do not depend on the platform's
//! directory listing order.

use crate::services::folder_classifier::{FolderClassifier, FolderRole};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Folder scanner errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Directory could not be listed
    #[error("Cannot list {0}: {1}")]
    ListError(PathBuf, String),
}

/// One DICOM series folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFolder {
    pub name: String,
    pub path: PathBuf,
}

/// A subject directory split by folder role, each list sorted by name
#[derive(Debug, Clone, Default)]
pub struct ClassifiedFolders {
    pub anatomical: Vec<SourceFolder>,
    pub field_maps: Vec<SourceFolder>,
    pub functional: Vec<SourceFolder>,
}

impl ClassifiedFolders {
    pub fn functional_names(&self) -> impl Iterator<Item = &str> {
        self.functional.iter().map(|f| f.name.as_str())
    }
}

/// Sorted listing of the directories directly under `dir`
pub fn list_folders(dir: &Path) -> Result<Vec<SourceFolder>, ScanError> {
    if !dir.exists() {
        return Err(ScanError::PathNotFound(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(ScanError::NotADirectory(dir.to_path_buf()));
    }

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    let mut folders = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| ScanError::ListError(dir.to_path_buf(), e.to_string()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        folders.push(SourceFolder {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: entry.path().to_path_buf(),
        });
    }

    tracing::debug!("{} folders under {}", folders.len(), dir.display());
    Ok(folders)
}

/// List and split a subject directory by role
pub fn classify_folders(
    dir: &Path,
    classifier: &dyn FolderClassifier,
) -> Result<ClassifiedFolders, ScanError> {
    let mut classified = ClassifiedFolders::default();
    for folder in list_folders(dir)? {
        match classifier.classify(&folder.name) {
            FolderRole::Anatomical => classified.anatomical.push(folder),
            FolderRole::FieldMap => classified.field_maps.push(folder),
            FolderRole::Functional => classified.functional.push(folder),
            FolderRole::Ignored => {}
        }
    }
    Ok(classified)
}

/// Subject directories in the input root (names containing `sub`), sorted
pub fn discover_subjects(input_root: &Path) -> Result<Vec<String>, ScanError> {
    Ok(list_folders(input_root)?
        .into_iter()
        .map(|f| f.name)
        .filter(|name| name.contains("sub"))
        .collect())
}
