//! Services used by the conversion workflow

pub mod bids_naming;
pub mod external_tool;
pub mod folder_classifier;
pub mod folder_scanner;
pub mod sidecar;

pub use external_tool::{ConversionRequest, Dcm2niix, Defacer, DicomConverter, Pydeface, ToolError};
pub use folder_classifier::{ClassifierPatterns, FolderClassifier, FolderRole, SubstringClassifier};
pub use folder_scanner::{ClassifiedFolders, ScanError, SourceFolder};
