//! bids-convert library interface
//!
//! Exposes the configuration, models, services and workflow for the binary and for
//! integration tests.

pub mod config;
pub mod models;
pub mod services;
pub mod workflow;

pub use config::{ConfigOverrides, ConversionConfig};
pub use models::{ConversionReport, ProcessingUnit, UnitStatus};
pub use workflow::{run_conversion, ProgressLedger, SubjectProcessor, Toolkit};
