//! # bids-common
//!
//! Shared code for the BIDS conversion tools:
//! - Error and result types
//! - Configuration file resolution and TOML loading
//! - JSON file read/write helpers (atomic overwrite)

pub mod config;
pub mod error;
pub mod json_io;

pub use error::{Error, Result};
