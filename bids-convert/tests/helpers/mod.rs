//! Test helper utilities
//!
//! Shared fixtures for the bids-convert integration tests

#![allow(dead_code)]

pub mod dataset;
pub mod fake_tools;
pub mod log_capture;

pub use dataset::{Dataset, STANDARD_CONFIG};
pub use fake_tools::{FakeConverter, FakeDefacer};
pub use log_capture::{capture_logs, LogCapture};
