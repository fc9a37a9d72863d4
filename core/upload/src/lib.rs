//! driveup upload orchestration.
//!
//! This module provides:
//! - The orchestrator mapping requested paths to per-file outcomes
//! - The outcome model and run summary
//! - Reporters that render outcomes for humans or machines

pub mod orchestrator;
pub mod outcome;
pub mod report;

// Re-export main types
pub use orchestrator::Uploader;
pub use outcome::{RunSummary, UploadOutcome, UploadStatus, FILE_NOT_FOUND};
pub use report::{ConsoleReporter, JsonReporter, Reporter};
