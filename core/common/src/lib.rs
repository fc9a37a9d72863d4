//! Common utilities and types shared across the driveup crates.
//!
//! This module provides the error taxonomy and the small validated types
//! that flow between the credential, storage and upload layers.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{FolderId, SecretString, UploadTarget};
