//! Storage and credential capabilities for driveup.
//!
//! This module provides trait-based seams for everything the upload
//! orchestrator treats as an external collaborator (the remote storage
//! client, the local file source and the credential provider) together
//! with their concrete implementations.
//!
//! # Design Principles
//! - Provider isolation: no Drive-specific logic outside `gdrive`
//! - Async operations: all I/O operations are async
//! - Streaming support: file content is streamed, never buffered whole
//! - Per-upload failures are values, not run-aborting errors

pub mod credentials;
pub mod gdrive;
pub mod local;
pub mod memory;
pub mod provider;

pub use credentials::{AccessTokenSource, AuthorizationHandle, CredentialProvider};
pub use local::{FileReader, FileSource, LocalFileSource};
pub use memory::{MemoryStorage, RecordedUpload};
pub use provider::{
    ByteStream, FailureKind, FileMetadata, RemoteFile, StorageClient, UploadFailure,
    DEFAULT_CONTENT_TYPE,
};
