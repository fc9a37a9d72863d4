//! Storage client trait definition.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;

use driveup_common::Result;

use crate::credentials::AuthorizationHandle;

/// Content type used when nothing more specific is known.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Byte stream type for upload operations.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Metadata sent alongside the content of a new remote file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Name of the remote file.
    pub name: String,
    /// Parent folder IDs.
    pub parents: Vec<String>,
}

impl FileMetadata {
    /// Metadata for a file named `name` inside a single folder.
    pub fn in_folder(name: impl Into<String>, folder_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parents: vec![folder_id.into()],
        }
    }
}

/// Remote file fields returned after a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Provider-assigned identifier.
    pub id: String,
    /// Name as stored remotely.
    pub name: String,
}

/// Broad classification of an upload failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// The request never got a response.
    Transport,
    /// The access token was rejected.
    Unauthorized,
    /// Storage quota or rate limit exhausted.
    Quota,
    /// Any other provider-reported failure status.
    Rejected,
    /// Reading the local content failed.
    Io,
}

/// A failed upload as reported by the storage client.
///
/// Displays as the bare provider message so it can be shown verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct UploadFailure {
    /// Failure classification.
    pub kind: FailureKind,
    /// Human-readable message from the client or provider.
    pub message: String,
}

impl UploadFailure {
    /// Create a failure of the given kind.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Remote storage client.
///
/// Implementations perform exactly one single-shot "create file with media"
/// request per call. They must consume or drop `content` before returning.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Get the client name (e.g., "gdrive", "memory").
    fn name(&self) -> &str;

    /// Create a new remote file from `metadata` and streamed `content`.
    ///
    /// # Postconditions
    /// - On success, returns the remote `id` and `name`
    ///
    /// # Errors
    /// - Transport, quota or provider-reported failures as `UploadFailure`
    async fn create_with_media(
        &self,
        auth: &AuthorizationHandle,
        metadata: &FileMetadata,
        content: ByteStream,
        content_type: &str,
    ) -> std::result::Result<RemoteFile, UploadFailure>;
}
