//! In-memory storage client for testing and dry runs.

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

use crate::credentials::AuthorizationHandle;
use crate::provider::{
    ByteStream, FailureKind, FileMetadata, RemoteFile, StorageClient, UploadFailure,
};

/// One call observed by [`MemoryStorage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpload {
    /// Remote file name.
    pub name: String,
    /// Parent folder IDs.
    pub parents: Vec<String>,
    /// Content received.
    pub content: Vec<u8>,
    /// Content type requested.
    pub content_type: String,
}

/// Scripted reply for a remote name.
#[derive(Debug, Clone)]
enum Reply {
    Succeed(String),
    Fail(UploadFailure),
}

/// In-memory storage client.
///
/// Records every call in order. Replies can be scripted per remote name;
/// unscripted uploads succeed with a fresh UUID.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<RecordedUpload>>,
}

impl MemoryStorage {
    /// Create a new empty memory client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer uploads named `name` with remote id `id`.
    pub fn succeed_with_id(self, name: impl Into<String>, id: impl Into<String>) -> Self {
        self.script(name.into(), Reply::Succeed(id.into()))
    }

    /// Answer uploads named `name` with `failure`.
    pub fn fail_with(self, name: impl Into<String>, failure: UploadFailure) -> Self {
        self.script(name.into(), Reply::Fail(failure))
    }

    fn script(self, name: String, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, reply);
        self
    }

    /// All calls so far, in call order.
    pub fn calls(&self) -> Vec<RecordedUpload> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of calls so far.
    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl StorageClient for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create_with_media(
        &self,
        auth: &AuthorizationHandle,
        metadata: &FileMetadata,
        mut content: ByteStream,
        content_type: &str,
    ) -> Result<RemoteFile, UploadFailure> {
        auth.access_token()
            .await
            .map_err(|e| UploadFailure::new(FailureKind::Unauthorized, e.to_string()))?;

        let mut data = Vec::new();
        while let Some(chunk) = content.next().await {
            let chunk = chunk.map_err(|e| UploadFailure::new(FailureKind::Io, e.to_string()))?;
            data.extend_from_slice(&chunk);
        }
        drop(content);

        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedUpload {
                name: metadata.name.clone(),
                parents: metadata.parents.clone(),
                content: data,
                content_type: content_type.to_string(),
            });

        let reply = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&metadata.name)
            .cloned();

        match reply {
            Some(Reply::Fail(failure)) => Err(failure),
            Some(Reply::Succeed(id)) => Ok(RemoteFile {
                id,
                name: metadata.name.clone(),
            }),
            None => Ok(RemoteFile {
                id: Uuid::new_v4().to_string(),
                name: metadata.name.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use driveup_common::Error;
    use futures::stream;

    fn content(chunks: &[&'static [u8]]) -> ByteStream {
        let items: Vec<driveup_common::Result<Bytes>> = chunks
            .iter()
            .map(|c| Ok(Bytes::from_static(c)))
            .collect();
        Box::pin(stream::iter(items))
    }

    #[tokio::test]
    async fn test_records_calls_in_order() {
        let storage = MemoryStorage::new();
        let auth = AuthorizationHandle::fixed("t");

        storage
            .create_with_media(
                &auth,
                &FileMetadata::in_folder("a.jpg", "f"),
                content(&[b"ab", b"c"]),
                "image/jpeg",
            )
            .await
            .unwrap();
        storage
            .create_with_media(
                &auth,
                &FileMetadata::in_folder("b.jpg", "f"),
                content(&[]),
                "application/octet-stream",
            )
            .await
            .unwrap();

        let calls = storage.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "a.jpg");
        assert_eq!(calls[0].content, b"abc");
        assert_eq!(calls[0].content_type, "image/jpeg");
        assert_eq!(calls[0].parents, vec!["f".to_string()]);
        assert_eq!(calls[1].name, "b.jpg");
    }

    #[tokio::test]
    async fn test_scripted_replies() {
        let storage = MemoryStorage::new()
            .succeed_with_id("a.jpg", "X1")
            .fail_with(
                "b.jpg",
                UploadFailure::new(FailureKind::Quota, "quota exceeded"),
            );
        let auth = AuthorizationHandle::fixed("t");

        let ok = storage
            .create_with_media(&auth, &FileMetadata::in_folder("a.jpg", "f"), content(&[b"x"]), "x")
            .await
            .unwrap();
        assert_eq!(ok.id, "X1");
        assert_eq!(ok.name, "a.jpg");

        let err = storage
            .create_with_media(&auth, &FileMetadata::in_folder("b.jpg", "f"), content(&[b"y"]), "x")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "quota exceeded");
        assert_eq!(storage.call_count(), 2);
    }

    #[tokio::test]
    async fn test_unscripted_upload_gets_uuid() {
        let storage = MemoryStorage::new();
        let auth = AuthorizationHandle::fixed("t");

        let file = storage
            .create_with_media(&auth, &FileMetadata::in_folder("c.bin", "f"), content(&[]), "x")
            .await
            .unwrap();
        assert!(Uuid::parse_str(&file.id).is_ok());
    }

    #[tokio::test]
    async fn test_stream_error_is_io_failure() {
        let storage = MemoryStorage::new();
        let auth = AuthorizationHandle::fixed("t");
        let broken: ByteStream = Box::pin(stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(Error::Io(std::io::Error::other("disk gone"))),
        ]));

        let err = storage
            .create_with_media(&auth, &FileMetadata::in_folder("d.bin", "f"), broken, "x")
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Io);
        assert_eq!(storage.call_count(), 0);
    }
}
