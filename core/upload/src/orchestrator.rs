//! Upload orchestrator.
//!
//! Maps an ordered list of local paths to an equally long, equally ordered
//! list of outcomes. Uploads run one at a time; per-file problems are
//! recorded, never raised.

use futures::TryStreamExt;
use std::path::Path;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, warn};

use driveup_common::{Error, FolderId, UploadTarget};
use driveup_storage::{
    AuthorizationHandle, ByteStream, FileMetadata, FileSource, StorageClient,
    DEFAULT_CONTENT_TYPE,
};

use crate::outcome::UploadOutcome;

/// Sequential uploader over a storage client and a file source.
pub struct Uploader<C: StorageClient + ?Sized, F: FileSource + ?Sized> {
    client: Arc<C>,
    files: Arc<F>,
    content_type: String,
}

impl<C: StorageClient + ?Sized, F: FileSource + ?Sized> Uploader<C, F> {
    /// Create an uploader sending generic binary content.
    pub fn new(client: Arc<C>, files: Arc<F>) -> Self {
        Self {
            client,
            files,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }

    /// Use `content_type` for every upload.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Upload every existing path into `folder_id`, in order.
    ///
    /// # Postconditions
    /// - Exactly one outcome per path, in input order
    /// - No client call for missing paths
    /// - Each file is closed before the next one is opened
    pub async fn upload<S: AsRef<str>>(
        &self,
        auth: &AuthorizationHandle,
        folder_id: &FolderId,
        paths: &[S],
    ) -> Vec<UploadOutcome> {
        info!(
            "Starting upload of {} file(s) to folder ID: {} via {}",
            paths.len(),
            folder_id,
            self.client.name()
        );

        let mut outcomes = Vec::with_capacity(paths.len());
        for path in paths {
            let target = UploadTarget::new(path.as_ref(), folder_id.clone());
            outcomes.push(self.upload_target(auth, &target).await);
        }

        outcomes
    }

    /// Process a single target to its terminal state.
    async fn upload_target(
        &self,
        auth: &AuthorizationHandle,
        target: &UploadTarget,
    ) -> UploadOutcome {
        let path = Path::new(target.path());

        if !self.files.exists(path).await {
            warn!("[SKIPPED] File not found: {}", target.path());
            return UploadOutcome::skipped(target.path());
        }

        let reader = match self.files.open(path).await {
            Ok(reader) => reader,
            Err(e) => {
                error!("Failed to open {}: {}", target.path(), e);
                return UploadOutcome::failed(target.path(), open_failure_detail(e));
            }
        };

        let content: ByteStream = Box::pin(ReaderStream::new(reader).map_err(Error::from));
        let metadata = FileMetadata::in_folder(target.remote_name(), target.folder_id().as_str());

        info!("Uploading '{}'...", target.remote_name());

        // The stream owns the reader, so the file closes when this call returns.
        let result = self
            .client
            .create_with_media(auth, &metadata, content, &self.content_type)
            .await;

        match result {
            Ok(remote) => {
                info!(
                    "File '{}' uploaded with ID: {}",
                    remote.name, remote.id
                );
                UploadOutcome::succeeded(target.path(), remote.id)
            }
            Err(failure) => {
                error!(
                    "Uploading '{}' failed ({:?}): {}",
                    target.remote_name(),
                    failure.kind,
                    failure
                );
                debug!("Continuing with remaining targets");
                UploadOutcome::failed(target.path(), failure.to_string())
            }
        }
    }
}

fn open_failure_detail(error: Error) -> String {
    match error {
        Error::Io(io) => io.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use driveup_storage::{FailureKind, FileReader, MemoryStorage, UploadFailure};
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, ReadBuf};

    /// Read handle that counts its own drop.
    struct TrackedReader {
        inner: Cursor<Vec<u8>>,
        closed: Arc<AtomicUsize>,
    }

    impl AsyncRead for TrackedReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.inner).poll_read(cx, buf)
        }
    }

    impl Drop for TrackedReader {
        fn drop(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// In-memory file source tracking open and close counts.
    #[derive(Default)]
    struct FakeFiles {
        files: HashMap<String, Vec<u8>>,
        unreadable: Vec<String>,
        opened: AtomicUsize,
        closed: Arc<AtomicUsize>,
        /// Open handles seen at each open call.
        open_at_open: Mutex<Vec<usize>>,
    }

    impl FakeFiles {
        fn with(names: &[&str]) -> Self {
            let mut files = HashMap::new();
            for name in names {
                files.insert(name.to_string(), format!("content of {}", name).into_bytes());
            }
            Self {
                files,
                ..Self::default()
            }
        }

        fn opened(&self) -> usize {
            self.opened.load(Ordering::SeqCst)
        }

        fn closed(&self) -> usize {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FileSource for FakeFiles {
        async fn exists(&self, path: &Path) -> bool {
            self.files.contains_key(path.to_string_lossy().as_ref())
        }

        async fn open(&self, path: &Path) -> driveup_common::Result<FileReader> {
            let key = path.to_string_lossy().into_owned();
            if self.unreadable.contains(&key) {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "permission denied",
                )));
            }
            let data = self
                .files
                .get(&key)
                .cloned()
                .ok_or_else(|| {
                    Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, key.clone()))
                })?;

            let open_now = self.opened() - self.closed();
            self.open_at_open.lock().unwrap().push(open_now);
            self.opened.fetch_add(1, Ordering::SeqCst);

            Ok(Box::new(TrackedReader {
                inner: Cursor::new(data),
                closed: self.closed.clone(),
            }))
        }
    }

    fn folder() -> FolderId {
        FolderId::new("folder-1").unwrap()
    }

    fn auth() -> AuthorizationHandle {
        AuthorizationHandle::fixed("token")
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let client = Arc::new(MemoryStorage::new());
        let uploader = Uploader::new(client.clone(), Arc::new(FakeFiles::default()));

        let outcomes = uploader.upload::<&str>(&auth(), &folder(), &[]).await;

        assert!(outcomes.is_empty());
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_file_is_skipped_without_call() {
        let client = Arc::new(MemoryStorage::new());
        let uploader = Uploader::new(client.clone(), Arc::new(FakeFiles::default()));

        let outcomes = uploader.upload(&auth(), &folder(), &["missing.jpg"]).await;

        assert_eq!(outcomes, vec![UploadOutcome::skipped("missing.jpg")]);
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_success_records_remote_id() {
        let client = Arc::new(MemoryStorage::new().succeed_with_id("a.jpg", "X1"));
        let uploader = Uploader::new(client.clone(), Arc::new(FakeFiles::with(&["a.jpg"])));

        let outcomes = uploader.upload(&auth(), &folder(), &["a.jpg"]).await;

        assert_eq!(outcomes, vec![UploadOutcome::succeeded("a.jpg", "X1")]);
        let calls = client.calls();
        assert_eq!(calls[0].content, b"content of a.jpg");
        assert_eq!(calls[0].parents, vec!["folder-1".to_string()]);
        assert_eq!(calls[0].content_type, DEFAULT_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_processing_continues() {
        let client = Arc::new(
            MemoryStorage::new()
                .fail_with(
                    "a.jpg",
                    UploadFailure::new(FailureKind::Quota, "quota exceeded"),
                )
                .succeed_with_id("b.jpg", "id-b"),
        );
        let uploader =
            Uploader::new(client.clone(), Arc::new(FakeFiles::with(&["a.jpg", "b.jpg"])));

        let outcomes = uploader.upload(&auth(), &folder(), &["a.jpg", "b.jpg"]).await;

        assert_eq!(
            outcomes,
            vec![
                UploadOutcome::failed("a.jpg", "quota exceeded"),
                UploadOutcome::succeeded("b.jpg", "id-b"),
            ]
        );
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mixed_scenario_preserves_order() {
        let client = Arc::new(
            MemoryStorage::new()
                .succeed_with_id("a.jpg", "id-a")
                .succeed_with_id("b.jpg", "id-b"),
        );
        let files = Arc::new(FakeFiles::with(&["a.jpg", "b.jpg"]));
        let uploader = Uploader::new(client.clone(), files.clone());

        let outcomes = uploader
            .upload(&auth(), &folder(), &["a.jpg", "missing.jpg", "b.jpg"])
            .await;

        assert_eq!(
            outcomes,
            vec![
                UploadOutcome::succeeded("a.jpg", "id-a"),
                UploadOutcome::skipped("missing.jpg"),
                UploadOutcome::succeeded("b.jpg", "id-b"),
            ]
        );

        let names: Vec<String> = client.calls().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["a.jpg".to_string(), "b.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_each_file_closed_once_before_next_opens() {
        let client = Arc::new(MemoryStorage::new().fail_with(
            "b.jpg",
            UploadFailure::new(FailureKind::Transport, "connection reset"),
        ));
        let files = Arc::new(FakeFiles::with(&["a.jpg", "b.jpg", "c.jpg"]));
        let uploader = Uploader::new(client, files.clone());

        uploader
            .upload(&auth(), &folder(), &["a.jpg", "b.jpg", "missing", "c.jpg"])
            .await;

        assert_eq!(files.opened(), 3);
        assert_eq!(files.closed(), 3);
        assert_eq!(*files.open_at_open.lock().unwrap(), vec![0, 0, 0]);
    }

    #[tokio::test]
    async fn test_unopenable_file_fails() {
        let client = Arc::new(MemoryStorage::new());
        let mut fake = FakeFiles::with(&["locked.bin", "ok.bin"]);
        fake.unreadable.push("locked.bin".to_string());
        let uploader = Uploader::new(client.clone(), Arc::new(fake));

        let outcomes = uploader
            .upload(&auth(), &folder(), &["locked.bin", "ok.bin"])
            .await;

        assert_eq!(outcomes[0], UploadOutcome::failed("locked.bin", "permission denied"));
        assert_eq!(outcomes[1].status, crate::UploadStatus::Succeeded);
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_remote_name_is_base_name() {
        let client = Arc::new(MemoryStorage::new());
        let uploader = Uploader::new(client.clone(), Arc::new(FakeFiles::with(&["photos/bbc.jpg"])))
            .with_content_type("image/jpeg");

        let outcomes = uploader.upload(&auth(), &folder(), &["photos/bbc.jpg"]).await;

        assert_eq!(outcomes[0].path, "photos/bbc.jpg");
        let calls = client.calls();
        assert_eq!(calls[0].name, "bbc.jpg");
        assert_eq!(calls[0].content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn test_duplicate_paths_are_uploaded_twice() {
        let client = Arc::new(MemoryStorage::new());
        let uploader = Uploader::new(client.clone(), Arc::new(FakeFiles::with(&["a.jpg"])));

        let outcomes = uploader.upload(&auth(), &folder(), &["a.jpg", "a.jpg"]).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn test_local_file_source_end_to_end() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.jpg"), b"jpeg bytes").unwrap();

        let client = Arc::new(MemoryStorage::new().succeed_with_id("a.jpg", "id-a"));
        let files = Arc::new(driveup_storage::LocalFileSource::with_base_dir(temp.path()));
        let uploader = Uploader::new(client.clone(), files);

        let outcomes = uploader
            .upload(&auth(), &folder(), &["a.jpg", "missing.jpg"])
            .await;

        assert_eq!(
            outcomes,
            vec![
                UploadOutcome::succeeded("a.jpg", "id-a"),
                UploadOutcome::skipped("missing.jpg"),
            ]
        );
        assert_eq!(client.calls()[0].content, b"jpeg bytes");
    }

    proptest! {
        #[test]
        fn prop_outcomes_match_inputs(
            requests in proptest::collection::vec(("[a-e]", any::<bool>()), 0..12)
        ) {
            let paths: Vec<String> = requests
                .iter()
                .map(|(name, _)| format!("{}.bin", name))
                .collect();
            let existing: Vec<&str> = requests
                .iter()
                .zip(&paths)
                .filter(|((_, present), _)| *present)
                .map(|(_, path)| path.as_str())
                .collect();

            let files = Arc::new(FakeFiles::with(&existing));
            let client = Arc::new(MemoryStorage::new());
            let uploader = Uploader::new(client.clone(), files.clone());

            let runtime = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            let outcomes = runtime.block_on(uploader.upload(&auth(), &folder(), &paths));

            prop_assert_eq!(outcomes.len(), paths.len());
            for (outcome, path) in outcomes.iter().zip(&paths) {
                prop_assert_eq!(&outcome.path, path);
            }

            let uploaded = paths.iter().filter(|p| files.files.contains_key(*p)).count();
            prop_assert_eq!(client.call_count(), uploaded);
            prop_assert_eq!(files.opened(), uploaded);
            prop_assert_eq!(files.closed(), uploaded);
        }
    }
}
