//! Local filesystem file source.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncRead;

use driveup_common::Result;

/// Open read handle on a local file. Dropping it closes the file.
pub type FileReader = Box<dyn AsyncRead + Send + Unpin>;

/// Access to the local files being uploaded.
#[async_trait]
pub trait FileSource: Send + Sync {
    /// Whether `path` names an existing regular file.
    ///
    /// Directories and dangling links count as missing.
    async fn exists(&self, path: &Path) -> bool;

    /// Open `path` for reading.
    ///
    /// # Errors
    /// - Permission denied or other I/O errors
    async fn open(&self, path: &Path) -> Result<FileReader>;
}

/// File source backed by the local filesystem.
///
/// Relative paths resolve against an optional base directory, otherwise
/// against the process working directory.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSource {
    base_dir: Option<PathBuf>,
}

impl LocalFileSource {
    /// Resolve relative paths against the working directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative paths against `base_dir`.
    pub fn with_base_dir(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: Some(base_dir.as_ref().to_path_buf()),
        }
    }

    /// Convert a caller path to a filesystem path.
    fn to_fs_path(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[async_trait]
impl FileSource for LocalFileSource {
    async fn exists(&self, path: &Path) -> bool {
        let fs_path = self.to_fs_path(path);
        match fs::metadata(&fs_path).await {
            Ok(meta) => meta.is_file(),
            Err(_) => false,
        }
    }

    async fn open(&self, path: &Path) -> Result<FileReader> {
        let fs_path = self.to_fs_path(path);
        let file = fs::File::open(&fs_path).await?;
        Ok(Box::new(file))
    }
}
