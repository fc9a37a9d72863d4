//! On-disk persistence for OAuth2 tokens.

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use driveup_common::{Error, Result};

use super::auth::Tokens;

/// Directory under the user config dir holding driveup state.
const APP_DIR: &str = "driveup";
/// Token file name.
const TOKEN_FILENAME: &str = "token.json";

/// JSON token file at a well-known location.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Store tokens at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Default token location: `<config_dir>/driveup/token.json`.
    ///
    /// Falls back to the working directory when the platform has no config
    /// directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join(TOKEN_FILENAME))
            .unwrap_or_else(|| PathBuf::from(TOKEN_FILENAME))
    }

    /// Location of the token file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load persisted tokens, if any.
    ///
    /// # Errors
    /// - File exists but cannot be read or parsed
    pub async fn load(&self) -> Result<Option<Tokens>> {
        let data = match fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let tokens: Tokens = serde_json::from_str(&data).map_err(|e| {
            Error::Serialization(format!(
                "Corrupt token file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(Some(tokens))
    }

    /// Persist tokens, creating parent directories as needed.
    ///
    /// Writes a private sibling file and renames it over the old one, so
    /// the token is never readable by others and never half-written.
    pub async fn save(&self, tokens: &Tokens) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let data = serde_json::to_string_pretty(tokens)?;
        let staging = self.staging_path();

        if let Err(e) = write_private(&staging, data.as_bytes()).await {
            let _ = fs::remove_file(&staging).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&staging, &self.path).await {
            let _ = fs::remove_file(&staging).await;
            return Err(e.into());
        }

        tracing::debug!("Saved token to {}", self.path.display());
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| TOKEN_FILENAME.to_string());
        self.path
            .with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()))
    }

    /// Delete the token file. Returns whether a file was removed.
    pub async fn clear(&self) -> Result<bool> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Create `path` readable by the owner only and write `data` to it.
async fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(data).await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use driveup_common::SecretString;
    use tempfile::TempDir;

    fn sample() -> Tokens {
        Tokens {
            access_token: SecretString::new("access"),
            refresh_token: SecretString::new("refresh"),
            expires_at: Utc::now() + Duration::hours(1),
            scopes: vec!["scope-a".to_string()],
        }
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let temp = TempDir::new().unwrap();
        let store = TokenStore::new(temp.path().join("token.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_creates_parents_and_loads_back() {
        let temp = TempDir::new().unwrap();
        let store = TokenStore::new(temp.path().join("nested/dir/token.json"));

        store.save(&sample()).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();

        assert_eq!(loaded.access_token.expose(), "access");
        assert_eq!(loaded.refresh_token.expose(), "refresh");
        assert_eq!(loaded.scopes, vec!["scope-a".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_token_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let store = TokenStore::new(temp.path().join("token.json"));
        store.save(&sample()).await.unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_overwriting_world_readable_file_makes_it_private() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("token.json");
        std::fs::write(&path, "{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let store = TokenStore::new(&path);
        store.save(&sample()).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(store.load().await.unwrap().unwrap().access_token.expose(), "access");

        let leftovers: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("token.json");
        std::fs::write(&path, "{ nope").unwrap();

        let store = TokenStore::new(&path);
        assert!(matches!(
            store.load().await,
            Err(Error::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_clear() {
        let temp = TempDir::new().unwrap();
        let store = TokenStore::new(temp.path().join("token.json"));

        assert!(!store.clear().await.unwrap());
        store.save(&sample()).await.unwrap();
        assert!(store.clear().await.unwrap());
        assert!(store.load().await.unwrap().is_none());
    }

    #[test]
    fn test_default_path_ends_with_token_file() {
        let path = TokenStore::default_path();
        assert!(path.ends_with(TOKEN_FILENAME));
    }
}
