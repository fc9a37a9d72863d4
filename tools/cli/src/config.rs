//! Uploader configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use driveup_common::{Error, FolderId, Result};
use driveup_storage::gdrive::{FlowConfig, TokenStore, DRIVE_FILE_SCOPE};
use driveup_storage::{LocalFileSource, DEFAULT_CONTENT_TYPE};

/// Default client secret file name, relative to the working directory.
pub const DEFAULT_CREDENTIALS: &str = "client_secret.json";

/// Everything the entry point needs to run an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploaderConfig {
    /// Client secret downloaded from the cloud console.
    pub credentials_path: PathBuf,
    /// Destination folder.
    pub folder_id: Option<String>,
    /// Files to upload, in order.
    pub files: Vec<String>,
    /// Token cache location (platform config dir when unset).
    pub token_path: Option<PathBuf>,
    /// OAuth2 scopes to request.
    pub scopes: Vec<String>,
    /// Content type sent with every file.
    pub content_type: String,
    /// Directory relative file paths resolve against.
    pub base_dir: Option<PathBuf>,
    /// Seconds to wait for browser consent.
    pub consent_timeout_secs: u64,
    /// Loopback redirect port; 0 picks a free one.
    pub redirect_port: u16,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::from(DEFAULT_CREDENTIALS),
            folder_id: None,
            files: Vec::new(),
            token_path: None,
            scopes: vec![DRIVE_FILE_SCOPE.to_string()],
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            base_dir: None,
            consent_timeout_secs: 300,
            redirect_port: 0,
        }
    }
}

/// Values given on the command line; `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub credentials_path: Option<PathBuf>,
    pub token_path: Option<PathBuf>,
    pub folder_id: Option<String>,
    pub content_type: Option<String>,
    pub files: Vec<String>,
}

impl UploaderConfig {
    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Read a JSON configuration file.
    ///
    /// # Errors
    /// - File missing or unreadable
    /// - Malformed JSON or unknown value types
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Apply command-line values on top of the file values.
    ///
    /// Positional files replace the configured list rather than extend it.
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(path) = overrides.credentials_path {
            self.credentials_path = path;
        }
        if let Some(path) = overrides.token_path {
            self.token_path = Some(path);
        }
        if let Some(id) = overrides.folder_id {
            self.folder_id = Some(id);
        }
        if let Some(content_type) = overrides.content_type {
            self.content_type = content_type;
        }
        if !overrides.files.is_empty() {
            self.files = overrides.files;
        }
    }

    /// Validated destination folder.
    ///
    /// # Errors
    /// - Folder id missing or blank
    pub fn folder_id(&self) -> Result<FolderId> {
        let id = self
            .folder_id
            .as_deref()
            .ok_or_else(|| Error::Config("folder_id is required".to_string()))?;
        FolderId::new(id).map_err(|e| Error::Config(e.to_string()))
    }

    /// Validated content type.
    ///
    /// # Errors
    /// - Empty, or containing control characters that would break the
    ///   multipart header
    pub fn content_type(&self) -> Result<&str> {
        let content_type = self.content_type.trim();
        if content_type.is_empty() || content_type.chars().any(char::is_control) {
            return Err(Error::Config(format!(
                "Invalid content_type: {:?}",
                self.content_type
            )));
        }
        Ok(content_type)
    }

    /// Token cache location.
    pub fn token_path(&self) -> PathBuf {
        self.token_path
            .clone()
            .unwrap_or_else(TokenStore::default_path)
    }

    /// Consent flow settings.
    pub fn flow_config(&self, open_browser: bool) -> FlowConfig {
        FlowConfig {
            token_path: self.token_path(),
            redirect_port: self.redirect_port,
            consent_timeout: Duration::from_secs(self.consent_timeout_secs),
            open_browser,
        }
    }

    /// Local file source honoring `base_dir`.
    pub fn file_source(&self) -> LocalFileSource {
        match &self.base_dir {
            Some(dir) => LocalFileSource::with_base_dir(dir),
            None => LocalFileSource::new(),
        }
    }
}
