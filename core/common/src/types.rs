//! Common types used throughout driveup.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use zeroize::Zeroize;

/// Identifier of a remote destination folder.
///
/// Opaque and provider-defined; the only constraint is that it is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FolderId(String);

impl FolderId {
    /// Create a new FolderId from a string.
    ///
    /// # Errors
    /// - Returns error if id is empty or only whitespace
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(crate::Error::InvalidInput(
                "Folder id cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FolderId {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::new(value)
    }
}

impl From<FolderId> for String {
    fn from(id: FolderId) -> Self {
        id.0
    }
}

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One requested upload: a local path, the name it gets remotely and the
/// folder it lands in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    path: String,
    remote_name: String,
    folder_id: FolderId,
}

impl UploadTarget {
    /// Build a target for `path`, naming the remote file after the path's
    /// final component.
    pub fn new(path: impl Into<String>, folder_id: FolderId) -> Self {
        let path = path.into();
        let remote_name = base_name(&path);
        Self {
            path,
            remote_name,
            folder_id,
        }
    }

    /// The local path as supplied by the caller.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Name of the file to create remotely.
    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }

    /// Destination folder.
    pub fn folder_id(&self) -> &FolderId {
        &self.folder_id
    }
}

/// Final path component, falling back to the whole path when there is none
/// (e.g. `..`).
fn base_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// String secret that zeroizes on drop.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, Serialize, Deserialize)]
#[zeroize(drop)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    /// Wrap a secret value.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Expose the secret.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}
