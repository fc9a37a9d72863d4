//! Authorization capabilities.
//!
//! The orchestrator only ever sees an [`AuthorizationHandle`]; how it was
//! obtained (interactive consent, cached token, fixed test token) is the
//! business of a [`CredentialProvider`].

use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use driveup_common::{Result, SecretString};

/// Something that can produce a currently valid access token.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    /// Get a valid access token, refreshing if the source supports it.
    async fn access_token(&self) -> Result<String>;
}

/// Source that always returns the same token.
struct FixedToken(SecretString);

#[async_trait]
impl AccessTokenSource for FixedToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.expose().to_string())
    }
}

/// Opaque credential granting access to the user's remote storage.
///
/// Cheap to clone; clones share the underlying token source.
#[derive(Clone)]
pub struct AuthorizationHandle {
    source: Arc<dyn AccessTokenSource>,
}

impl AuthorizationHandle {
    /// Wrap a token source.
    pub fn new(source: Arc<dyn AccessTokenSource>) -> Self {
        Self { source }
    }

    /// Handle that always presents `token`. Used for dry runs and tests.
    pub fn fixed(token: impl Into<String>) -> Self {
        Self::new(Arc::new(FixedToken(SecretString::new(token))))
    }

    /// Get a valid access token.
    pub async fn access_token(&self) -> Result<String> {
        self.source.access_token().await
    }

    /// Value for an HTTP `Authorization` header.
    pub async fn bearer(&self) -> Result<String> {
        Ok(format!("Bearer {}", self.access_token().await?))
    }
}

impl fmt::Debug for AuthorizationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthorizationHandle(..)")
    }
}

/// Produces authorization handles from a client-secret artifact.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Authorize for `scopes` using the client secret at `secret_path`.
    ///
    /// # Errors
    /// - `Error::Authentication` if the secret is missing or invalid, or
    ///   the user declines consent
    async fn authorize(&self, secret_path: &Path, scopes: &[String])
        -> Result<AuthorizationHandle>;
}
