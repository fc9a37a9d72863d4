//! OAuth2 authentication and token management for Google Drive.

use chrono::{DateTime, Duration, Utc};
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret as OAuthClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken,
    Scope, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::Path;
use tokio::sync::RwLock;

use driveup_common::{Error, Result, SecretString};

use super::store::TokenStore;

/// OAuth2 authorization endpoint.
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// OAuth2 token endpoint.
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

type OAuthClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// OAuth2 tokens with expiration tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tokens {
    /// Access token for API requests.
    pub access_token: SecretString,
    /// Refresh token for obtaining new access tokens.
    pub refresh_token: SecretString,
    /// When the access token expires.
    pub expires_at: DateTime<Utc>,
    /// Scopes the tokens were granted for.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Tokens {
    /// Check if the access token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        // Consider expired if less than 5 minutes remaining
        self.expires_at < Utc::now() + Duration::minutes(5)
    }

    /// Whether every scope in `requested` was granted.
    pub fn covers(&self, requested: &[String]) -> bool {
        requested.iter().all(|scope| self.scopes.contains(scope))
    }
}

/// Client-secret section of a Google credentials file.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    /// OAuth2 client ID.
    pub client_id: String,
    /// OAuth2 client secret.
    #[serde(default)]
    pub client_secret: SecretString,
    /// Authorization endpoint.
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    /// Token endpoint.
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URL.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

/// Top level of the JSON downloaded from the cloud console.
#[derive(Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

impl ClientSecret {
    /// Parse a client-secret JSON document.
    ///
    /// Accepts the `installed` or `web` layout.
    ///
    /// # Errors
    /// - Malformed JSON or no usable section
    pub fn from_json(json: &str) -> Result<Self> {
        let file: ClientSecretFile = serde_json::from_str(json)
            .map_err(|e| Error::Authentication(format!("Malformed client secret: {}", e)))?;

        let secret = file.installed.or(file.web).ok_or_else(|| {
            Error::Authentication(
                "Client secret has neither an 'installed' nor a 'web' section".to_string(),
            )
        })?;

        if secret.client_id.trim().is_empty() {
            return Err(Error::Authentication(
                "Client secret has an empty client_id".to_string(),
            ));
        }

        Ok(secret)
    }

    /// Read and parse a client-secret file.
    ///
    /// # Errors
    /// - File missing or unreadable
    /// - Malformed content
    pub async fn from_file(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Authentication(format!(
                "Cannot read client secret {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&json)
    }
}

/// An authorization started but not yet completed.
pub struct PendingAuthorization {
    /// URL the user must visit.
    pub url: String,
    /// CSRF state expected back on the redirect.
    pub state: CsrfToken,
    verifier: PkceCodeVerifier,
    redirect_url: RedirectUrl,
    scopes: Vec<String>,
}

/// OAuth2 authentication manager for Google Drive.
pub struct AuthManager {
    client: OAuthClient,
    http: oauth2::reqwest::Client,
}

impl AuthManager {
    /// Create a new authentication manager.
    ///
    /// # Errors
    /// - Invalid endpoint URLs in the client secret
    /// - HTTP client construction failure
    pub fn new(secret: &ClientSecret) -> Result<Self> {
        let auth_url = AuthUrl::new(secret.auth_uri.clone())
            .map_err(|e| Error::InvalidInput(format!("Invalid auth URL: {}", e)))?;
        let token_url = TokenUrl::new(secret.token_uri.clone())
            .map_err(|e| Error::InvalidInput(format!("Invalid token URL: {}", e)))?;

        let mut client = BasicClient::new(ClientId::new(secret.client_id.clone()))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url);

        if !secret.client_secret.is_empty() {
            client = client.set_client_secret(OAuthClientSecret::new(
                secret.client_secret.expose().to_string(),
            ));
        }

        // Following redirects would expose the token endpoint to SSRF.
        let http = oauth2::reqwest::ClientBuilder::new()
            .redirect(oauth2::reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, http })
    }

    /// Start an authorization for `scopes` redirecting to `redirect_url`.
    ///
    /// Requests offline access with forced consent so a refresh token is
    /// always issued, and binds the request to a PKCE verifier.
    pub fn begin(&self, scopes: &[String], redirect_url: &str) -> Result<PendingAuthorization> {
        let redirect_url = RedirectUrl::new(redirect_url.to_string())
            .map_err(|e| Error::InvalidInput(format!("Invalid redirect URL: {}", e)))?;
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();

        let (url, state) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(scopes.iter().cloned().map(Scope::new))
            .set_pkce_challenge(challenge)
            .set_redirect_uri(Cow::Borrowed(&redirect_url))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();

        Ok(PendingAuthorization {
            url: url.to_string(),
            state,
            verifier,
            redirect_url,
            scopes: scopes.to_vec(),
        })
    }

    /// Exchange an authorization code for tokens.
    ///
    /// # Errors
    /// - Invalid authorization code
    /// - No refresh token in the response
    /// - Network errors
    pub async fn exchange_code(&self, code: &str, pending: PendingAuthorization) -> Result<Tokens> {
        let PendingAuthorization {
            verifier,
            redirect_url,
            scopes,
            ..
        } = pending;

        let token_result = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(verifier)
            .set_redirect_uri(Cow::Owned(redirect_url))
            .request_async(&self.http)
            .await
            .map_err(|e| Error::Authentication(format!("Token exchange failed: {}", e)))?;

        let refresh_token = token_result
            .refresh_token()
            .ok_or_else(|| {
                Error::Authentication("No refresh token received. Ensure 'offline' access and 'consent' prompt were requested.".to_string())
            })?
            .secret()
            .clone();

        let granted = token_result
            .scopes()
            .map(|s| s.iter().map(|scope| scope.to_string()).collect())
            .unwrap_or(scopes);

        Ok(Tokens {
            access_token: SecretString::new(token_result.access_token().secret().clone()),
            refresh_token: SecretString::new(refresh_token),
            expires_at: expiry(token_result.expires_in()),
            scopes: granted,
        })
    }

    /// Refresh an access token using the refresh token.
    ///
    /// # Errors
    /// - Invalid or revoked refresh token
    /// - Network errors
    pub async fn refresh(&self, tokens: &Tokens) -> Result<Tokens> {
        let token_result = self
            .client
            .exchange_refresh_token(&RefreshToken::new(
                tokens.refresh_token.expose().to_string(),
            ))
            .request_async(&self.http)
            .await
            .map_err(|e| Error::Authentication(format!("Token refresh failed: {}", e)))?;

        // Refresh tokens may or may not be returned in refresh response
        let refresh_token = token_result
            .refresh_token()
            .map(|t| SecretString::new(t.secret().clone()))
            .unwrap_or_else(|| tokens.refresh_token.clone());

        Ok(Tokens {
            access_token: SecretString::new(token_result.access_token().secret().clone()),
            refresh_token,
            expires_at: expiry(token_result.expires_in()),
            scopes: tokens.scopes.clone(),
        })
    }
}

fn expiry(expires_in: Option<std::time::Duration>) -> DateTime<Utc> {
    let expires_in = expires_in.unwrap_or_else(|| std::time::Duration::from_secs(3600));
    Utc::now() + Duration::from_std(expires_in).unwrap_or_else(|_| Duration::hours(1))
}

/// Token manager that automatically refreshes expired tokens.
///
/// Refreshed tokens are written back to the store when one is attached.
pub struct TokenManager {
    auth_manager: AuthManager,
    tokens: RwLock<Tokens>,
    store: Option<TokenStore>,
}

impl TokenManager {
    /// Create a new token manager with initial tokens.
    pub fn new(auth_manager: AuthManager, tokens: Tokens) -> Self {
        Self {
            auth_manager,
            tokens: RwLock::new(tokens),
            store: None,
        }
    }

    /// Persist refreshed tokens to `store`.
    pub fn with_store(mut self, store: TokenStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Get a valid access token, refreshing if necessary.
    ///
    /// # Errors
    /// - Token refresh failed
    pub async fn get_access_token(&self) -> Result<String> {
        let tokens = self.tokens.read().await;

        if !tokens.is_expired() {
            return Ok(tokens.access_token.expose().to_string());
        }

        drop(tokens);

        let mut tokens = self.tokens.write().await;

        // Double-check after acquiring write lock
        if !tokens.is_expired() {
            return Ok(tokens.access_token.expose().to_string());
        }

        tracing::info!("Refreshing expired access token");

        let new_tokens = self.auth_manager.refresh(&tokens).await?;

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&new_tokens).await {
                tracing::warn!("Failed to persist refreshed token: {}", e);
            }
        }

        *tokens = new_tokens;

        Ok(tokens.access_token.expose().to_string())
    }
}

#[async_trait::async_trait]
impl crate::credentials::AccessTokenSource for TokenManager {
    async fn access_token(&self) -> Result<String> {
        self.get_access_token().await
    }
}
