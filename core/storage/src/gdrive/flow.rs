//! Installed-application consent flow.
//!
//! The user approves access in a browser; Google redirects to a loopback
//! listener owned by this process, which receives the authorization code.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use url::Url;

use driveup_common::{Error, Result};

use crate::credentials::{AuthorizationHandle, CredentialProvider};

use super::auth::{AuthManager, ClientSecret, Tokens, TokenManager};
use super::store::TokenStore;

const SUCCESS_PAGE: &str = "<html><body><h3>Authorization complete.</h3>\
    <p>You can close this window and return to the terminal.</p></body></html>";
const DENIED_PAGE: &str = "<html><body><h3>Authorization was not granted.</h3></body></html>";

/// How long one connection may take to send its request head.
const REQUEST_HEAD_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings for the consent flow.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Where tokens are cached between runs.
    pub token_path: PathBuf,
    /// Loopback port for the redirect (0 picks a free port).
    pub redirect_port: u16,
    /// How long to wait for the user to finish consent.
    pub consent_timeout: Duration,
    /// Try to launch the system browser.
    pub open_browser: bool,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            token_path: TokenStore::default_path(),
            redirect_port: 0,
            consent_timeout: Duration::from_secs(300),
            open_browser: true,
        }
    }
}

/// Credential provider that reuses cached tokens and otherwise runs the
/// browser consent flow.
pub struct InstalledFlowAuthorizer {
    config: FlowConfig,
}

impl InstalledFlowAuthorizer {
    /// Create an authorizer.
    pub fn new(config: FlowConfig) -> Self {
        Self { config }
    }

    /// Token store used by this authorizer.
    pub fn store(&self) -> TokenStore {
        TokenStore::new(&self.config.token_path)
    }

    /// Cached tokens usable for `scopes`, refreshed when expired.
    async fn cached_tokens(
        &self,
        auth: &AuthManager,
        store: &TokenStore,
        scopes: &[String],
    ) -> Option<Tokens> {
        let tokens = match store.load().await {
            Ok(Some(tokens)) => tokens,
            Ok(None) => return None,
            Err(e) => {
                warn!("Ignoring unreadable token cache: {}", e);
                return None;
            }
        };

        if !tokens.covers(scopes) {
            debug!("Cached token lacks requested scopes");
            return None;
        }

        if !tokens.is_expired() {
            return Some(tokens);
        }

        match auth.refresh(&tokens).await {
            Ok(refreshed) => {
                if let Err(e) = store.save(&refreshed).await {
                    warn!("Failed to persist refreshed token: {}", e);
                }
                Some(refreshed)
            }
            Err(e) => {
                warn!("Cached token could not be refreshed: {}", e);
                None
            }
        }
    }

    /// Run the interactive consent flow and persist the result.
    async fn consent(
        &self,
        auth: &AuthManager,
        store: &TokenStore,
        scopes: &[String],
    ) -> Result<Tokens> {
        let listener = TcpListener::bind(("127.0.0.1", self.config.redirect_port))
            .await
            .map_err(|e| {
                Error::Authentication(format!(
                    "Cannot listen for the redirect on port {}: {}",
                    self.config.redirect_port, e
                ))
            })?;
        let port = listener
            .local_addr()
            .map_err(|e| Error::Authentication(format!("Redirect listener has no address: {}", e)))?
            .port();
        let redirect_url = format!("http://127.0.0.1:{}", port);

        let pending = auth.begin(scopes, &redirect_url)?;
        self.present(&pending.url);

        let code = tokio::time::timeout(
            self.config.consent_timeout,
            wait_for_code(&listener, pending.state.secret(), REQUEST_HEAD_TIMEOUT),
        )
        .await
        .map_err(|_| {
            Error::Authentication(format!(
                "No authorization received within {}s",
                self.config.consent_timeout.as_secs()
            ))
        })??;

        let tokens = auth.exchange_code(&code, pending).await?;
        store.save(&tokens).await?;

        Ok(tokens)
    }

    fn present(&self, url: &str) {
        eprintln!("Open this URL in your browser to authorize access:\n\n  {}\n", url);
        if self.config.open_browser {
            if let Err(e) = open::that(url) {
                debug!("Could not launch browser: {}", e);
            }
        }
    }
}

#[async_trait]
impl CredentialProvider for InstalledFlowAuthorizer {
    async fn authorize(
        &self,
        secret_path: &Path,
        scopes: &[String],
    ) -> Result<AuthorizationHandle> {
        let secret = ClientSecret::from_file(secret_path).await?;
        let auth = AuthManager::new(&secret)?;
        let store = self.store();

        let tokens = match self.cached_tokens(&auth, &store, scopes).await {
            Some(tokens) => {
                debug!("Using cached token from {}", store.path().display());
                tokens
            }
            None => self.consent(&auth, &store, scopes).await?,
        };

        info!(
            "Authentication successful. Token data stored at: {}",
            store.path().display()
        );

        let manager = TokenManager::new(auth, tokens).with_store(store);
        Ok(AuthorizationHandle::new(Arc::new(manager)))
    }
}

/// What a redirect request carried.
#[derive(Debug, PartialEq, Eq)]
enum Callback {
    /// Authorization code, state verified.
    Code(String),
    /// The provider reported an error such as `access_denied`.
    Denied(String),
    /// Unrelated or malformed request (favicon, browser preconnects).
    Ignored,
}

/// Parse the request line of a redirect hitting the loopback listener.
///
/// Only a code with the wrong state is an error.
fn parse_callback(request_line: &str, expected_state: &str) -> Result<Callback> {
    let Some(target) = request_line.split_whitespace().nth(1) else {
        return Ok(Callback::Ignored);
    };

    let url = match Url::parse("http://127.0.0.1").and_then(|base| base.join(target)) {
        Ok(url) => url,
        Err(e) => {
            debug!("Ignoring malformed redirect target: {}", e);
            return Ok(Callback::Ignored);
        }
    };

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Ok(Callback::Denied(error));
    }

    match code {
        Some(code) => {
            if state.as_deref() != Some(expected_state) {
                return Err(Error::Authentication(
                    "Authorization state mismatch".to_string(),
                ));
            }
            Ok(Callback::Code(code))
        }
        None => Ok(Callback::Ignored),
    }
}

/// Accept redirect requests until one carries a code or an error.
///
/// Connections that close, stall past `head_timeout` or send garbage are
/// dropped and the wait goes on.
async fn wait_for_code(
    listener: &TcpListener,
    expected_state: &str,
    head_timeout: Duration,
) -> Result<String> {
    loop {
        let (mut stream, _) = listener
            .accept()
            .await
            .map_err(|e| Error::Authentication(format!("Redirect listener failed: {}", e)))?;

        let request_line =
            match tokio::time::timeout(head_timeout, read_request_head(&mut stream)).await {
                Ok(Ok(line)) if !line.trim().is_empty() => line,
                Ok(Ok(_)) => {
                    debug!("Connection closed without a request");
                    continue;
                }
                Ok(Err(e)) => {
                    debug!("Failed to read redirect request: {}", e);
                    continue;
                }
                Err(_) => {
                    debug!("Connection sent no request within {:?}", head_timeout);
                    continue;
                }
            };

        let callback = match parse_callback(&request_line, expected_state) {
            Ok(callback) => callback,
            Err(e) => {
                respond(&mut stream, "400 Bad Request", DENIED_PAGE).await;
                return Err(e);
            }
        };

        match callback {
            Callback::Code(code) => {
                respond(&mut stream, "200 OK", SUCCESS_PAGE).await;
                return Ok(code);
            }
            Callback::Denied(reason) => {
                respond(&mut stream, "200 OK", DENIED_PAGE).await;
                return Err(Error::Authentication(format!(
                    "User declined authorization ({})",
                    reason
                )));
            }
            Callback::Ignored => {
                respond(&mut stream, "404 Not Found", "").await;
            }
        }
    }
}

/// Read the request line and drain the headers.
///
/// Unread bytes left in the socket would turn the close into a reset.
async fn read_request_head(stream: &mut tokio::net::TcpStream) -> Result<String> {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    let mut header = String::new();
    loop {
        header.clear();
        let n = reader.read_line(&mut header).await?;
        if n == 0 || header == "\r\n" || header == "\n" {
            break;
        }
    }

    Ok(request_line)
}

async fn respond(stream: &mut tokio::net::TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    // The browser may already be gone; the code is what matters.
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        debug!("Failed to answer redirect: {}", e);
    }
    let _ = stream.shutdown().await;
}
