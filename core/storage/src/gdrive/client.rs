//! Google Drive API client.

use bytes::Bytes;
use futures::{stream, StreamExt};
use reqwest::{header, Body, Client, StatusCode};
use serde::Deserialize;
use uuid::Uuid;

use async_trait::async_trait;
use driveup_common::{Error, Result};

use crate::credentials::AuthorizationHandle;
use crate::provider::{
    ByteStream, FailureKind, FileMetadata, RemoteFile, StorageClient, UploadFailure,
};

/// Google Drive upload API base URL.
const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
/// Fields requested back from a create call.
const UPLOAD_FIELDS: &str = "id,name";
/// Default HTTP user agent.
const USER_AGENT: &str = concat!("driveup/", env!("CARGO_PKG_VERSION"));

/// Error body returned by Google APIs.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorItem {
    #[serde(default)]
    reason: String,
}

/// Google Drive API client.
pub struct DriveClient {
    http: Client,
    upload_base: String,
}

impl DriveClient {
    /// Create a new Drive client.
    ///
    /// # Errors
    /// - HTTP client construction failure
    pub fn new() -> Result<Self> {
        Self::with_user_agent(USER_AGENT)
    }

    /// Create a client sending `user_agent`.
    pub fn with_user_agent(user_agent: &str) -> Result<Self> {
        let http = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            upload_base: DRIVE_UPLOAD_BASE.to_string(),
        })
    }

    /// Point uploads at a different API root.
    pub fn with_upload_base(mut self, upload_base: impl Into<String>) -> Self {
        self.upload_base = upload_base.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl StorageClient for DriveClient {
    fn name(&self) -> &str {
        "gdrive"
    }

    async fn create_with_media(
        &self,
        auth: &AuthorizationHandle,
        metadata: &FileMetadata,
        content: ByteStream,
        content_type: &str,
    ) -> std::result::Result<RemoteFile, UploadFailure> {
        if content_type.contains(['\r', '\n']) {
            return Err(UploadFailure::new(
                FailureKind::Rejected,
                format!("Invalid content type: {:?}", content_type),
            ));
        }

        let bearer = auth
            .bearer()
            .await
            .map_err(|e| UploadFailure::new(FailureKind::Unauthorized, e.to_string()))?;

        let metadata_json = serde_json::to_string(metadata).map_err(|e| {
            UploadFailure::new(
                FailureKind::Rejected,
                format!("Failed to serialize metadata: {}", e),
            )
        })?;

        let boundary = format!("driveup-{}", Uuid::new_v4().simple());
        let body = multipart_body(&boundary, &metadata_json, content_type, content);
        let url = format!("{}/files", self.upload_base);

        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, bearer)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .query(&[("uploadType", "multipart"), ("fields", UPLOAD_FIELDS)])
            .body(Body::wrap_stream(body))
            .send()
            .await
            .map_err(|e| {
                UploadFailure::new(
                    FailureKind::Transport,
                    format!("Failed to upload file: {}", e),
                )
            })?;

        let status = response.status();

        if status.is_success() {
            response.json::<RemoteFile>().await.map_err(|e| {
                UploadFailure::new(
                    FailureKind::Transport,
                    format!("Failed to parse upload response: {}", e),
                )
            })
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(classify_failure(status, &body))
        }
    }
}

/// Frame metadata and streamed content as a `multipart/related` body.
fn multipart_body(
    boundary: &str,
    metadata_json: &str,
    content_type: &str,
    content: ByteStream,
) -> ByteStream {
    let head = format!(
        "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{meta}\r\n--{b}\r\nContent-Type: {ct}\r\n\r\n",
        b = boundary,
        meta = metadata_json,
        ct = content_type,
    );
    let tail = format!("\r\n--{}--", boundary);

    Box::pin(
        stream::once(async move { Ok(Bytes::from(head)) })
            .chain(content)
            .chain(stream::once(async move { Ok(Bytes::from(tail)) })),
    )
}

/// Turn a non-success response into an upload failure.
fn classify_failure(status: StatusCode, body: &str) -> UploadFailure {
    let parsed = serde_json::from_str::<ApiErrorResponse>(body).ok();

    let quota_reason = parsed.as_ref().is_some_and(|r| {
        r.error.errors.iter().any(|item| {
            let reason = item.reason.to_ascii_lowercase();
            reason.contains("quota") || reason.contains("ratelimit")
        })
    });

    let kind = if status == StatusCode::UNAUTHORIZED {
        FailureKind::Unauthorized
    } else if status == StatusCode::TOO_MANY_REQUESTS || quota_reason {
        FailureKind::Quota
    } else {
        FailureKind::Rejected
    };

    let message = match parsed {
        Some(r) if !r.error.message.is_empty() => r.error.message,
        _ => format!("API error: {} - {}", status, body),
    };

    UploadFailure::new(kind, message)
}
