//! Google Drive backend for driveup.
//!
//! This module provides:
//! - Client-secret parsing and OAuth2 token exchange/refresh
//! - An installed-app consent flow over a loopback redirect
//! - On-disk token persistence so later runs skip consent
//! - A `StorageClient` issuing single-request multipart uploads

pub mod auth;
pub mod client;
pub mod flow;
pub mod store;

pub use auth::{AuthManager, ClientSecret, PendingAuthorization, TokenManager, Tokens};
pub use client::DriveClient;
pub use flow::{FlowConfig, InstalledFlowAuthorizer};
pub use store::TokenStore;

/// Scope granting access to files created or opened by the app.
pub const DRIVE_FILE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";
