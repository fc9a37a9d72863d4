//! Per-file upload outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Detail recorded for paths that do not exist locally.
pub const FILE_NOT_FOUND: &str = "file not found";

/// Terminal state of one requested upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// The local file did not exist; nothing was sent.
    Skipped,
    /// The remote file was created.
    Succeeded,
    /// The upload was attempted and failed.
    Failed,
}

impl UploadStatus {
    /// Console tag for this status.
    pub fn tag(&self) -> &'static str {
        match self {
            UploadStatus::Skipped => "SKIPPED",
            UploadStatus::Succeeded => "SUCCESS",
            UploadStatus::Failed => "ERROR",
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// What happened to one requested path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    /// The path as requested.
    pub path: String,
    /// Terminal status.
    pub status: UploadStatus,
    /// Remote ID, only when succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    /// Reason, only when skipped or failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl UploadOutcome {
    /// Outcome for a path that was not found locally.
    pub fn skipped(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status: UploadStatus::Skipped,
            remote_id: None,
            detail: Some(FILE_NOT_FOUND.to_string()),
        }
    }

    /// Outcome for a created remote file.
    pub fn succeeded(path: impl Into<String>, remote_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status: UploadStatus::Succeeded,
            remote_id: Some(remote_id.into()),
            detail: None,
        }
    }

    /// Outcome for a failed attempt.
    pub fn failed(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status: UploadStatus::Failed,
            remote_id: None,
            detail: Some(detail.into()),
        }
    }

    /// Remote ID for successes, otherwise the detail.
    pub fn summary_text(&self) -> &str {
        match self.status {
            UploadStatus::Succeeded => self.remote_id.as_deref().unwrap_or_default(),
            UploadStatus::Skipped | UploadStatus::Failed => {
                self.detail.as_deref().unwrap_or_default()
            }
        }
    }
}

/// Counts per status over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    /// Tally a sequence of outcomes.
    pub fn from_outcomes(outcomes: &[UploadOutcome]) -> Self {
        outcomes
            .iter()
            .fold(Self::default(), |mut summary, outcome| {
                match outcome.status {
                    UploadStatus::Succeeded => summary.succeeded += 1,
                    UploadStatus::Skipped => summary.skipped += 1,
                    UploadStatus::Failed => summary.failed += 1,
                }
                summary
            })
    }

    /// Number of outcomes tallied.
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }

    /// Whether anything was skipped or failed.
    pub fn is_partial(&self) -> bool {
        self.skipped > 0 || self.failed > 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} uploaded, {} skipped, {} failed",
            self.succeeded, self.skipped, self.failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_fill_the_right_fields() {
        let skipped = UploadOutcome::skipped("missing.jpg");
        assert_eq!(skipped.status, UploadStatus::Skipped);
        assert_eq!(skipped.detail.as_deref(), Some(FILE_NOT_FOUND));
        assert!(skipped.remote_id.is_none());

        let ok = UploadOutcome::succeeded("a.jpg", "id-a");
        assert_eq!(ok.remote_id.as_deref(), Some("id-a"));
        assert!(ok.detail.is_none());

        let failed = UploadOutcome::failed("b.jpg", "quota exceeded");
        assert_eq!(failed.detail.as_deref(), Some("quota exceeded"));
        assert!(failed.remote_id.is_none());
    }

    #[test]
    fn test_summary_text() {
        assert_eq!(UploadOutcome::succeeded("a", "X1").summary_text(), "X1");
        assert_eq!(UploadOutcome::failed("a", "boom").summary_text(), "boom");
        assert_eq!(UploadOutcome::skipped("a").summary_text(), FILE_NOT_FOUND);
    }

    #[test]
    fn test_run_summary() {
        let outcomes = vec![
            UploadOutcome::succeeded("a", "1"),
            UploadOutcome::skipped("b"),
            UploadOutcome::failed("c", "x"),
            UploadOutcome::succeeded("d", "2"),
        ];
        let summary = RunSummary::from_outcomes(&outcomes);

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total(), 4);
        assert!(summary.is_partial());
        assert_eq!(summary.to_string(), "2 uploaded, 1 skipped, 1 failed");
    }

    #[test]
    fn test_clean_run_is_not_partial() {
        let summary = RunSummary::from_outcomes(&[UploadOutcome::succeeded("a", "1")]);
        assert!(!summary.is_partial());
        assert!(!RunSummary::default().is_partial());
    }

    #[test]
    fn test_outcome_json_shape() {
        let json = serde_json::to_value(UploadOutcome::succeeded("a.jpg", "X1")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"path": "a.jpg", "status": "succeeded", "remoteId": "X1"})
        );
    }
}
