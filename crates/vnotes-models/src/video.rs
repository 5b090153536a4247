//! Video job models and the processing state machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned identifier of a video job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Video processing status.
///
/// Jobs move `uploaded -> processing -> {completed, failed}` and never leave a
/// terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    /// File received, background processing not started yet
    #[default]
    Uploaded,
    /// File is being streamed to the inference engine
    Processing,
    /// Engine returned a summary
    Completed,
    /// Processing failed
    Failed,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Uploaded => "uploaded",
            VideoStatus::Processing => "processing",
            VideoStatus::Completed => "completed",
            VideoStatus::Failed => "failed",
        }
    }

    /// Parse a stored status string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uploaded" => Some(VideoStatus::Uploaded),
            "processing" => Some(VideoStatus::Processing),
            "completed" => Some(VideoStatus::Completed),
            "failed" => Some(VideoStatus::Failed),
            _ => None,
        }
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, VideoStatus::Completed | VideoStatus::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: VideoStatus) -> bool {
        matches!(
            (self, next),
            (VideoStatus::Uploaded, VideoStatus::Processing)
                | (VideoStatus::Processing, VideoStatus::Completed)
                | (VideoStatus::Processing, VideoStatus::Failed)
        )
    }

    /// Validate a transition, returning an error for illegal moves.
    pub fn transition_to(self, next: VideoStatus) -> Result<VideoStatus, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition { from: self, to: next })
        }
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid video status transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: VideoStatus,
    pub to: VideoStatus,
}

/// A video submitted for processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoJob {
    /// Store-assigned ID
    pub id: VideoId,

    /// Owner (identity provider user ID)
    pub user_id: String,

    /// Original filename
    pub title: String,

    /// Storage locator of the uploaded file
    pub url: String,

    /// Processing status
    #[serde(default)]
    pub status: VideoStatus,

    /// Engine summary, present only once completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Processing error, present only once failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VideoJob {
    /// True when `summary` is set exactly for completed jobs.
    pub fn summary_matches_status(&self) -> bool {
        let has_summary = self.summary.as_deref().is_some_and(|s| !s.is_empty());
        has_summary == (self.status == VideoStatus::Completed)
    }

    /// Summary text if the job completed.
    pub fn completed_summary(&self) -> Option<&str> {
        match self.status {
            VideoStatus::Completed => self.summary.as_deref(),
            _ => None,
        }
    }
}

/// Fields supplied when creating a video job; the store assigns the ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVideoJob {
    pub user_id: String,
    pub title: String,
    pub url: String,
}
