//! Worker error types.
//!
//! [`SubmitError`] is returned synchronously to the submitting caller.
//! [`ProcessError`] only ever ends a background job; it is logged and stored
//! as the job's `error_message`.

use std::time::Duration;

use thiserror::Error;

use vnotes_engine_client::EngineError;
use vnotes_firestore::FirestoreError;
use vnotes_models::VideoStatus;

pub type SubmitResult<T> = Result<T, SubmitError>;
pub type ProcessResult<T> = Result<T, ProcessError>;
pub type QuotaResult<T> = Result<T, QuotaError>;

/// Rejected worker configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "STALE_JOB_THRESHOLD_SECS ({threshold:?}) must exceed ENGINE_TIMEOUT_SECS ({engine_timeout:?})"
    )]
    StaleThresholdTooShort {
        threshold: Duration,
        engine_timeout: Duration,
    },
}

/// Quota lookup failures.
#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Quota store error: {0}")]
    Store(#[from] FirestoreError),
}

/// Admission-time failures.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Monthly analysis limit exceeded ({used}/{limit})")]
    QuotaExceeded { used: u32, limit: u32 },

    #[error("Uploaded file is empty")]
    EmptyPayload,

    #[error("Failed to create video record: {0}")]
    CreateFailed(#[source] FirestoreError),

    #[error("Quota unavailable: {0}")]
    QuotaUnavailable(#[from] QuotaError),

    #[error("Service is shutting down")]
    ShuttingDown,
}

impl SubmitError {
    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SubmitError::QuotaExceeded { .. } => "quota_exceeded",
            SubmitError::EmptyPayload => "empty_payload",
            SubmitError::CreateFailed(_) => "create_failed",
            SubmitError::QuotaUnavailable(_) => "quota_unavailable",
            SubmitError::ShuttingDown => "shutting_down",
        }
    }
}

/// Processing-time failures. Each ends the job in `failed`.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to open engine stream: {0}")]
    TransportOpenFailed(String),

    #[error("Failed to send to engine: {0}")]
    ChunkSendFailed(String),

    #[error("Failed to receive engine response: {0}")]
    ResponseFailed(String),

    #[error("Processing failed: {0}")]
    EngineReportedFailure(String),

    #[error("Failed to persist job state: {0}")]
    PersistFailed(#[source] FirestoreError),

    #[error("Processing timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Job was no longer {0} when its status was written")]
    StatusChanged(VideoStatus),
}

impl ProcessError {
    /// Classify an engine error by the stage it occurred in.
    pub fn from_engine(err: EngineError) -> Self {
        match err {
            EngineError::OpenFailed(msg) => ProcessError::TransportOpenFailed(msg),
            EngineError::SendFailed { .. } | EngineError::Closed => {
                ProcessError::ChunkSendFailed(err.to_string())
            }
            EngineError::Timeout(after) => ProcessError::TimedOut(after),
            EngineError::ResponseFailed(_)
            | EngineError::InvalidResponse(_)
            | EngineError::Json(_) => ProcessError::ResponseFailed(err.to_string()),
        }
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProcessError::TransportOpenFailed(_) => "transport_open_failed",
            ProcessError::ChunkSendFailed(_) => "chunk_send_failed",
            ProcessError::ResponseFailed(_) => "response_failed",
            ProcessError::EngineReportedFailure(_) => "engine_reported_failure",
            ProcessError::PersistFailed(_) => "persist_failed",
            ProcessError::TimedOut(_) => "timed_out",
            ProcessError::StatusChanged(_) => "status_changed",
        }
    }
}
