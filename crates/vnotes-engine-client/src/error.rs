//! Engine client error types.

use std::time::Duration;

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to open engine stream: {0}")]
    OpenFailed(String),

    #[error("Failed to send data at byte {offset}: {reason}")]
    SendFailed { offset: u64, reason: String },

    #[error("Failed to receive engine response: {0}")]
    ResponseFailed(String),

    #[error("Engine stream timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Stream already closed")]
    Closed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn open_failed(msg: impl Into<String>) -> Self {
        Self::OpenFailed(msg.into())
    }

    pub fn send_failed(offset: u64, reason: impl Into<String>) -> Self {
        Self::SendFailed {
            offset,
            reason: reason.into(),
        }
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::OpenFailed(_) => "open_failed",
            EngineError::SendFailed { .. } => "send_failed",
            EngineError::ResponseFailed(_) => "response_failed",
            EngineError::Timeout(_) => "timeout",
            EngineError::InvalidResponse(_) => "invalid_response",
            EngineError::Closed => "closed",
            EngineError::Json(_) => "json",
        }
    }
}
