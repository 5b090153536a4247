//! Inference client error types.

use thiserror::Error;

pub type AiResult<T> = Result<T, AiError>;

#[derive(Debug, Error)]
pub enum AiError {
    /// No API key configured; raised before any network call.
    #[error("AI service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Remote error ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("Empty response from AI service")]
    EmptyResponse,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl AiError {
    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        Self::Remote {
            status,
            message: message.into(),
        }
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AiError::ServiceUnavailable(_) => "service_unavailable",
            AiError::Transport(_) => "transport",
            AiError::Remote { .. } => "remote",
            AiError::EmptyResponse => "empty_response",
            AiError::InvalidResponse(_) => "invalid_response",
        }
    }
}
