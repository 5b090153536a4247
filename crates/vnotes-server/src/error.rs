//! Service error types.
//!
//! [`ServiceError`] is what callers of the services see. `http_status` gives
//! the status an outer HTTP surface should answer with.

use thiserror::Error;

use vnotes_ai::AiError;
use vnotes_firestore::FirestoreError;
use vnotes_models::VideoStatus;
use vnotes_worker::{QuotaError, SubmitError};

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Status for an accepted upload that has not been processed yet.
pub const ACCEPTED: u16 = 202;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Access denied")]
    Forbidden,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Video processing not completed (status: {0})")]
    VideoNotReady(VideoStatus),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error(transparent)]
    Quota(#[from] QuotaError),

    #[error("AI service error: {0}")]
    Ai(#[from] AiError),

    #[error("Store error: {0}")]
    Store(#[from] FirestoreError),
}

impl ServiceError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// HTTP status an outer surface should map this error to.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::NotFound(_) => 404,
            ServiceError::Forbidden => 403,
            ServiceError::BadRequest(_) => 400,
            ServiceError::VideoNotReady(_) => 409,
            ServiceError::Submit(e) => match e {
                SubmitError::QuotaExceeded { .. } => 429,
                SubmitError::EmptyPayload => 400,
                SubmitError::QuotaUnavailable(QuotaError::UserNotFound(_)) => 404,
                SubmitError::QuotaUnavailable(QuotaError::Store(_)) => 503,
                SubmitError::ShuttingDown => 503,
                SubmitError::CreateFailed(_) => 500,
            },
            ServiceError::Quota(QuotaError::UserNotFound(_)) => 404,
            ServiceError::Quota(QuotaError::Store(_)) => 503,
            ServiceError::Ai(e) => match e {
                AiError::ServiceUnavailable(_) => 503,
                AiError::Transport(_)
                | AiError::Remote { .. }
                | AiError::EmptyResponse
                | AiError::InvalidResponse(_) => 502,
            },
            ServiceError::Store(e) => match e.http_status() {
                Some(404) => 404,
                _ => 500,
            },
        }
    }

    /// Whether the message is safe to show to an end user as is.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.http_status())
    }
}
