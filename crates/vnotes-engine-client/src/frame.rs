//! Wire frames exchanged with the inference engine.
//!
//! The request body is newline-delimited JSON: one `metadata` frame, then any
//! number of `chunk` frames carrying base64 data. Ending the body is the
//! half-close. The engine answers with a single [`ProcessingResult`].

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// One line of the request stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frame {
    Metadata { filename: String, job_id: String },
    Chunk { data: String },
}

impl Frame {
    pub fn metadata(filename: impl Into<String>, job_id: impl Into<String>) -> Self {
        Frame::Metadata {
            filename: filename.into(),
            job_id: job_id.into(),
        }
    }

    pub fn chunk(data: &[u8]) -> Self {
        Frame::Chunk {
            data: STANDARD.encode(data),
        }
    }

    /// Serialize as one NDJSON line.
    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }

    /// Decoded payload of a chunk frame.
    pub fn chunk_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Frame::Chunk { data } => STANDARD.decode(data).ok(),
            Frame::Metadata { .. } => None,
        }
    }
}

/// Status value the engine uses for failed jobs.
pub const STATUS_FAILED: &str = "failed";

/// The engine's single terminal response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingResult {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub error: String,
}

impl ProcessingResult {
    /// The summary on success, the engine's failure reason otherwise.
    ///
    /// An explicit error wins over the status; a `failed` status without an
    /// error message still counts as a failure. A blank summary is a failure
    /// too, since completed jobs always carry one.
    pub fn into_outcome(self) -> Result<String, String> {
        if !self.error.is_empty() {
            return Err(self.error);
        }
        if self.status == STATUS_FAILED {
            return Err("engine reported status failed".to_string());
        }
        if self.summary.trim().is_empty() {
            return Err("engine returned an empty summary".to_string());
        }
        Ok(self.summary)
    }
}
