//! Video ingestion for the VidNotes backend.
//!
//! This crate provides:
//! - The quota gate deciding whether a user may submit another video
//! - The ingestion service: submit, then process on a detached task
//! - A process-wide job supervisor with bounded concurrency and graceful shutdown
//! - An opt-in sweep for jobs stuck in `processing`

pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod quota;
pub mod stale;
pub mod supervisor;

#[cfg(test)]
mod testing;

pub use config::WorkerConfig;
pub use error::{
    ConfigError, ProcessError, ProcessResult, QuotaError, QuotaResult, SubmitError, SubmitResult,
};
pub use ingest::{IngestionService, JobProcessor};
pub use logging::JobLogger;
pub use quota::{Admission, QuotaGate};
pub use stale::StaleJobDetector;
pub use supervisor::{JobSupervisor, SupervisorClosed};
