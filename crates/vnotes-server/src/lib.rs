//! VidNotes services.
//!
//! This crate provides:
//! - The video service: upload acknowledgement and the owner-checked read path
//! - The conversation session manager
//! - Application state wiring every collaborator from the environment
//! - Telemetry setup shared by the binaries
//!
//! HTTP routing is left to the embedding surface; every error carries the
//! status it should map to.

pub mod config;
pub mod error;
pub mod sessions;
pub mod state;
pub mod telemetry;
pub mod videos;

pub use config::{ServerConfig, StoreBackend};
pub use error::{ServiceError, ServiceResult};
pub use sessions::{AssistantReply, ConversationService};
pub use state::AppState;
pub use videos::{SubmissionAck, VideoService, VideoStatusView};
