//! Shared data models for the VidNotes backend.
//!
//! This crate provides Serde-serializable types for:
//! - Video jobs and their processing state machine
//! - Conversation sessions and messages
//! - Plans and per-user analysis quota

pub mod plan;
pub mod quota;
pub mod session;
pub mod video;

// Re-export common types
pub use plan::PlanTier;
pub use quota::{QuotaState, QuotaSummary, UserRecord};
pub use session::{ConversationSession, Message, NewConversationSession, Role, SessionId};
pub use video::{InvalidTransition, NewVideoJob, VideoId, VideoJob, VideoStatus};
