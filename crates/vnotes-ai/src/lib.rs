//! Chat-completion client and summary transformations.
//!
//! [`ChatClient`] wraps an OpenAI-compatible endpoint. [`ChatAssistant`]
//! builds the prompts for conversation replies and the summary transforms on
//! top of any [`Completion`] backend.

pub mod assistant;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod prompts;
pub mod types;

pub use assistant::{ChatAssistant, SummaryAssistant};
pub use client::{ChatClient, Completion};
pub use config::ChatConfig;
pub use error::{AiError, AiResult};
pub use types::ChatMessage;
