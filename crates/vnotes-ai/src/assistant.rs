//! Summary-aware assistant operations.
//!
//! All four operations share one path: truncate the input, fill a template,
//! call the completion backend.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info_span, warn, Instrument};

use vnotes_models::Message;

use crate::client::Completion;
use crate::error::AiResult;
use crate::metrics::record_request;
use crate::prompts;
use crate::types::ChatMessage;

/// AI transformations over video summaries and conversations.
#[async_trait]
pub trait SummaryAssistant: Send + Sync {
    /// Reply to `user_text` given the session summary and prior messages.
    async fn reply(&self, summary: &str, history: &[Message], user_text: &str) -> AiResult<String>;

    /// Rewrite a summary for quality, optionally focusing on `issues`.
    async fn improve_summary(&self, summary: &str, issues: &[String]) -> AiResult<String>;

    /// Strip noise and errors from a summary.
    async fn fix_errors(&self, summary: &str) -> AiResult<String>;

    /// Derive a summary from the user and assistant turns of a conversation.
    async fn compact_dialogue(&self, messages: &[Message]) -> AiResult<String>;
}

/// [`SummaryAssistant`] backed by a chat-completion endpoint.
#[derive(Clone)]
pub struct ChatAssistant {
    backend: Arc<dyn Completion>,
}

impl ChatAssistant {
    pub fn new(backend: Arc<dyn Completion>) -> Self {
        Self { backend }
    }

    async fn run(&self, operation: &'static str, messages: Vec<ChatMessage>) -> AiResult<String> {
        let span = info_span!("ai_call", operation = operation, messages = messages.len());
        let start = Instant::now();

        let result = self.backend.complete(&messages).instrument(span).await;
        let elapsed = start.elapsed().as_secs_f64();

        match &result {
            Ok(text) => {
                debug!(operation, chars = text.len(), "AI call succeeded");
                record_request(operation, "ok", elapsed);
            }
            Err(e) => {
                warn!(operation, error = %e, "AI call failed");
                record_request(operation, e.kind(), elapsed);
            }
        }
        result
    }

    async fn transform(
        &self,
        operation: &'static str,
        system: &str,
        prompt: String,
    ) -> AiResult<String> {
        self.run(
            operation,
            vec![ChatMessage::system(system), ChatMessage::user(prompt)],
        )
        .await
    }
}

#[async_trait]
impl SummaryAssistant for ChatAssistant {
    async fn reply(&self, summary: &str, history: &[Message], user_text: &str) -> AiResult<String> {
        self.run("reply", prompts::reply_messages(summary, history, user_text))
            .await
    }

    async fn improve_summary(&self, summary: &str, issues: &[String]) -> AiResult<String> {
        self.transform(
            "improve_summary",
            prompts::IMPROVE_SYSTEM,
            prompts::improve_prompt(summary, issues),
        )
        .await
    }

    async fn fix_errors(&self, summary: &str) -> AiResult<String> {
        self.transform("fix_errors", prompts::FIX_SYSTEM, prompts::fix_prompt(summary))
            .await
    }

    async fn compact_dialogue(&self, messages: &[Message]) -> AiResult<String> {
        self.transform(
            "compact_dialogue",
            prompts::COMPACT_SYSTEM,
            prompts::compact_prompt(messages),
        )
        .await
    }
}
