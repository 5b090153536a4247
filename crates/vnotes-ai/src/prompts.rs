//! Prompt templates and the input truncation policy.
//!
//! Every transformation cuts its main input to a fixed character ceiling and
//! appends a marker before filling its template. Limits count Unicode scalar
//! values, so multibyte text is never split mid-character.

use std::borrow::Cow;

use vnotes_models::Message;

use crate::types::ChatMessage;

/// Ceiling for the summary embedded in a conversation preamble.
pub const SESSION_CONTEXT_LIMIT: usize = 8000;
/// Ceiling for the text given to improve, fix and compact.
pub const TRANSFORM_INPUT_LIMIT: usize = 6000;
/// Ceiling for a single message inside a compacted dialogue.
pub const DIALOGUE_MESSAGE_LIMIT: usize = 1000;
/// Prior messages included in a conversation reply prompt.
pub const HISTORY_WINDOW: usize = 10;

pub const TEXT_TRUNCATION_MARKER: &str = "\n\n... (text truncated)";
pub const DIALOGUE_TRUNCATION_MARKER: &str = "\n\n... (dialogue truncated)";
pub const MESSAGE_TRUNCATION_MARKER: &str = "...";

/// Focus issue used to condense a summary when a session is created.
pub const ESSENTIAL_CONTENT_ISSUE: &str = "Delete all non-essential content: irrelevant text, \
personal info, or details that don't support the main context. Keep only key facts, direct \
context, and critical info. Return filtered content concisely.";

const EMPTY_CONTEXT: &str = "Video analysis assistant. Respond in user's language.";

pub const IMPROVE_SYSTEM: &str =
    "Improve text quality. Keep original language. Return only improved text.";
pub const FIX_SYSTEM: &str = "Fix text errors. Keep original language. Return only corrected text.";
pub const COMPACT_SYSTEM: &str = "Create concise summaries. Use same language as input.";

/// Cut `text` to `limit` characters, appending `marker` when anything was dropped.
pub fn truncate_with_marker<'a>(text: &'a str, limit: usize, marker: &str) -> Cow<'a, str> {
    match text.char_indices().nth(limit) {
        Some((byte_idx, _)) => Cow::Owned(format!("{}{}", &text[..byte_idx], marker)),
        None => Cow::Borrowed(text),
    }
}

/// System preamble anchoring a conversation to a video summary.
pub fn session_context(summary: &str) -> String {
    if summary.is_empty() {
        return EMPTY_CONTEXT.to_string();
    }
    let summary = truncate_with_marker(summary, SESSION_CONTEXT_LIMIT, TEXT_TRUNCATION_MARKER);
    format!("Video context:\n{}\n\nRespond in user's language.", summary)
}

/// Full prompt for a conversation reply.
///
/// Only the last [`HISTORY_WINDOW`] entries of `history` are kept.
pub fn reply_messages(summary: &str, history: &[Message], user_text: &str) -> Vec<ChatMessage> {
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    let mut messages = Vec::with_capacity(HISTORY_WINDOW + 2);
    messages.push(ChatMessage::system(session_context(summary)));
    messages.extend(
        history[start..]
            .iter()
            .map(|m| ChatMessage::new(m.role, m.content.clone())),
    );
    messages.push(ChatMessage::user(user_text));
    messages
}

pub fn improve_prompt(summary: &str, issues: &[String]) -> String {
    let summary = truncate_with_marker(summary, TRANSFORM_INPUT_LIMIT, TEXT_TRUNCATION_MARKER);
    let focus = if issues.is_empty() {
        String::new()
    } else {
        format!("Focus on: {}", issues.join(", "))
    };
    format!(
        "Improve this video summary. Keep original language.\n\n{}\n\n{}\n\nReturn only improved summary.",
        summary, focus
    )
}

pub fn fix_prompt(summary: &str) -> String {
    let summary = truncate_with_marker(summary, TRANSFORM_INPUT_LIMIT, TEXT_TRUNCATION_MARKER);
    format!(
        "Clean errors in this summary. Keep original language.\n\n{}\n\nRemove noise, fix errors. Return only corrected text.",
        summary
    )
}

/// Dialogue transcript of the user and assistant turns, one `role: content` line each.
pub fn dialogue_text(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|m| m.role.is_dialogue())
        .map(|m| {
            let content =
                truncate_with_marker(&m.content, DIALOGUE_MESSAGE_LIMIT, MESSAGE_TRUNCATION_MARKER);
            format!("{}: {}\n", m.role, content)
        })
        .collect()
}

pub fn compact_prompt(messages: &[Message]) -> String {
    let dialogue = dialogue_text(messages);
    let dialogue =
        truncate_with_marker(&dialogue, TRANSFORM_INPUT_LIMIT, DIALOGUE_TRUNCATION_MARKER);
    format!(
        "Create video summary from dialogue. Use dialogue language.\n\n{}\n\nExtract key facts and themes. Return only summary.",
        dialogue
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use vnotes_models::Role;

    #[test]
    fn test_truncate_short_text_untouched() {
        assert!(matches!(truncate_with_marker("abc", 3, "!"), Cow::Borrowed("abc")));
    }

    #[test]
    fn test_truncate_counts_characters() {
        let text = "é".repeat(5);
        assert_eq!(truncate_with_marker(&text, 2, "…"), "éé…");
    }

    #[test]
    fn test_session_context_cuts_long_summary() {
        let summary = "a".repeat(9000);
        let context = session_context(&summary);
        let expected = format!(
            "Video context:\n{}{}\n\nRespond in user's language.",
            "a".repeat(8000),
            TEXT_TRUNCATION_MARKER
        );
        assert_eq!(context, expected);
    }

    #[test]
    fn test_session_context_exact_limit_has_no_marker() {
        let context = session_context(&"a".repeat(8000));
        assert!(!context.contains("truncated"));
    }

    #[test]
    fn test_session_context_empty_summary() {
        assert_eq!(session_context(""), EMPTY_CONTEXT);
    }

    #[test]
    fn test_reply_messages_keeps_last_ten() {
        let history: Vec<Message> = (0..25).map(|i| Message::user(format!("m{}", i))).collect();
        let messages = reply_messages("S", &history, "new question");

        assert_eq!(messages.len(), 12);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "m15");
        assert_eq!(messages[10].content, "m24");
        assert_eq!(messages[11], ChatMessage::user("new question"));
    }

    #[test]
    fn test_improve_prompt_with_and_without_issues() {
        assert_eq!(
            improve_prompt("S", &["grammar".to_string(), "tone".to_string()]),
            "Improve this video summary. Keep original language.\n\nS\n\nFocus on: grammar, tone\n\nReturn only improved summary."
        );
        assert_eq!(
            improve_prompt("S", &[]),
            "Improve this video summary. Keep original language.\n\nS\n\n\n\nReturn only improved summary."
        );
    }

    #[test]
    fn test_fix_prompt_truncates_at_six_thousand() {
        let prompt = fix_prompt(&"x".repeat(7000));
        assert!(prompt.contains(&format!("{}{}", "x".repeat(6000), TEXT_TRUNCATION_MARKER)));
        assert!(!prompt.contains(&"x".repeat(6001)));
    }

    #[test]
    fn test_dialogue_text_filters_and_cuts() {
        let messages = vec![
            Message::system("created"),
            Message::user("q".repeat(1200)),
            Message::assistant("short answer"),
        ];
        let text = dialogue_text(&messages);

        assert!(!text.contains("created"));
        assert_eq!(
            text,
            format!("user: {}...\nassistant: short answer\n", "q".repeat(1000))
        );
    }

    #[test]
    fn test_compact_prompt_marks_long_dialogue() {
        let messages: Vec<Message> = (0..10).map(|_| Message::user("w".repeat(900))).collect();
        let prompt = compact_prompt(&messages);
        assert!(prompt.contains(DIALOGUE_TRUNCATION_MARKER));
        assert!(prompt.starts_with("Create video summary from dialogue."));
    }
}
