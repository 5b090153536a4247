//! Conversation session manager.
//!
//! Sessions are anchored to a completed video. The summary is filtered once
//! at creation and frozen. User messages are persisted before the AI call, and
//! a failed call leaves a visible apology in the transcript.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, info_span, warn, Instrument};

use vnotes_ai::prompts::ESSENTIAL_CONTENT_ISSUE;
use vnotes_ai::SummaryAssistant;
use vnotes_firestore::{SessionRepository, VideoRepository};
use vnotes_models::{ConversationSession, Message, NewConversationSession, SessionId, VideoId};

use crate::error::{ServiceError, ServiceResult};

/// First message of every session.
pub const SESSION_CREATED_MESSAGE: &str = "AI assistant session for video analysis created.";

/// Assistant message recorded when a reply could not be generated.
pub const APOLOGY_MESSAGE: &str =
    "Sorry, an error occurred while processing your request. Please try again later.";

/// Result of a successful exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantReply {
    pub message: String,
    pub session_id: SessionId,
    pub time: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ConversationService {
    videos: VideoRepository,
    sessions: SessionRepository,
    assistant: Arc<dyn SummaryAssistant>,
}

impl ConversationService {
    pub fn new(
        videos: VideoRepository,
        sessions: SessionRepository,
        assistant: Arc<dyn SummaryAssistant>,
    ) -> Self {
        Self {
            videos,
            sessions,
            assistant,
        }
    }

    /// Open a session on one of `user_id`'s completed videos.
    ///
    /// The summary goes through the essential-content filter first; if that
    /// call fails the raw summary is used instead.
    pub async fn create_session(
        &self,
        user_id: &str,
        video_id: &VideoId,
        title: &str,
    ) -> ServiceResult<ConversationSession> {
        let video = self
            .videos
            .get(video_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Video not found"))?;
        if video.user_id != user_id {
            return Err(ServiceError::Forbidden);
        }
        let raw_summary = video
            .completed_summary()
            .ok_or(ServiceError::VideoNotReady(video.status))?;

        let issues = [ESSENTIAL_CONTENT_ISSUE.to_string()];
        let summary = match self.assistant.improve_summary(raw_summary, &issues).await {
            Ok(filtered) if !filtered.trim().is_empty() => filtered,
            Ok(_) => {
                warn!(video_id = %video_id, "Summary filter returned nothing, using raw summary");
                raw_summary.to_string()
            }
            Err(e) => {
                warn!(video_id = %video_id, error = %e, "Summary filter failed, using raw summary");
                raw_summary.to_string()
            }
        };

        let title = match title.trim() {
            "" => video.title.clone(),
            t => t.to_string(),
        };

        let session = self
            .sessions
            .create(&NewConversationSession {
                user_id: user_id.to_string(),
                video_id: video_id.clone(),
                title,
                summary,
                messages: vec![Message::system(SESSION_CREATED_MESSAGE)],
            })
            .await?;

        info!(session_id = %session.id, video_id = %video_id, "Conversation session created");
        Ok(session)
    }

    /// Send `text` and return the assistant's reply.
    pub async fn send_message(
        &self,
        user_id: &str,
        session_id: &SessionId,
        text: &str,
    ) -> ServiceResult<AssistantReply> {
        if text.trim().is_empty() {
            return Err(ServiceError::bad_request("Message cannot be empty"));
        }
        let session = self.get_session(user_id, session_id).await?;

        self.sessions
            .append_message(session_id, &Message::user(text))
            .await?;

        let span = info_span!("send_message", session_id = %session_id);
        let reply = self
            .assistant
            .reply(&session.summary, &session.messages, text)
            .instrument(span)
            .await;

        match reply {
            Ok(content) => {
                let message = Message::assistant(content);
                self.sessions.append_message(session_id, &message).await?;
                Ok(AssistantReply {
                    message: message.content,
                    session_id: session_id.clone(),
                    time: message.time,
                })
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Assistant reply failed");
                let apology = Message::assistant(APOLOGY_MESSAGE);
                if let Err(store_err) = self.sessions.append_message(session_id, &apology).await {
                    error!(
                        session_id = %session_id,
                        error = %store_err,
                        "Failed to record apology message"
                    );
                }
                Err(ServiceError::Ai(e))
            }
        }
    }

    pub async fn get_session(
        &self,
        user_id: &str,
        session_id: &SessionId,
    ) -> ServiceResult<ConversationSession> {
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Session not found"))?;
        if !session.is_owned_by(user_id) {
            return Err(ServiceError::Forbidden);
        }
        Ok(session)
    }

    pub async fn list_sessions(&self, user_id: &str) -> ServiceResult<Vec<ConversationSession>> {
        Ok(self.sessions.list_by_user(user_id).await?)
    }

    /// `user_id`'s sessions on one of their videos.
    pub async fn list_video_sessions(
        &self,
        user_id: &str,
        video_id: &VideoId,
    ) -> ServiceResult<Vec<ConversationSession>> {
        let video = self
            .videos
            .get(video_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Video not found"))?;
        if video.user_id != user_id {
            return Err(ServiceError::Forbidden);
        }

        let mut sessions = self.sessions.list_by_video(video_id).await?;
        sessions.retain(|s| s.is_owned_by(user_id));
        Ok(sessions)
    }

    pub async fn rename_session(
        &self,
        user_id: &str,
        session_id: &SessionId,
        title: &str,
    ) -> ServiceResult<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ServiceError::bad_request("Title cannot be empty"));
        }
        self.get_session(user_id, session_id).await?;
        Ok(self.sessions.update_title(session_id, title).await?)
    }

    pub async fn delete_session(&self, user_id: &str, session_id: &SessionId) -> ServiceResult<()> {
        self.get_session(user_id, session_id).await?;
        self.sessions.delete(session_id).await?;
        info!(session_id = %session_id, "Conversation session deleted");
        Ok(())
    }

    // =========================================================================
    // Summary transformations. None of these modify the session.
    // =========================================================================

    pub async fn improve_session_summary(
        &self,
        user_id: &str,
        session_id: &SessionId,
        issues: &[String],
    ) -> ServiceResult<String> {
        let session = self.get_session(user_id, session_id).await?;
        Ok(self
            .assistant
            .improve_summary(&session.summary, issues)
            .await?)
    }

    pub async fn fix_session_summary(
        &self,
        user_id: &str,
        session_id: &SessionId,
    ) -> ServiceResult<String> {
        let session = self.get_session(user_id, session_id).await?;
        Ok(self.assistant.fix_errors(&session.summary).await?)
    }

    /// A fresh summary derived only from the session's dialogue.
    pub async fn summarize_session_dialogue(
        &self,
        user_id: &str,
        session_id: &SessionId,
    ) -> ServiceResult<String> {
        let session = self.get_session(user_id, session_id).await?;
        Ok(self.assistant.compact_dialogue(&session.messages).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use vnotes_ai::{AiError, AiResult};
    use vnotes_firestore::MemoryStore;
    use vnotes_models::{NewVideoJob, Role, VideoJob};

    #[derive(Default)]
    struct FakeAssistant {
        fail_reply: bool,
        fail_improve: bool,
        calls: Mutex<Vec<String>>,
        reply_history_len: Mutex<Option<usize>>,
    }

    impl FakeAssistant {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SummaryAssistant for FakeAssistant {
        async fn reply(&self, summary: &str, history: &[Message], user_text: &str) -> AiResult<String> {
            self.calls.lock().unwrap().push(format!("reply:{}", user_text));
            *self.reply_history_len.lock().unwrap() = Some(history.len());
            if self.fail_reply {
                return Err(AiError::Transport("connection reset".to_string()));
            }
            Ok(format!("about {}", summary))
        }

        async fn improve_summary(&self, summary: &str, issues: &[String]) -> AiResult<String> {
            self.calls.lock().unwrap().push(format!("improve:{}", issues.len()));
            if self.fail_improve {
                return Err(AiError::ServiceUnavailable("no key".to_string()));
            }
            Ok(format!("filtered {}", summary))
        }

        async fn fix_errors(&self, summary: &str) -> AiResult<String> {
            self.calls.lock().unwrap().push("fix".to_string());
            Ok(format!("fixed {}", summary))
        }

        async fn compact_dialogue(&self, messages: &[Message]) -> AiResult<String> {
            self.calls.lock().unwrap().push("compact".to_string());
            Ok(format!("{} messages", messages.len()))
        }
    }

    struct Harness {
        videos: VideoRepository,
        service: ConversationService,
        assistant: Arc<FakeAssistant>,
    }

    fn harness(assistant: FakeAssistant) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let videos = VideoRepository::new(store.clone());
        let assistant = Arc::new(assistant);
        let service = ConversationService::new(
            videos.clone(),
            SessionRepository::new(store),
            assistant.clone(),
        );
        Harness {
            videos,
            service,
            assistant,
        }
    }

    async fn video(videos: &VideoRepository, owner: &str, summary: Option<&str>) -> VideoJob {
        let job = videos
            .create(&NewVideoJob {
                user_id: owner.to_string(),
                title: "lecture.mp4".to_string(),
                url: "/videos/abc".to_string(),
            })
            .await
            .unwrap();
        if let Some(summary) = summary {
            assert!(videos.mark_processing(&job.id).await.unwrap());
            assert!(videos.complete(&job.id, summary).await.unwrap());
        }
        job
    }

    #[tokio::test]
    async fn test_one_exchange_yields_three_messages() {
        let h = harness(FakeAssistant::default());
        let job = video(&h.videos, "u1", Some("S")).await;
        let session = h.service.create_session("u1", &job.id, "Notes").await.unwrap();
        assert_eq!(session.summary, "filtered S");

        let reply = h
            .service
            .send_message("u1", &session.id, "what is it about?")
            .await
            .unwrap();
        assert_eq!(reply.message, "about filtered S");
        assert_eq!(reply.session_id, session.id);

        let stored = h.service.get_session("u1", &session.id).await.unwrap();
        let roles: Vec<Role> = stored.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(stored.messages[0].content, SESSION_CREATED_MESSAGE);
        assert_eq!(stored.messages[1].content, "what is it about?");
        assert_eq!(stored.messages[2].content, "about filtered S");
        assert_eq!(stored.messages[2].time, reply.time);

        // The prompt history is the transcript before this exchange.
        assert_eq!(*h.assistant.reply_history_len.lock().unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_failed_reply_records_apology() {
        let h = harness(FakeAssistant {
            fail_reply: true,
            ..FakeAssistant::default()
        });
        let job = video(&h.videos, "u1", Some("S")).await;
        let session = h.service.create_session("u1", &job.id, "Notes").await.unwrap();

        let err = h
            .service
            .send_message("u1", &session.id, "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Ai(AiError::Transport(_))));

        let stored = h.service.get_session("u1", &session.id).await.unwrap();
        assert_eq!(stored.messages.len(), 3);
        assert_eq!(stored.messages[1].role, Role::User);
        assert_eq!(stored.messages[1].content, "hello");
        assert_eq!(stored.messages[2].role, Role::Assistant);
        assert_eq!(stored.messages[2].content, APOLOGY_MESSAGE);
    }

    #[tokio::test]
    async fn test_filter_failure_falls_back_to_raw_summary() {
        let h = harness(FakeAssistant {
            fail_improve: true,
            ..FakeAssistant::default()
        });
        let job = video(&h.videos, "u1", Some("raw summary")).await;
        let session = h.service.create_session("u1", &job.id, "").await.unwrap();

        assert_eq!(session.summary, "raw summary");
        assert_eq!(session.title, "lecture.mp4");
        assert_eq!(h.assistant.calls(), vec!["improve:1"]);
    }

    #[tokio::test]
    async fn test_create_requires_owned_completed_video() {
        let h = harness(FakeAssistant::default());
        let pending = video(&h.videos, "u1", None).await;
        let err = h.service.create_session("u1", &pending.id, "t").await.unwrap_err();
        assert!(matches!(err, ServiceError::VideoNotReady(_)));

        let other = video(&h.videos, "u2", Some("S")).await;
        let err = h.service.create_session("u1", &other.id, "t").await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden));

        let err = h
            .service
            .create_session("u1", &VideoId::from("missing"), "t")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert!(h.assistant.calls().is_empty());
    }

    #[tokio::test]
    async fn test_session_access_is_owner_only() {
        let h = harness(FakeAssistant::default());
        let job = video(&h.videos, "u1", Some("S")).await;
        let session = h.service.create_session("u1", &job.id, "Notes").await.unwrap();

        let err = h.service.send_message("u2", &session.id, "hi").await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden));
        let err = h.service.delete_session("u2", &session.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden));

        let stored = h.service.get_session("u1", &session.id).await.unwrap();
        assert_eq!(stored.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let h = harness(FakeAssistant::default());
        let job = video(&h.videos, "u1", Some("S")).await;
        let session = h.service.create_session("u1", &job.id, "Notes").await.unwrap();

        let err = h.service.send_message("u1", &session.id, "   ").await.unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_message_is_stored_and_sent_as_typed() {
        let h = harness(FakeAssistant::default());
        let job = video(&h.videos, "u1", Some("S")).await;
        let session = h.service.create_session("u1", &job.id, "Notes").await.unwrap();

        tokio_test::assert_ok!(
            h.service
                .send_message("u1", &session.id, "  two\nlines  ")
                .await
        );

        let stored = h.service.get_session("u1", &session.id).await.unwrap();
        assert_eq!(stored.messages[1].content, "  two\nlines  ");
        assert!(h.assistant.calls().contains(&"reply:  two\nlines  ".to_string()));
    }

    #[tokio::test]
    async fn test_rename_list_and_delete() {
        let h = harness(FakeAssistant::default());
        let job = video(&h.videos, "u1", Some("S")).await;
        let first = h.service.create_session("u1", &job.id, "One").await.unwrap();
        h.service.create_session("u1", &job.id, "Two").await.unwrap();

        h.service.rename_session("u1", &first.id, "Renamed").await.unwrap();
        assert_eq!(
            h.service.get_session("u1", &first.id).await.unwrap().title,
            "Renamed"
        );

        assert_eq!(h.service.list_sessions("u1").await.unwrap().len(), 2);
        assert_eq!(
            h.service.list_video_sessions("u1", &job.id).await.unwrap().len(),
            2
        );
        assert!(matches!(
            h.service.list_video_sessions("u2", &job.id).await.unwrap_err(),
            ServiceError::Forbidden
        ));

        h.service.delete_session("u1", &first.id).await.unwrap();
        assert!(matches!(
            h.service.get_session("u1", &first.id).await.unwrap_err(),
            ServiceError::NotFound(_)
        ));
        assert_eq!(h.service.list_sessions("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transformations_leave_session_unchanged() {
        let h = harness(FakeAssistant::default());
        let job = video(&h.videos, "u1", Some("S")).await;
        let session = h.service.create_session("u1", &job.id, "Notes").await.unwrap();
        h.service.send_message("u1", &session.id, "q").await.unwrap();

        let improved = h
            .service
            .improve_session_summary("u1", &session.id, &["clarity".to_string()])
            .await
            .unwrap();
        assert_eq!(improved, "filtered filtered S");
        assert_eq!(
            h.service.fix_session_summary("u1", &session.id).await.unwrap(),
            "fixed filtered S"
        );
        assert_eq!(
            h.service
                .summarize_session_dialogue("u1", &session.id)
                .await
                .unwrap(),
            "3 messages"
        );

        let stored = h.service.get_session("u1", &session.id).await.unwrap();
        assert_eq!(stored.summary, "filtered S");
        assert_eq!(stored.messages.len(), 3);
    }
}
