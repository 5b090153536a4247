//! Typed repositories for videos, conversation sessions and users.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use vnotes_models::{
    ConversationSession, Message, NewConversationSession, NewVideoJob, PlanTier, QuotaState, Role,
    SessionId, UserRecord, VideoId, VideoJob, VideoStatus,
};

use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_guard_miss;
use crate::store::{DocumentStore, StoredDocument};
use crate::types::{ArrayValue, Fields, FieldsExt, ToFirestoreValue, Value};

pub const VIDEOS_COLLECTION: &str = "videos";
pub const SESSIONS_COLLECTION: &str = "ai_sessions";
pub const USERS_COLLECTION: &str = "users";

fn field<V: ToFirestoreValue>(fields: &mut Fields, key: &str, value: V) {
    fields.insert(key.to_string(), value.to_firestore_value());
}

fn required_time(doc: &StoredDocument, key: &str) -> FirestoreResult<DateTime<Utc>> {
    doc.fields
        .get_as(key)
        .ok_or_else(|| FirestoreError::invalid_document(&doc.id, format!("missing {}", key)))
}

// =============================================================================
// Videos
// =============================================================================

/// Repository for video job documents.
#[derive(Clone)]
pub struct VideoRepository {
    store: Arc<dyn DocumentStore>,
}

impl VideoRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Persist a new job in `uploaded` state.
    pub async fn create(&self, new: &NewVideoJob) -> FirestoreResult<VideoJob> {
        let now = Utc::now();
        let mut fields = Fields::new();
        field(&mut fields, "user_id", new.user_id.as_str());
        field(&mut fields, "title", new.title.as_str());
        field(&mut fields, "url", new.url.as_str());
        field(&mut fields, "status", VideoStatus::Uploaded.as_str());
        field(&mut fields, "summary", None::<String>);
        field(&mut fields, "created_at", now);
        field(&mut fields, "updated_at", now);

        let id = self.store.create(VIDEOS_COLLECTION, fields).await?;
        info!(video_id = %id, user_id = %new.user_id, "Created video record");

        Ok(VideoJob {
            id: VideoId::from(id),
            user_id: new.user_id.clone(),
            title: new.title.clone(),
            url: new.url.clone(),
            status: VideoStatus::Uploaded,
            summary: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a video by ID.
    pub async fn get(&self, video_id: &VideoId) -> FirestoreResult<Option<VideoJob>> {
        self.store
            .get(VIDEOS_COLLECTION, video_id.as_str())
            .await?
            .map(|doc| document_to_video(&doc))
            .transpose()
    }

    /// All videos owned by `user_id`, newest first.
    pub async fn list_by_user(&self, user_id: &str) -> FirestoreResult<Vec<VideoJob>> {
        self.find("user_id", user_id.to_firestore_value()).await
    }

    /// All videos currently in `status`, newest first.
    pub async fn list_by_status(&self, status: VideoStatus) -> FirestoreResult<Vec<VideoJob>> {
        self.find("status", status.as_str().to_firestore_value()).await
    }

    async fn find(&self, key: &str, value: Value) -> FirestoreResult<Vec<VideoJob>> {
        let mut videos = self
            .store
            .find_eq(VIDEOS_COLLECTION, key, value)
            .await?
            .iter()
            .map(document_to_video)
            .collect::<FirestoreResult<Vec<_>>>()?;
        videos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(videos)
    }

    /// Move an `uploaded` job to `processing`.
    ///
    /// Returns `false` without writing when the job is no longer `uploaded`.
    pub async fn mark_processing(&self, video_id: &VideoId) -> FirestoreResult<bool> {
        self.transition(
            video_id,
            VideoStatus::Uploaded,
            VideoStatus::Processing,
            Fields::new(),
        )
        .await
    }

    /// Store the summary and mark a `processing` job completed in one write.
    ///
    /// Returns `false` without writing when the job already left `processing`.
    pub async fn complete(&self, video_id: &VideoId, summary: &str) -> FirestoreResult<bool> {
        let mut fields = Fields::new();
        field(&mut fields, "summary", summary);
        self.transition(
            video_id,
            VideoStatus::Processing,
            VideoStatus::Completed,
            fields,
        )
        .await
    }

    /// Mark a `processing` job failed with a reason in one write. The summary
    /// stays unset.
    ///
    /// Returns `false` without writing when the job already left `processing`.
    pub async fn fail(&self, video_id: &VideoId, error: &str) -> FirestoreResult<bool> {
        let mut fields = Fields::new();
        field(&mut fields, "error_message", error);
        self.transition(
            video_id,
            VideoStatus::Processing,
            VideoStatus::Failed,
            fields,
        )
        .await
    }

    /// Write `to` plus `fields`, guarded on the stored status still being `from`.
    async fn transition(
        &self,
        video_id: &VideoId,
        from: VideoStatus,
        to: VideoStatus,
        mut fields: Fields,
    ) -> FirestoreResult<bool> {
        let to = from
            .transition_to(to)
            .map_err(|e| FirestoreError::invalid_document(video_id.as_str(), e.to_string()))?;
        field(&mut fields, "status", to.as_str());
        field(&mut fields, "updated_at", Utc::now());

        let applied = self
            .store
            .update_if(
                VIDEOS_COLLECTION,
                video_id.as_str(),
                "status",
                &from.as_str().to_firestore_value(),
                fields,
            )
            .await?;
        if !applied {
            record_guard_miss(VIDEOS_COLLECTION);
            debug!(video_id = %video_id, from = %from, to = %to, "Skipped status transition");
        }
        Ok(applied)
    }

    pub async fn delete(&self, video_id: &VideoId) -> FirestoreResult<()> {
        self.store
            .delete(VIDEOS_COLLECTION, video_id.as_str())
            .await?;
        debug!(video_id = %video_id, "Deleted video record");
        Ok(())
    }
}

fn document_to_video(doc: &StoredDocument) -> FirestoreResult<VideoJob> {
    let fields = &doc.fields;
    let status_str = fields.string_or_default("status");
    let status = VideoStatus::parse(&status_str).ok_or_else(|| {
        FirestoreError::invalid_document(&doc.id, format!("unknown status {:?}", status_str))
    })?;

    Ok(VideoJob {
        id: VideoId::from(doc.id.as_str()),
        user_id: fields.string_or_default("user_id"),
        title: fields.string_or_default("title"),
        url: fields.string_or_default("url"),
        status,
        summary: fields.get_as("summary"),
        error_message: fields.get_as("error_message"),
        created_at: required_time(doc, "created_at")?,
        updated_at: required_time(doc, "updated_at")?,
    })
}

// =============================================================================
// Conversation sessions
// =============================================================================

/// Repository for conversation session documents.
#[derive(Clone)]
pub struct SessionRepository {
    store: Arc<dyn DocumentStore>,
}

impl SessionRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, new: &NewConversationSession) -> FirestoreResult<ConversationSession> {
        let now = Utc::now();
        let mut fields = Fields::new();
        field(&mut fields, "user_id", new.user_id.as_str());
        field(&mut fields, "video_id", new.video_id.as_str());
        field(&mut fields, "title", new.title.as_str());
        field(&mut fields, "summary", new.summary.as_str());
        fields.insert(
            "messages".to_string(),
            Value::ArrayValue(ArrayValue {
                values: Some(new.messages.iter().map(message_to_value).collect()),
            }),
        );
        field(&mut fields, "created_at", now);

        let id = self.store.create(SESSIONS_COLLECTION, fields).await?;
        info!(session_id = %id, video_id = %new.video_id, "Created conversation session");

        Ok(ConversationSession {
            id: SessionId::from(id),
            user_id: new.user_id.clone(),
            video_id: new.video_id.clone(),
            title: new.title.clone(),
            summary: new.summary.clone(),
            messages: new.messages.clone(),
            created_at: now,
        })
    }

    pub async fn get(&self, session_id: &SessionId) -> FirestoreResult<Option<ConversationSession>> {
        self.store
            .get(SESSIONS_COLLECTION, session_id.as_str())
            .await?
            .map(|doc| document_to_session(&doc))
            .transpose()
    }

    /// Sessions owned by `user_id`, newest first.
    pub async fn list_by_user(&self, user_id: &str) -> FirestoreResult<Vec<ConversationSession>> {
        self.find("user_id", user_id.to_firestore_value()).await
    }

    /// Sessions anchored to `video_id`, newest first.
    pub async fn list_by_video(&self, video_id: &VideoId) -> FirestoreResult<Vec<ConversationSession>> {
        self.find("video_id", video_id.as_str().to_firestore_value())
            .await
    }

    async fn find(&self, key: &str, value: Value) -> FirestoreResult<Vec<ConversationSession>> {
        let mut sessions = self
            .store
            .find_eq(SESSIONS_COLLECTION, key, value)
            .await?
            .iter()
            .map(document_to_session)
            .collect::<FirestoreResult<Vec<_>>>()?;
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    /// Append one message. Each append is atomic on its own.
    pub async fn append_message(&self, session_id: &SessionId, message: &Message) -> FirestoreResult<()> {
        self.store
            .append(
                SESSIONS_COLLECTION,
                session_id.as_str(),
                "messages",
                vec![message_to_value(message)],
            )
            .await
    }

    pub async fn update_title(&self, session_id: &SessionId, title: &str) -> FirestoreResult<()> {
        let mut fields = Fields::new();
        field(&mut fields, "title", title);
        self.store
            .update(SESSIONS_COLLECTION, session_id.as_str(), fields)
            .await
    }

    pub async fn delete(&self, session_id: &SessionId) -> FirestoreResult<()> {
        self.store
            .delete(SESSIONS_COLLECTION, session_id.as_str())
            .await
    }
}

fn message_to_value(message: &Message) -> Value {
    let mut fields = Fields::new();
    field(&mut fields, "role", message.role.as_str());
    field(&mut fields, "content", message.content.as_str());
    field(&mut fields, "time", message.time);
    Value::map(fields)
}

fn value_to_message(doc_id: &str, value: &Value) -> FirestoreResult<Message> {
    let fields = value
        .map_fields()
        .ok_or_else(|| FirestoreError::invalid_document(doc_id, "message is not a map"))?;
    let role_str = fields.string_or_default("role");
    let role = Role::parse(&role_str).ok_or_else(|| {
        FirestoreError::invalid_document(doc_id, format!("invalid message role {:?}", role_str))
    })?;

    Ok(Message {
        role,
        content: fields.string_or_default("content"),
        time: fields
            .get_as("time")
            .ok_or_else(|| FirestoreError::invalid_document(doc_id, "message without time"))?,
    })
}

fn document_to_session(doc: &StoredDocument) -> FirestoreResult<ConversationSession> {
    let fields = &doc.fields;
    let messages = fields
        .get("messages")
        .map(|v| {
            v.array_items()
                .iter()
                .map(|m| value_to_message(&doc.id, m))
                .collect::<FirestoreResult<Vec<_>>>()
        })
        .transpose()?
        .unwrap_or_default();

    Ok(ConversationSession {
        id: SessionId::from(doc.id.as_str()),
        user_id: fields.string_or_default("user_id"),
        video_id: VideoId::from(fields.string_or_default("video_id")),
        title: fields.string_or_default("title"),
        summary: fields.string_or_default("summary"),
        messages,
        created_at: required_time(doc, "created_at")?,
    })
}

// =============================================================================
// Users
// =============================================================================

/// Quota view over identity provider user documents.
///
/// Only the plan and quota fields are read, and only the quota fields are
/// written; every other profile field is left untouched.
#[derive(Clone)]
pub struct UserRepository {
    store: Arc<dyn DocumentStore>,
}

impl UserRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, user_id: &str) -> FirestoreResult<Option<UserRecord>> {
        Ok(self
            .store
            .get(USERS_COLLECTION, user_id)
            .await?
            .map(|doc| document_to_user(&doc)))
    }

    /// Persist the quota counters of `user`.
    pub async fn update_quota(&self, user: &UserRecord) -> FirestoreResult<()> {
        self.store
            .update(USERS_COLLECTION, &user.id, quota_to_fields(&user.quota))
            .await
    }
}

/// Field layout of the quota counters inside a user document.
pub fn quota_to_fields(quota: &QuotaState) -> Fields {
    let mut fields = Fields::new();
    field(&mut fields, "monthly_analyses_used", quota.monthly_used);
    field(&mut fields, "analyses_count", quota.total_used);
    field(&mut fields, "last_reset_month", quota.last_reset_month);
    field(&mut fields, "last_reset_year", quota.last_reset_year);
    field(&mut fields, "last_analysis_date", quota.last_used_at);
    fields
}

fn document_to_user(doc: &StoredDocument) -> UserRecord {
    let fields = &doc.fields;
    UserRecord {
        id: doc.id.clone(),
        plan: PlanTier::from_str(&fields.string_or_default("subscription")),
        quota: QuotaState {
            monthly_used: fields.get_as("monthly_analyses_used").unwrap_or(0),
            total_used: fields.get_as("analyses_count").unwrap_or(0),
            last_reset_month: fields.get_as("last_reset_month").unwrap_or(0),
            last_reset_year: fields.get_as("last_reset_year").unwrap_or(0),
            last_used_at: fields.get_as("last_analysis_date"),
        },
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new())
    }

    fn new_video(user: &str) -> NewVideoJob {
        NewVideoJob {
            user_id: user.to_string(),
            title: "lecture.mp4".to_string(),
            url: "/videos/abc".to_string(),
        }
    }

    #[tokio::test]
    async fn test_video_lifecycle_writes() {
        let repo = VideoRepository::new(store());
        let job = repo.create(&new_video("u1")).await.unwrap();
        assert_eq!(job.status, VideoStatus::Uploaded);

        assert!(repo.mark_processing(&job.id).await.unwrap());
        let read = repo.get(&job.id).await.unwrap().unwrap();
        assert_eq!(read.status, VideoStatus::Processing);
        assert!(read.summary.is_none());

        assert!(repo.complete(&job.id, "X").await.unwrap());
        let read = repo.get(&job.id).await.unwrap().unwrap();
        assert_eq!(read.status, VideoStatus::Completed);
        assert_eq!(read.summary.as_deref(), Some("X"));
        assert!(read.summary_matches_status());
    }

    #[tokio::test]
    async fn test_video_fail_keeps_summary_unset() {
        let repo = VideoRepository::new(store());
        let job = repo.create(&new_video("u1")).await.unwrap();
        assert!(repo.mark_processing(&job.id).await.unwrap());
        assert!(repo.fail(&job.id, "bad codec").await.unwrap());

        let read = repo.get(&job.id).await.unwrap().unwrap();
        assert_eq!(read.status, VideoStatus::Failed);
        assert_eq!(read.summary, None);
        assert_eq!(read.error_message.as_deref(), Some("bad codec"));
    }

    #[tokio::test]
    async fn test_terminal_status_is_never_left() {
        let repo = VideoRepository::new(store());
        let job = repo.create(&new_video("u1")).await.unwrap();
        assert!(repo.mark_processing(&job.id).await.unwrap());
        assert!(!repo.mark_processing(&job.id).await.unwrap());

        assert!(repo.fail(&job.id, "timed out").await.unwrap());
        assert!(!repo.complete(&job.id, "X").await.unwrap());
        assert!(!repo.fail(&job.id, "again").await.unwrap());

        let read = repo.get(&job.id).await.unwrap().unwrap();
        assert_eq!(read.status, VideoStatus::Failed);
        assert_eq!(read.summary, None);
        assert_eq!(read.error_message.as_deref(), Some("timed out"));
    }

    #[tokio::test]
    async fn test_terminal_write_requires_processing() {
        let repo = VideoRepository::new(store());
        let job = repo.create(&new_video("u1")).await.unwrap();
        assert!(!repo.complete(&job.id, "X").await.unwrap());

        let read = repo.get(&job.id).await.unwrap().unwrap();
        assert_eq!(read.status, VideoStatus::Uploaded);
        assert!(read.summary.is_none());
    }

    #[tokio::test]
    async fn test_video_listing_is_per_user() {
        let repo = VideoRepository::new(store());
        repo.create(&new_video("u1")).await.unwrap();
        repo.create(&new_video("u1")).await.unwrap();
        repo.create(&new_video("u2")).await.unwrap();

        assert_eq!(repo.list_by_user("u1").await.unwrap().len(), 2);
        assert_eq!(repo.list_by_status(VideoStatus::Uploaded).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_mark_processing_missing_video_fails() {
        let repo = VideoRepository::new(store());
        let err = repo.mark_processing(&VideoId::from("missing")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_session_messages_append_in_order() {
        let repo = SessionRepository::new(store());
        let session = repo
            .create(&NewConversationSession {
                user_id: "u1".to_string(),
                video_id: VideoId::from("v1"),
                title: "Chat".to_string(),
                summary: "S".to_string(),
                messages: vec![Message::system("created")],
            })
            .await
            .unwrap();

        repo.append_message(&session.id, &Message::user("hi")).await.unwrap();
        repo.append_message(&session.id, &Message::assistant("hello")).await.unwrap();
        repo.update_title(&session.id, "Renamed").await.unwrap();

        let read = repo.get(&session.id).await.unwrap().unwrap();
        let roles: Vec<Role> = read.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(read.title, "Renamed");
        assert_eq!(repo.list_by_video(&VideoId::from("v1")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_session_with_unknown_role_is_rejected() {
        let store = store();
        let mut bad = Fields::new();
        field(&mut bad, "role", "tool");
        field(&mut bad, "content", "x");
        field(&mut bad, "time", Utc::now());
        let mut fields = Fields::new();
        field(&mut fields, "created_at", Utc::now());
        fields.insert(
            "messages".to_string(),
            Value::ArrayValue(ArrayValue {
                values: Some(vec![Value::map(bad)]),
            }),
        );
        store.insert(SESSIONS_COLLECTION, "s1", fields).await;

        let repo = SessionRepository::new(store);
        let err = repo.get(&SessionId::from("s1")).await.unwrap_err();
        assert!(matches!(err, FirestoreError::InvalidDocument(_, _)));
    }

    #[tokio::test]
    async fn test_user_quota_update_leaves_profile_fields() {
        let store = store();
        let mut fields = Fields::new();
        field(&mut fields, "email", "a@example.com");
        field(&mut fields, "subscription", "premium");
        store.insert(USERS_COLLECTION, "u1", fields).await;

        let repo = UserRepository::new(store.clone());
        let mut user = repo.get("u1").await.unwrap().unwrap();
        assert_eq!(user.plan, PlanTier::Premium);
        assert_eq!(user.quota, QuotaState::default());

        user.quota.record_use(Utc::now());
        repo.update_quota(&user).await.unwrap();

        let reread = repo.get("u1").await.unwrap().unwrap();
        assert_eq!(reread.quota.monthly_used, 1);
        let raw = store.get(USERS_COLLECTION, "u1").await.unwrap().unwrap();
        assert_eq!(raw.fields.string_or_default("email"), "a@example.com");
    }
}
