//! Video submission and read path.
//!
//! Every read is owner-checked: a video that exists but belongs to someone
//! else is `Forbidden`, not `NotFound`.

use serde::Serialize;
use tracing::info;

use vnotes_firestore::VideoRepository;
use vnotes_models::{QuotaSummary, VideoId, VideoJob, VideoStatus};
use vnotes_worker::IngestionService;

use crate::error::{ServiceError, ServiceResult, ACCEPTED};

/// Message returned with every accepted upload.
pub const ACCEPTED_MESSAGE: &str = "Video uploaded and processing started";

/// Acknowledgement of an accepted upload. The job is still `uploaded`.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionAck {
    pub message: String,
    pub video: VideoJob,
}

impl SubmissionAck {
    pub fn http_status(&self) -> u16 {
        ACCEPTED
    }
}

/// Lightweight status view for polling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoStatusView {
    pub id: VideoId,
    pub status: VideoStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Clone)]
pub struct VideoService {
    videos: VideoRepository,
    ingestion: IngestionService,
}

impl VideoService {
    pub fn new(videos: VideoRepository, ingestion: IngestionService) -> Self {
        Self { videos, ingestion }
    }

    /// Accept an upload; processing continues in the background.
    pub async fn submit(
        &self,
        user_id: &str,
        payload: Vec<u8>,
        filename: &str,
    ) -> ServiceResult<SubmissionAck> {
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(ServiceError::bad_request("No file provided"));
        }

        let video = self.ingestion.submit(user_id, payload, filename).await?;
        Ok(SubmissionAck {
            message: ACCEPTED_MESSAGE.to_string(),
            video,
        })
    }

    /// Current month's usage for `user_id`.
    pub async fn usage_summary(&self, user_id: &str) -> ServiceResult<QuotaSummary> {
        Ok(self.ingestion.quota().usage_summary(user_id).await?)
    }

    pub async fn get_video(&self, user_id: &str, video_id: &VideoId) -> ServiceResult<VideoJob> {
        let video = self
            .videos
            .get(video_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Video not found"))?;
        if video.user_id != user_id {
            return Err(ServiceError::Forbidden);
        }
        Ok(video)
    }

    pub async fn video_status(
        &self,
        user_id: &str,
        video_id: &VideoId,
    ) -> ServiceResult<VideoStatusView> {
        let video = self.get_video(user_id, video_id).await?;
        Ok(VideoStatusView {
            id: video.id,
            status: video.status,
            error_message: video.error_message,
        })
    }

    /// All of `user_id`'s videos, newest first.
    pub async fn list_videos(&self, user_id: &str) -> ServiceResult<Vec<VideoJob>> {
        Ok(self.videos.list_by_user(user_id).await?)
    }

    /// The summary of a completed video.
    pub async fn video_result(&self, user_id: &str, video_id: &VideoId) -> ServiceResult<String> {
        let video = self.get_video(user_id, video_id).await?;
        video
            .completed_summary()
            .map(str::to_string)
            .ok_or(ServiceError::VideoNotReady(video.status))
    }

    pub async fn delete_video(&self, user_id: &str, video_id: &VideoId) -> ServiceResult<()> {
        self.get_video(user_id, video_id).await?;
        self.videos.delete(video_id).await?;
        info!(video_id = %video_id, user_id = %user_id, "Video deleted");
        Ok(())
    }
}
