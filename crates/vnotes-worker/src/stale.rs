//! Background sweep for jobs stuck in `processing`.
//!
//! A crash between the `processing` write and the terminal write leaves a job
//! stuck. When enabled, this detector periodically fails every `processing`
//! job whose last update is older than the threshold. The threshold must
//! exceed the engine timeout so live jobs are never swept.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{error, info, warn};

use vnotes_firestore::{FirestoreResult, VideoRepository};
use vnotes_models::VideoStatus;

use crate::config::WorkerConfig;
use crate::metrics;

/// Error recorded on swept jobs.
pub const STALE_JOB_MESSAGE: &str =
    "Processing timed out. The worker may have crashed. Please try again.";

/// Stale job detector service.
pub struct StaleJobDetector {
    videos: VideoRepository,
    threshold: Duration,
    check_interval: Duration,
    enabled: bool,
}

impl StaleJobDetector {
    pub fn new(videos: VideoRepository, config: &WorkerConfig) -> Self {
        Self {
            videos,
            threshold: config.stale_threshold,
            check_interval: config.stale_check_interval,
            enabled: config.stale_detection_enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Run the detection loop until `shutdown` flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if !self.enabled {
            info!("Stale job detection is disabled");
            return;
        }

        info!(
            "Starting stale job detector (interval: {:?}, threshold: {:?})",
            self.check_interval, self.threshold
        );
        let mut ticker = interval(self.check_interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Stale job detector stopped");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.check_once().await {
                        error!("Stale job detection error: {}", e);
                    }
                }
            }
        }
    }

    /// Run a single sweep. Returns `(stale, recovered)` counts.
    pub async fn check_once(&self) -> FirestoreResult<(u32, u32)> {
        self.check_at(Utc::now()).await
    }

    pub(crate) async fn check_at(&self, now: DateTime<Utc>) -> FirestoreResult<(u32, u32)> {
        let threshold = chrono::Duration::from_std(self.threshold)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        let processing = self.videos.list_by_status(VideoStatus::Processing).await?;

        let mut stale_count = 0u32;
        let mut recovered_count = 0u32;

        for job in processing {
            if now.signed_duration_since(job.updated_at) < threshold {
                continue;
            }
            stale_count += 1;
            warn!(
                video_id = %job.id,
                user_id = %job.user_id,
                updated_at = %job.updated_at,
                "Detected stale job"
            );

            match self.videos.fail(&job.id, STALE_JOB_MESSAGE).await {
                Ok(true) => recovered_count += 1,
                Ok(false) => info!(video_id = %job.id, "Stale job finished before it was swept"),
                Err(e) => error!(video_id = %job.id, "Failed to recover stale job: {}", e),
            }
        }

        if stale_count > 0 {
            metrics::record_stale_recovered(u64::from(recovered_count));
            info!(
                "Stale job detection complete: {} stale, {} recovered",
                stale_count, recovered_count
            );
        }

        Ok((stale_count, recovered_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessError;
    use crate::ingest::JobProcessor;
    use crate::testing::{RecordingStore, Script, ScriptedEngine};
    use std::sync::Arc;
    use tokio::sync::Notify;
    use tokio_test::{assert_err, assert_ok};
    use vnotes_engine_client::ProcessingResult;
    use vnotes_firestore::MemoryStore;
    use vnotes_models::{NewVideoJob, VideoId, VideoJob};

    async fn create(videos: &VideoRepository) -> VideoJob {
        videos
            .create(&NewVideoJob {
                user_id: "u1".to_string(),
                title: "a.mp4".to_string(),
                url: "/videos/a".to_string(),
            })
            .await
            .unwrap()
    }

    fn detector(videos: &VideoRepository) -> StaleJobDetector {
        let config = WorkerConfig {
            stale_detection_enabled: true,
            ..WorkerConfig::default()
        };
        StaleJobDetector::new(videos.clone(), &config)
    }

    #[tokio::test]
    async fn test_sweeps_only_old_processing_jobs() {
        let videos = VideoRepository::new(Arc::new(MemoryStore::new()));
        let stuck = create(&videos).await;
        videos.mark_processing(&stuck.id).await.unwrap();
        let done = create(&videos).await;
        videos.mark_processing(&done.id).await.unwrap();
        videos.complete(&done.id, "S").await.unwrap();
        let waiting = create(&videos).await;

        let later = Utc::now() + chrono::Duration::hours(1);
        let (stale, recovered) = detector(&videos).check_at(later).await.unwrap();
        assert_eq!((stale, recovered), (1, 1));

        let read = videos.get(&stuck.id).await.unwrap().unwrap();
        assert_eq!(read.status, VideoStatus::Failed);
        assert_eq!(read.error_message.as_deref(), Some(STALE_JOB_MESSAGE));
        assert!(read.summary.is_none());

        let read = videos.get(&done.id).await.unwrap().unwrap();
        assert_eq!(read.status, VideoStatus::Completed);
        let read = videos.get(&waiting.id).await.unwrap().unwrap();
        assert_eq!(read.status, VideoStatus::Uploaded);
    }

    fn held_processor(videos: &VideoRepository, hold: Arc<Notify>) -> JobProcessor {
        let engine = ScriptedEngine::held(
            Script::Respond(ProcessingResult {
                status: "completed".to_string(),
                summary: "X".to_string(),
                error: String::new(),
            }),
            hold,
        );
        JobProcessor::new(videos.clone(), engine, &WorkerConfig::default())
    }

    fn spawn_run(
        processor: &JobProcessor,
        job_id: &VideoId,
    ) -> tokio::task::JoinHandle<Result<(), ProcessError>> {
        let processor = processor.clone();
        let job_id = job_id.clone();
        tokio::spawn(async move { processor.run(&job_id, "a.mp4", &[1, 2, 3]).await })
    }

    async fn wait_for_processing(videos: &VideoRepository, job_id: &VideoId) {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let read = videos.get(job_id).await.unwrap().unwrap();
                if read.status == VideoStatus::Processing {
                    break;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_sweep_before_completion_keeps_job_failed() {
        let store = RecordingStore::new();
        let videos = VideoRepository::new(store.clone());
        let hold = Arc::new(Notify::new());
        let processor = held_processor(&videos, hold.clone());
        let job = create(&videos).await;

        let task = spawn_run(&processor, &job.id);
        wait_for_processing(&videos, &job.id).await;

        let later = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(assert_ok!(detector(&videos).check_at(later).await), (1, 1));

        hold.notify_one();
        let err = assert_err!(task.await.unwrap());
        assert!(matches!(err, ProcessError::StatusChanged(VideoStatus::Processing)));

        let read = videos.get(&job.id).await.unwrap().unwrap();
        assert_eq!(read.status, VideoStatus::Failed);
        assert!(read.summary.is_none());
        assert_eq!(read.error_message.as_deref(), Some(STALE_JOB_MESSAGE));
        assert_eq!(store.statuses(), vec!["uploaded", "processing", "failed"]);
    }

    #[tokio::test]
    async fn test_completion_before_sweep_write_is_kept() {
        let store = RecordingStore::new();
        let videos = VideoRepository::new(store.clone());
        let hold = Arc::new(Notify::new());
        let processor = held_processor(&videos, hold.clone());
        let job = create(&videos).await;

        let task = spawn_run(&processor, &job.id);
        wait_for_processing(&videos, &job.id).await;

        // The sweep lists the job while it is processing, then the job
        // completes before the sweep's failing write lands.
        let listed = videos.list_by_status(VideoStatus::Processing).await.unwrap();
        assert_eq!(listed.len(), 1);
        hold.notify_one();
        assert_ok!(task.await.unwrap());

        assert!(!videos.fail(&listed[0].id, STALE_JOB_MESSAGE).await.unwrap());
        let later = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(detector(&videos).check_at(later).await.unwrap(), (0, 0));

        let read = videos.get(&job.id).await.unwrap().unwrap();
        assert_eq!(read.status, VideoStatus::Completed);
        assert_eq!(read.summary.as_deref(), Some("X"));
        assert!(read.error_message.is_none());
        assert_eq!(store.statuses(), vec!["uploaded", "processing", "completed"]);
    }

    #[tokio::test]
    async fn test_recent_processing_job_is_kept() {
        let videos = VideoRepository::new(Arc::new(MemoryStore::new()));
        let job = create(&videos).await;
        videos.mark_processing(&job.id).await.unwrap();

        let (stale, _) = detector(&videos).check_once().await.unwrap();
        assert_eq!(stale, 0);
        let read = videos.get(&job.id).await.unwrap().unwrap();
        assert_eq!(read.status, VideoStatus::Processing);
    }

    #[tokio::test]
    async fn test_disabled_run_returns_immediately() {
        let videos = VideoRepository::new(Arc::new(MemoryStore::new()));
        let detector = StaleJobDetector::new(videos, &WorkerConfig::default());
        let (_tx, rx) = watch::channel(false);
        tokio::time::timeout(Duration::from_secs(1), detector.run(rx))
            .await
            .unwrap();
    }
}
