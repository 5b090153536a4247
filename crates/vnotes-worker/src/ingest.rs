//! Ingestion orchestrator.
//!
//! `submit` admits, validates and records a job, then hands the payload to a
//! detached background task and returns at once with the job in `uploaded`.
//! The background task owns the job record until it writes a terminal state:
//! `uploaded -> processing -> {completed | failed}`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use vnotes_engine_client::{send_payload, EngineTransport};
use vnotes_firestore::VideoRepository;
use vnotes_models::{NewVideoJob, VideoId, VideoJob, VideoStatus};

use crate::config::WorkerConfig;
use crate::error::{ProcessError, ProcessResult, SubmitError, SubmitResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::quota::{Admission, QuotaGate};
use crate::supervisor::JobSupervisor;

// =============================================================================
// Background processing
// =============================================================================

/// Runs one job against the inference engine and records the outcome.
#[derive(Clone)]
pub struct JobProcessor {
    videos: VideoRepository,
    engine: Arc<dyn EngineTransport>,
    chunk_size: usize,
    timeout: Duration,
}

impl JobProcessor {
    pub fn new(
        videos: VideoRepository,
        engine: Arc<dyn EngineTransport>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            videos,
            engine,
            chunk_size: config.chunk_size.max(1),
            timeout: config.engine_timeout,
        }
    }

    /// Process `payload` for `job_id` to a terminal state.
    ///
    /// Returns the error that ended the job, if any. When the `processing`
    /// write itself fails the job is left untouched in `uploaded`.
    pub async fn run(&self, job_id: &VideoId, filename: &str, payload: &[u8]) -> ProcessResult<()> {
        let logger = JobLogger::new(job_id, "process_video");
        let start = Instant::now();
        logger.log_start(&format!("{} ({} bytes)", filename, payload.len()));

        match self.videos.mark_processing(job_id).await {
            Ok(true) => {}
            Ok(false) => {
                let err = ProcessError::StatusChanged(VideoStatus::Uploaded);
                logger.log_error(&format!("{}, abandoning", err));
                metrics::record_job_failed(err.kind(), start.elapsed().as_secs_f64());
                return Err(err);
            }
            Err(e) => {
                logger.log_error(&format!("could not mark job processing, abandoning: {}", e));
                metrics::record_job_failed("persist_failed", start.elapsed().as_secs_f64());
                return Err(ProcessError::PersistFailed(e));
            }
        }

        let outcome = match tokio::time::timeout(
            self.timeout,
            self.exchange(job_id, filename, payload, &logger),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProcessError::TimedOut(self.timeout)),
        };

        let summary = match outcome {
            Ok(summary) => summary,
            Err(err) => {
                self.fail(job_id, &err, &logger, start).await;
                return Err(err);
            }
        };

        match self.videos.complete(job_id, &summary).await {
            Ok(true) => {}
            Ok(false) => {
                // Another writer, normally the stale sweep, already ended the job.
                let err = ProcessError::StatusChanged(VideoStatus::Processing);
                logger.log_warning(&format!("{}, result discarded", err));
                metrics::record_job_failed(err.kind(), start.elapsed().as_secs_f64());
                return Err(err);
            }
            Err(e) => {
                let err = ProcessError::PersistFailed(e);
                self.fail(job_id, &err, &logger, start).await;
                return Err(err);
            }
        }

        metrics::record_job_completed(start.elapsed().as_secs_f64(), payload.len() as u64);
        logger.log_completion(&format!(
            "summary of {} chars in {:.1}s",
            summary.chars().count(),
            start.elapsed().as_secs_f64()
        ));
        Ok(())
    }

    /// Stream the payload and return the engine's summary.
    async fn exchange(
        &self,
        job_id: &VideoId,
        filename: &str,
        payload: &[u8],
        logger: &JobLogger,
    ) -> ProcessResult<String> {
        let mut stream = self
            .engine
            .open(self.timeout)
            .await
            .map_err(ProcessError::from_engine)?;

        stream
            .send_metadata(filename, job_id.as_str())
            .await
            .map_err(ProcessError::from_engine)?;

        let chunks = send_payload(stream.as_mut(), payload, self.chunk_size)
            .await
            .map_err(ProcessError::from_engine)?;
        logger.log_progress(&format!("sent {} bytes in {} chunks", payload.len(), chunks));

        let result = stream
            .close_and_recv()
            .await
            .map_err(ProcessError::from_engine)?;

        result
            .into_outcome()
            .map_err(ProcessError::EngineReportedFailure)
    }

    async fn fail(&self, job_id: &VideoId, err: &ProcessError, logger: &JobLogger, start: Instant) {
        logger.log_error(&err.to_string());
        metrics::record_job_failed(err.kind(), start.elapsed().as_secs_f64());

        match self.videos.fail(job_id, &err.to_string()).await {
            Ok(true) => {}
            Ok(false) => logger.log_warning("job already ended, failure not recorded"),
            Err(e) => logger.log_warning(&format!("could not record failure: {}", e)),
        }
    }
}

// =============================================================================
// Submission
// =============================================================================

/// Entry point for new uploads.
#[derive(Clone)]
pub struct IngestionService {
    videos: VideoRepository,
    quota: QuotaGate,
    processor: JobProcessor,
    supervisor: Arc<JobSupervisor>,
    storage_url_prefix: String,
}

impl IngestionService {
    pub fn new(
        videos: VideoRepository,
        quota: QuotaGate,
        engine: Arc<dyn EngineTransport>,
        supervisor: Arc<JobSupervisor>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            processor: JobProcessor::new(videos.clone(), engine, config),
            videos,
            quota,
            supervisor,
            storage_url_prefix: config.storage_url_prefix.clone(),
        }
    }

    pub fn supervisor(&self) -> &Arc<JobSupervisor> {
        &self.supervisor
    }

    pub fn quota(&self) -> &QuotaGate {
        &self.quota
    }

    /// Accept an upload and start processing it in the background.
    ///
    /// Returns the new job in `uploaded` state. Processing progress is only
    /// visible through the video read path.
    pub async fn submit(
        &self,
        user_id: &str,
        payload: Vec<u8>,
        filename: &str,
    ) -> SubmitResult<VideoJob> {
        let span = info_span!(
            "submit",
            user_id = %user_id,
            filename = %filename,
            bytes = payload.len()
        );

        let result = self.submit_inner(user_id, payload, filename).instrument(span).await;
        match &result {
            Ok(_) => metrics::record_submission("accepted"),
            Err(e) => metrics::record_submission(e.kind()),
        }
        result
    }

    async fn submit_inner(
        &self,
        user_id: &str,
        payload: Vec<u8>,
        filename: &str,
    ) -> SubmitResult<VideoJob> {
        if let Admission::Deny { used, limit } = self.quota.admit(user_id).await? {
            metrics::record_admission_denied();
            return Err(SubmitError::QuotaExceeded { used, limit });
        }

        if payload.is_empty() {
            return Err(SubmitError::EmptyPayload);
        }

        if self.supervisor.is_shutting_down() {
            return Err(SubmitError::ShuttingDown);
        }

        let new_job = NewVideoJob {
            user_id: user_id.to_string(),
            title: filename.to_string(),
            url: self.storage_locator(),
        };
        let job = self
            .videos
            .create(&new_job)
            .await
            .map_err(SubmitError::CreateFailed)?;

        self.dispatch(&job, filename, payload).await?;

        self.quota.record_usage(user_id).await;

        info!(video_id = %job.id, "Video uploaded and processing started");
        Ok(job)
    }

    /// Hand the payload to a supervised task that outlives the caller.
    async fn dispatch(&self, job: &VideoJob, filename: &str, payload: Vec<u8>) -> SubmitResult<()> {
        let processor = self.processor.clone();
        let job_id = job.id.clone();
        let filename = filename.to_string();
        let span = info_span!("process_job", job_id = %job.id);

        let spawned = self.supervisor.spawn(
            job.id.as_str(),
            async move {
                // Logged and recorded by run.
                let _ = processor.run(&job_id, &filename, &payload).await;
            }
            .instrument(span),
        );

        if spawned.is_err() {
            // No task owns the record, so remove it rather than leave it stuck.
            warn!(video_id = %job.id, "Supervisor closed after record creation");
            if let Err(e) = self.videos.delete(&job.id).await {
                error!(video_id = %job.id, error = %e, "Failed to remove orphaned video record");
            }
            return Err(SubmitError::ShuttingDown);
        }
        Ok(())
    }

    fn storage_locator(&self) -> String {
        format!("{}/{}", self.storage_url_prefix, Uuid::new_v4().simple())
    }
}

// =============================================================================
// Tests
// =============================================================================
