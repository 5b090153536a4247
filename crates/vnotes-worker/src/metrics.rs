//! Ingestion metrics.

use metrics::{counter, histogram};

pub mod names {
    /// Submissions by outcome (`accepted` or the rejection kind).
    pub const SUBMISSIONS_TOTAL: &str = "vnotes_submissions_total";

    /// Submissions refused by the quota gate.
    pub const ADMISSIONS_DENIED_TOTAL: &str = "vnotes_admissions_denied_total";

    /// Background jobs that reached `completed`.
    pub const JOBS_COMPLETED_TOTAL: &str = "vnotes_jobs_completed_total";

    /// Background jobs that reached `failed`, by reason.
    pub const JOBS_FAILED_TOTAL: &str = "vnotes_jobs_failed_total";

    /// Payload bytes streamed to the engine.
    pub const BYTES_STREAMED_TOTAL: &str = "vnotes_bytes_streamed_total";

    /// Wall time of a background job in seconds.
    pub const JOB_DURATION_SECONDS: &str = "vnotes_job_duration_seconds";

    /// Jobs swept from `processing` to `failed`.
    pub const STALE_JOBS_RECOVERED_TOTAL: &str = "vnotes_stale_jobs_recovered_total";
}

pub fn record_submission(outcome: &str) {
    counter!(names::SUBMISSIONS_TOTAL, "outcome" => outcome.to_string()).increment(1);
}

pub fn record_admission_denied() {
    counter!(names::ADMISSIONS_DENIED_TOTAL).increment(1);
}

pub fn record_job_completed(duration_secs: f64, bytes: u64) {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
    counter!(names::BYTES_STREAMED_TOTAL).increment(bytes);
    histogram!(names::JOB_DURATION_SECONDS, "outcome" => "completed").record(duration_secs);
}

pub fn record_job_failed(reason: &str, duration_secs: f64) {
    counter!(names::JOBS_FAILED_TOTAL, "reason" => reason.to_string()).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "outcome" => "failed").record(duration_secs);
}

pub fn record_stale_recovered(count: u64) {
    counter!(names::STALE_JOBS_RECOVERED_TOTAL).increment(count);
}
