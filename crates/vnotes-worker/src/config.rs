//! Worker configuration.

use std::time::Duration;

use crate::error::ConfigError;

/// Default payload chunk size (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Ingestion and supervision settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum jobs streaming to the engine at once
    pub max_concurrent_jobs: usize,
    /// Upper bound for one job's whole engine exchange
    pub engine_timeout: Duration,
    /// Payload chunk size in bytes
    pub chunk_size: usize,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Prefix of the storage locator recorded on each job
    pub storage_url_prefix: String,
    /// Whether the stale-job sweep runs
    pub stale_detection_enabled: bool,
    /// Age after which a `processing` job is considered stuck
    pub stale_threshold: Duration,
    /// Interval between sweeps
    pub stale_check_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 8,
            engine_timeout: Duration::from_secs(30 * 60),
            chunk_size: DEFAULT_CHUNK_SIZE,
            shutdown_timeout: Duration::from_secs(60),
            storage_url_prefix: "/videos".to_string(),
            stale_detection_enabled: false,
            stale_threshold: Duration::from_secs(45 * 60),
            stale_check_interval: Duration::from_secs(300),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            max_concurrent_jobs: env_parse("WORKER_MAX_CONCURRENT_JOBS")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            engine_timeout: env_secs("ENGINE_TIMEOUT_SECS").unwrap_or(defaults.engine_timeout),
            chunk_size: env_parse("ENGINE_CHUNK_SIZE")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.chunk_size),
            shutdown_timeout: env_secs("WORKER_SHUTDOWN_TIMEOUT_SECS")
                .unwrap_or(defaults.shutdown_timeout),
            storage_url_prefix: std::env::var("STORAGE_URL_PREFIX")
                .map(|p| p.trim_end_matches('/').to_string())
                .unwrap_or(defaults.storage_url_prefix),
            stale_detection_enabled: std::env::var("ENABLE_STALE_DETECTION")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            stale_threshold: env_secs("STALE_JOB_THRESHOLD_SECS")
                .unwrap_or(defaults.stale_threshold),
            stale_check_interval: env_secs("STALE_CHECK_INTERVAL_SECS")
                .unwrap_or(defaults.stale_check_interval),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings under which the stale sweep could fail a live job.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stale_detection_enabled && self.stale_threshold <= self.engine_timeout {
            return Err(ConfigError::StaleThresholdTooShort {
                threshold: self.stale_threshold,
                engine_timeout: self.engine_timeout,
            });
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_secs(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_secs)
}
