//! Process-wide supervisor for detached background jobs.
//!
//! Jobs run on their own tokio tasks, so dropping or cancelling the future
//! that spawned them has no effect on them. A semaphore bounds how many run
//! at once; jobs over the limit wait for a permit inside their own task.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};

/// Returned when the supervisor no longer accepts work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("job supervisor is shutting down")]
pub struct SupervisorClosed;

/// Owner of all detached ingestion jobs.
pub struct JobSupervisor {
    max_concurrent_jobs: usize,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    in_flight: Arc<watch::Sender<usize>>,
}

impl JobSupervisor {
    pub fn new(max_concurrent_jobs: usize) -> Self {
        let max_concurrent_jobs = max_concurrent_jobs.max(1);
        let (shutdown, _) = watch::channel(false);
        let (in_flight, _) = watch::channel(0usize);
        Self {
            max_concurrent_jobs,
            job_semaphore: Arc::new(Semaphore::new(max_concurrent_jobs)),
            shutdown,
            in_flight: Arc::new(in_flight),
        }
    }

    /// Detach `job` onto its own task.
    ///
    /// The job is counted as in flight from this call until it finishes,
    /// including any time spent waiting for a concurrency permit.
    pub fn spawn<F>(&self, job_id: &str, job: F) -> Result<(), SupervisorClosed>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_shutting_down() {
            warn!(job_id = %job_id, "Rejecting job: supervisor is shutting down");
            return Err(SupervisorClosed);
        }

        self.in_flight.send_modify(|n| *n += 1);
        let guard = InFlightGuard {
            counter: Arc::clone(&self.in_flight),
        };
        let semaphore = Arc::clone(&self.job_semaphore);
        let job_id = job_id.to_string();

        tokio::spawn(async move {
            let _guard = guard;
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(job_id = %job_id, "Semaphore closed before job could start");
                    return;
                }
            };
            debug!(job_id = %job_id, "Job acquired execution slot");
            job.await;
        });

        Ok(())
    }

    /// Jobs spawned and not yet finished.
    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    pub fn max_concurrent_jobs(&self) -> usize {
        self.max_concurrent_jobs
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Receiver that flips to `true` on shutdown, for background loops.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Stop accepting jobs and wait up to `timeout` for in-flight ones.
    ///
    /// Returns true if every job finished in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.shutdown.send_replace(true);
        info!(in_flight = self.in_flight(), "Waiting for in-flight jobs to complete...");

        match tokio::time::timeout(timeout, self.wait_for_jobs()).await {
            Ok(()) => {
                info!("Job supervisor stopped");
                true
            }
            Err(_) => {
                warn!(
                    in_flight = self.in_flight(),
                    "Shutdown timeout reached with jobs still running"
                );
                false
            }
        }
    }

    /// Wait until no job is in flight.
    pub async fn wait_for_jobs(&self) {
        let mut rx = self.in_flight.subscribe();
        // Only fails if the sender is dropped, which `self` prevents.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

/// Decrements the in-flight count when the job task ends, even on panic.
struct InFlightGuard {
    counter: Arc<watch::Sender<usize>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter.send_modify(|n| *n = n.saturating_sub(1));
    }
}
