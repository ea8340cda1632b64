//! The per-job polling loop.
//!
//! One immediate status read, then one read per interval, scheduled after the
//! previous read completes so ticks never overlap.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::Instrument;

use crate::broadcast::StopReason;
use crate::config::PollingConfig;
use crate::error::PollError;
use crate::service::{JobService, JobStatusResponse};

/// Receives every successful status read, in order, from one loop.
pub type StatusHandler = Arc<dyn Fn(&str, &JobStatusResponse) + Send + Sync>;

pub struct Poller {
    job_service: Arc<dyn JobService>,
    config: PollingConfig,
}

impl Poller {
    pub fn new(job_service: Arc<dyn JobService>, config: PollingConfig) -> Self {
        Self {
            job_service,
            config,
        }
    }

    /// One bounded status read.
    pub async fn poll_once(&self, job_id: &str) -> Result<JobStatusResponse, PollError> {
        let after = self.config.request_timeout();
        match tokio::time::timeout(after, self.job_service.job_status(job_id)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(PollError::Timeout {
                job_id: job_id.to_string(),
                after,
            }),
        }
    }

    /// Polls until the job is terminal, a limit is hit, or `cancel` flips to
    /// `true` (or its sender is dropped).
    ///
    /// `expected_total` is the file count from launch, used when a status
    /// response carries no total.
    pub async fn run(
        &self,
        job_id: &str,
        expected_total: u32,
        handler: StatusHandler,
        mut cancel: watch::Receiver<bool>,
    ) -> StopReason {
        let started = Instant::now();
        let mut failures: u32 = 0;
        let mut tick: u64 = 0;

        info!("Polling job {} every {:?}", job_id, self.config.interval());

        loop {
            if *cancel.borrow() {
                return StopReason::Cancelled;
            }

            tick += 1;
            let span = tracing::info_span!("poller.tick", job_id = %job_id, tick);
            let result = tokio::select! {
                result = self.poll_once(job_id).instrument(span) => result,
                _ = cancel.changed() => return StopReason::Cancelled,
            };

            match result {
                Ok(status) => {
                    failures = 0;
                    debug!(
                        "Job {} tick {}: status={} processed={}/{} results={}",
                        job_id,
                        tick,
                        status.status,
                        status.progress.processed_files,
                        status.progress.total_files,
                        status.results.len()
                    );
                    handler(job_id, &status);
                    if status.is_terminal(expected_total) {
                        info!("Job {} reached a terminal state ({})", job_id, status.status);
                        return StopReason::Terminal;
                    }
                }
                Err(e) => {
                    failures += 1;
                    warn!(
                        "Status read for job {} failed ({} in a row): {}",
                        job_id, failures, e
                    );
                    if let Some(max) = self.config.max_consecutive_failures {
                        if failures >= max {
                            return StopReason::TooManyFailures { failures };
                        }
                    }
                }
            }

            if let Some(max) = self.config.max_duration() {
                if started.elapsed() >= max {
                    warn!("Giving up on job {} after {:?}", job_id, max);
                    return StopReason::MaxDurationExceeded;
                }
            }

            let delay = self.config.next_delay(failures);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.changed() => return StopReason::Cancelled,
            }
        }
    }
}
