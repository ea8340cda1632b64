//! Tracks one polling loop per job id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::poller::{Poller, StatusHandler};
use crate::broadcast::{EventBroadcaster, SessionEvent, StopReason};
use crate::config::PollingConfig;
use crate::service::JobService;

/// Lifecycle of a job's polling loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollingState {
    Active,
    Done(StopReason),
}

struct Entry {
    state: PollingState,
    cancel: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

type Entries = Arc<Mutex<HashMap<String, Entry>>>;

fn lock(entries: &Mutex<HashMap<String, Entry>>) -> MutexGuard<'_, HashMap<String, Entry>> {
    match entries.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("Poller registry lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// Runs polling loops on the tokio runtime, at most one per job.
pub struct PollerRegistry {
    entries: Entries,
    events: EventBroadcaster,
}

impl PollerRegistry {
    pub fn new(events: EventBroadcaster) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    /// Starts polling `job_id`. Returns `false` when a loop for it is
    /// already active. Must be called from within a tokio runtime.
    pub fn start(
        &self,
        job_id: &str,
        expected_total: u32,
        job_service: Arc<dyn JobService>,
        config: PollingConfig,
        handler: StatusHandler,
    ) -> bool {
        let mut entries = lock(&self.entries);
        if matches!(
            entries.get(job_id).map(|e| &e.state),
            Some(PollingState::Active)
        ) {
            return false;
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let poller = Poller::new(job_service, config);
        let registry = Arc::clone(&self.entries);
        let events = self.events.clone();
        let id = job_id.to_string();

        let handle = tokio::spawn(async move {
            let reason = poller.run(&id, expected_total, handler, cancel_rx).await;
            finish(&registry, &events, &id, reason);
        });

        entries.insert(
            job_id.to_string(),
            Entry {
                state: PollingState::Active,
                cancel: Some(cancel_tx),
                handle: Some(handle),
            },
        );
        drop(entries);

        self.events.send(SessionEvent::PollingStarted {
            job_id: job_id.to_string(),
        });
        true
    }

    /// Stops polling `job_id`. Returns `false` when it was not active.
    pub fn cancel(&self, job_id: &str) -> bool {
        let mut entries = lock(&self.entries);
        let Some(entry) = entries.get_mut(job_id) else {
            return false;
        };
        if entry.state != PollingState::Active {
            return false;
        }
        entry.state = PollingState::Done(StopReason::Cancelled);
        if let Some(cancel) = entry.cancel.take() {
            let _ = cancel.send(true);
        }
        if let Some(handle) = entry.handle.take() {
            handle.abort();
        }
        drop(entries);

        info!("Cancelled polling for job {}", job_id);
        self.events.send(SessionEvent::PollingStopped {
            job_id: job_id.to_string(),
            reason: StopReason::Cancelled,
        });
        true
    }

    /// Stops every active loop. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        self.active_jobs()
            .iter()
            .filter(|job_id| self.cancel(job_id))
            .count()
    }

    pub fn is_active(&self, job_id: &str) -> bool {
        self.state(job_id) == Some(PollingState::Active)
    }

    pub fn state(&self, job_id: &str) -> Option<PollingState> {
        lock(&self.entries).get(job_id).map(|e| e.state.clone())
    }

    /// Job ids with an active loop, sorted.
    pub fn active_jobs(&self) -> Vec<String> {
        let mut jobs: Vec<String> = lock(&self.entries)
            .iter()
            .filter(|(_, e)| e.state == PollingState::Active)
            .map(|(id, _)| id.clone())
            .collect();
        jobs.sort();
        jobs
    }

    /// Waits for the loop of `job_id` to exit and returns its final state.
    pub async fn wait(&self, job_id: &str) -> Option<PollingState> {
        let handle = lock(&self.entries)
            .get_mut(job_id)
            .and_then(|e| e.handle.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!("Polling task for job {} panicked: {}", job_id, e);
                }
            }
        }
        self.state(job_id)
    }
}

/// Records the exit of a loop that was not cancelled through the registry.
fn finish(entries: &Entries, events: &EventBroadcaster, job_id: &str, reason: StopReason) {
    {
        let mut entries = lock(entries);
        match entries.get_mut(job_id) {
            Some(entry) if entry.state == PollingState::Active => {
                entry.state = PollingState::Done(reason.clone());
                entry.cancel = None;
            }
            _ => return,
        }
    }

    info!("Polling for job {} stopped: {}", job_id, reason);
    match reason {
        StopReason::TooManyFailures { .. } | StopReason::MaxDurationExceeded => {
            events.error(
                "Stopped checking job progress",
                &format!("Job {}: {}", job_id, reason),
            );
        }
        StopReason::Terminal | StopReason::Cancelled => {}
    }
    events.send(SessionEvent::PollingStopped {
        job_id: job_id.to_string(),
        reason,
    });
}

impl Drop for PollerRegistry {
    fn drop(&mut self) {
        for entry in lock(&self.entries).values_mut() {
            if let Some(handle) = entry.handle.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::service::{
        JobProgress, JobStatusResponse, LaunchRequest, LaunchResponse, UploadSlotRequest,
        UploadSlotsResponse,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Reports one more processed file per call, out of `total`.
    struct CountingService {
        total: u32,
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl JobService for CountingService {
        async fn request_upload_slots(
            &self,
            _request: &UploadSlotRequest,
        ) -> Result<UploadSlotsResponse, ServiceError> {
            unimplemented!()
        }

        async fn launch_job(&self, _request: &LaunchRequest) -> Result<LaunchResponse, ServiceError> {
            unimplemented!()
        }

        async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, ServiceError> {
            let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(ServiceError::Status {
                    url: format!("http://test/ultra-batch-status/{}", job_id),
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            Ok(JobStatusResponse {
                success: true,
                progress: JobProgress {
                    processed_files: calls.min(self.total),
                    total_files: self.total,
                    ..Default::default()
                },
                ..Default::default()
            })
        }
    }

    fn service(total: u32, fail: bool) -> Arc<CountingService> {
        Arc::new(CountingService {
            total,
            calls: AtomicU32::new(0),
            fail,
        })
    }

    fn noop() -> StatusHandler {
        Arc::new(|_: &str, _: &JobStatusResponse| {})
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_finishes_when_job_completes() {
        let events = EventBroadcaster::new(16);
        let mut rx = events.subscribe();
        let registry = PollerRegistry::new(events);
        let svc = service(3, false);

        assert!(registry.start("job-1", 3, svc.clone(), PollingConfig::default(), noop()));
        assert!(registry.is_active("job-1"));

        let state = registry.wait("job-1").await;
        assert_eq!(state, Some(PollingState::Done(StopReason::Terminal)));
        assert_eq!(svc.calls.load(Ordering::SeqCst), 3);
        assert!(registry.active_jobs().is_empty());

        assert!(matches!(rx.recv().await.unwrap(), SessionEvent::PollingStarted { .. }));
        assert!(matches!(
            rx.recv().await.unwrap(),
            SessionEvent::PollingStopped { reason: StopReason::Terminal, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_rejected_while_active() {
        let registry = PollerRegistry::new(EventBroadcaster::default());
        let svc = service(100, false);

        assert!(registry.start("job-1", 100, svc.clone(), PollingConfig::default(), noop()));
        assert!(!registry.start("job-1", 100, svc.clone(), PollingConfig::default(), noop()));
        assert!(registry.start("job-2", 100, svc, PollingConfig::default(), noop()));
        assert_eq!(registry.active_jobs(), vec!["job-1", "job-2"]);

        assert_eq!(registry.cancel_all(), 2);
        assert!(registry.active_jobs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_further_calls() {
        let registry = PollerRegistry::new(EventBroadcaster::default());
        let svc = service(100, false);

        registry.start("job-1", 100, svc.clone(), PollingConfig::default(), noop());
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(svc.calls.load(Ordering::SeqCst), 2);

        assert!(registry.cancel("job-1"));
        assert!(!registry.cancel("job-1"));
        assert_eq!(
            registry.state("job-1"),
            Some(PollingState::Done(StopReason::Cancelled))
        );

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(svc.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_done() {
        let registry = PollerRegistry::new(EventBroadcaster::default());
        let svc = service(1, false);

        registry.start("job-1", 1, svc.clone(), PollingConfig::default(), noop());
        registry.wait("job-1").await;
        assert!(registry.start("job-1", 1, svc, PollingConfig::default(), noop()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_too_many_failures_notifies() {
        let events = EventBroadcaster::new(16);
        let mut rx = events.subscribe();
        let registry = PollerRegistry::new(events);
        let config = PollingConfig {
            max_consecutive_failures: Some(3),
            ..Default::default()
        };

        registry.start("job-1", 5, service(5, true), config, noop());
        let state = registry.wait("job-1").await;
        assert_eq!(
            state,
            Some(PollingState::Done(StopReason::TooManyFailures { failures: 3 }))
        );

        let mut saw_error = false;
        while let Ok(event) = rx.try_recv() {
            if let SessionEvent::Notification { level, .. } = event {
                saw_error |= level == crate::broadcast::NotificationLevel::Error;
            }
        }
        assert!(saw_error);
    }

    #[test]
    fn test_unknown_job_has_no_state() {
        let registry = PollerRegistry::new(EventBroadcaster::default());
        assert_eq!(registry.state("nope"), None);
        assert!(!registry.cancel("nope"));
    }
}
