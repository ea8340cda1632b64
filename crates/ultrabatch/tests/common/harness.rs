//! Test harness for isolated session tests.
//!
//! The `TestHarness` struct provides:
//! - In-memory fakes for the job service, object storage and result store
//!   that record every call
//! - A SQLite database in a temporary directory, shared by every session the
//!   harness builds, so reloads can be simulated

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use ultrabatch::service::{
    JobService, JobStatusResponse, LaunchRequest, LaunchResponse, ObjectStorage,
    RawResultRecord, ResultStore, UploadSlot, UploadSlotRequest, UploadSlotsResponse,
};
use ultrabatch::{Config, Database, ServiceError, Session, SessionBuilder, SessionEvent};

pub const USER_ID: &str = "user-1";
pub const BATCH_ID: &str = "batch-1";

/// How the fake job service answers one launch call.
#[derive(Debug, Clone)]
pub enum LaunchStep {
    Accept {
        job_id: String,
        total_files: Option<u32>,
        estimated_time_minutes: Option<u32>,
    },
    /// HTTP 200 with `success: false`.
    Reject(String),
    /// A non-2xx response.
    HttpStatus(u16),
}

/// How the fake job service answers one status call.
#[derive(Debug, Clone)]
pub enum StatusStep {
    Respond(JobStatusResponse),
    Fail,
}

#[derive(Default)]
struct JobServiceState {
    slot_requests: Vec<UploadSlotRequest>,
    launch_requests: Vec<LaunchRequest>,
    launch_script: VecDeque<LaunchStep>,
    status_scripts: HashMap<String, VecDeque<StatusStep>>,
    last_status: HashMap<String, StatusStep>,
    status_calls: HashMap<String, u32>,
    withheld_slots: HashSet<String>,
}

/// Scripted job service. Status scripts repeat their last step forever.
#[derive(Default)]
pub struct FakeJobService {
    state: Mutex<JobServiceState>,
}

impl FakeJobService {
    pub fn push_launch(&self, step: LaunchStep) {
        self.state.lock().unwrap().launch_script.push_back(step);
    }

    pub fn accept_launch(&self, job_id: &str, total_files: Option<u32>, minutes: Option<u32>) {
        self.push_launch(LaunchStep::Accept {
            job_id: job_id.to_string(),
            total_files,
            estimated_time_minutes: minutes,
        });
    }

    pub fn script_status(&self, job_id: &str, steps: Vec<StatusStep>) {
        let mut state = self.state.lock().unwrap();
        state.last_status.remove(job_id);
        state
            .status_scripts
            .insert(job_id.to_string(), steps.into_iter().collect());
    }

    /// The slot request will not include a slot for `file_name`.
    pub fn withhold_slot(&self, file_name: &str) {
        self.state
            .lock()
            .unwrap()
            .withheld_slots
            .insert(file_name.to_string());
    }

    pub fn slot_requests(&self) -> Vec<UploadSlotRequest> {
        self.state.lock().unwrap().slot_requests.clone()
    }

    pub fn launch_requests(&self) -> Vec<LaunchRequest> {
        self.state.lock().unwrap().launch_requests.clone()
    }

    pub fn status_calls(&self, job_id: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .status_calls
            .get(job_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl JobService for FakeJobService {
    async fn request_upload_slots(
        &self,
        request: &UploadSlotRequest,
    ) -> Result<UploadSlotsResponse, ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.slot_requests.push(request.clone());
        let upload_urls = request
            .file_names
            .iter()
            .filter(|name| !state.withheld_slots.contains(*name))
            .map(|name| UploadSlot {
                file_name: name.clone(),
                signed_url: format!("https://storage.test/{}/{}?X-Goog-Signature=abc", BATCH_ID, name),
                storage_path: format!("ultra-batch/{}/{}", BATCH_ID, name),
            })
            .collect();
        Ok(UploadSlotsResponse {
            batch_id: BATCH_ID.to_string(),
            upload_urls,
        })
    }

    async fn launch_job(&self, request: &LaunchRequest) -> Result<LaunchResponse, ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.launch_requests.push(request.clone());
        let step = state.launch_script.pop_front().unwrap_or(LaunchStep::Accept {
            job_id: format!("job-{}", state.launch_requests.len()),
            total_files: None,
            estimated_time_minutes: None,
        });
        match step {
            LaunchStep::Accept {
                job_id,
                total_files,
                estimated_time_minutes,
            } => Ok(LaunchResponse {
                success: true,
                job_id: Some(job_id),
                total_files,
                estimated_time_minutes,
                error: None,
            }),
            LaunchStep::Reject(error) => Ok(LaunchResponse {
                success: false,
                job_id: None,
                total_files: None,
                estimated_time_minutes: None,
                error: Some(error),
            }),
            LaunchStep::HttpStatus(status) => Err(ServiceError::Status {
                url: "http://job-service.test/ultra-batch-analyze".to_string(),
                status,
                body: "rejected".to_string(),
            }),
        }
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, ServiceError> {
        let mut state = self.state.lock().unwrap();
        *state.status_calls.entry(job_id.to_string()).or_insert(0) += 1;

        let next = state
            .status_scripts
            .get_mut(job_id)
            .and_then(VecDeque::pop_front);
        let step = match next {
            Some(step) => {
                state.last_status.insert(job_id.to_string(), step.clone());
                step
            }
            None => state
                .last_status
                .get(job_id)
                .cloned()
                .unwrap_or_else(|| StatusStep::Respond(JobStatusResponse::default())),
        };

        match step {
            StatusStep::Respond(response) => Ok(response),
            StatusStep::Fail => Err(ServiceError::Status {
                url: format!("http://job-service.test/ultra-batch-status/{}", job_id),
                status: 503,
                body: "unavailable".to_string(),
            }),
        }
    }
}

/// Object storage that accepts everything except the configured file names.
#[derive(Default)]
pub struct FakeObjectStorage {
    failing: Mutex<HashSet<String>>,
    puts: Mutex<Vec<(String, String)>>,
}

impl FakeObjectStorage {
    pub fn fail_upload(&self, file_name: &str) {
        self.failing.lock().unwrap().insert(file_name.to_string());
    }

    /// `(file_name, content_type)` of every attempted PUT, in completion order.
    pub fn puts(&self) -> Vec<(String, String)> {
        self.puts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStorage for FakeObjectStorage {
    async fn put(
        &self,
        slot: &UploadSlot,
        content_type: &str,
        _data: Vec<u8>,
    ) -> Result<(), ServiceError> {
        self.puts
            .lock()
            .unwrap()
            .push((slot.file_name.clone(), content_type.to_string()));
        if self.failing.lock().unwrap().contains(&slot.file_name) {
            return Err(ServiceError::Status {
                url: format!("https://storage.test/{}", slot.storage_path),
                status: 403,
                body: "SignatureDoesNotMatch".to_string(),
            });
        }
        Ok(())
    }
}

/// Result collection keyed by job id.
#[derive(Default)]
pub struct FakeResultStore {
    records: Mutex<HashMap<String, Vec<RawResultRecord>>>,
    unavailable: Mutex<bool>,
    reads: Mutex<u32>,
}

impl FakeResultStore {
    pub fn set_records(&self, job_id: &str, records: Vec<RawResultRecord>) {
        self.records
            .lock()
            .unwrap()
            .insert(job_id.to_string(), records);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    pub fn reads(&self) -> u32 {
        *self.reads.lock().unwrap()
    }
}

#[async_trait]
impl ResultStore for FakeResultStore {
    async fn fetch_records(&self, job_id: &str) -> Result<Vec<RawResultRecord>, ServiceError> {
        *self.reads.lock().unwrap() += 1;
        if *self.unavailable.lock().unwrap() {
            return Err(ServiceError::Decode {
                url: format!("http://job-service.test/ultra-batch-status/{}", job_id),
                reason: "store offline".to_string(),
            });
        }
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(job_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Isolated environment for session tests.
pub struct TestHarness {
    /// Holds the database file.
    _temp_dir: TempDir,
    pub config: Config,
    pub database: Database,
    pub job_service: Arc<FakeJobService>,
    pub storage: Arc<FakeObjectStorage>,
    pub results: Arc<FakeResultStore>,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let database = Database::open(&temp_dir.path().join("ultrabatch.db"))
            .expect("Failed to open test database");
        Self {
            _temp_dir: temp_dir,
            config: Config::with_base_url("http://job-service.test"),
            database,
            job_service: Arc::new(FakeJobService::default()),
            storage: Arc::new(FakeObjectStorage::default()),
            results: Arc::new(FakeResultStore::default()),
        }
    }

    /// A fresh session over the shared fakes and database, as after a reload.
    pub fn session(&self) -> Session {
        self.session_for(USER_ID)
    }

    /// Like [`TestHarness::session`], signed in as another user.
    pub fn session_for(&self, user_id: &str) -> Session {
        SessionBuilder::new(self.config.clone(), user_id)
            .job_service(self.job_service.clone())
            .result_store(self.results.clone())
            .object_storage(self.storage.clone())
            .database(self.database.clone())
            .build()
            .expect("Failed to build session")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Drains every event currently buffered on `rx`.
pub fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Revisions of the `ViewUpdated` events in `events`.
pub fn view_revisions(events: &[SessionEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::ViewUpdated { revision } => Some(*revision),
            _ => None,
        })
        .collect()
}
