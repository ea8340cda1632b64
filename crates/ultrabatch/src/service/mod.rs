//! Remote collaborators: the job service, the result store it exposes, and
//! the object storage that accepts signed-URL uploads.
//!
//! Each collaborator is a trait so sessions can run against the HTTP
//! implementations in [`http`] or against in-memory fakes.

use async_trait::async_trait;

use crate::error::ServiceError;

pub mod http;
pub mod types;

pub use http::{HttpJobService, HttpObjectStorage};
pub use types::{
    JobProgress, JobStatus, JobStatusResponse, LaunchRequest, LaunchResponse, RawResultRecord,
    RecordIndex, UploadSlot, UploadSlotRequest, UploadSlotsResponse,
};

#[async_trait]
pub trait JobService: Send + Sync {
    /// Requests one upload slot per file name in a single call.
    async fn request_upload_slots(
        &self,
        request: &UploadSlotRequest,
    ) -> Result<UploadSlotsResponse, ServiceError>;

    /// Signals that uploads for a batch are complete and processing may start.
    async fn launch_job(&self, request: &LaunchRequest) -> Result<LaunchResponse, ServiceError>;

    /// Reads status, progress and the results available so far.
    async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, ServiceError>;
}

/// Read-only access to the per-job result collection.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Every record written for `job_id` so far, in storage order.
    async fn fetch_records(&self, job_id: &str) -> Result<Vec<RawResultRecord>, ServiceError>;
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Writes `data` to the slot's signed location.
    async fn put(
        &self,
        slot: &UploadSlot,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<(), ServiceError>;
}
