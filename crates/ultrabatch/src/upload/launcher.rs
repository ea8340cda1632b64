//! Job launcher: tells the job service a batch is ready for processing.

use std::sync::Arc;

use log::{info, warn};

use crate::error::{JobError, ServiceError};
use crate::service::{JobService, JobStatus, LaunchRequest};

/// A launched job. Never mutated client-side after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub job_id: String,
    pub total_files: u32,
    pub status: JobStatus,
    pub estimated_time_minutes: Option<u32>,
}

pub struct JobLauncher {
    job_service: Arc<dyn JobService>,
}

impl JobLauncher {
    pub fn new(job_service: Arc<dyn JobService>) -> Self {
        Self { job_service }
    }

    /// Launches processing for `batch_id`.
    ///
    /// `uploaded` is the number of files that actually landed; it is the
    /// fallback total when the service omits one.
    pub async fn launch(
        &self,
        batch_id: &str,
        user_id: &str,
        chat_id: Option<&str>,
        uploaded: usize,
    ) -> Result<Job, JobError> {
        let request = LaunchRequest {
            batch_id: batch_id.to_string(),
            user_id: user_id.to_string(),
            chat_id: chat_id.map(str::to_string),
        };

        let response = match self.job_service.launch_job(&request).await {
            Ok(response) => response,
            Err(ServiceError::Status { status, body, .. }) if (400..500).contains(&status) => {
                return Err(JobError::Creation {
                    reason: format!("HTTP {}: {}", status, body),
                });
            }
            Err(e) => return Err(e.into()),
        };

        if !response.success {
            return Err(JobError::Creation {
                reason: response
                    .error
                    .unwrap_or_else(|| "the job service did not accept the batch".to_string()),
            });
        }

        let job_id = match response.job_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => id,
            None => {
                return Err(JobError::Creation {
                    reason: "the job service returned no job id".to_string(),
                })
            }
        };

        let uploaded = u32::try_from(uploaded).unwrap_or(u32::MAX);
        let total_files = response.total_files.unwrap_or(uploaded);
        if total_files != uploaded {
            warn!(
                "Job {} reports {} files but {} were uploaded",
                job_id, total_files, uploaded
            );
        }

        info!(
            "Launched job {} for batch {} ({} files, ~{} min)",
            job_id,
            batch_id,
            total_files,
            response.estimated_time_minutes.unwrap_or(0)
        );

        Ok(Job {
            job_id,
            total_files,
            status: JobStatus::Pending,
            estimated_time_minutes: response.estimated_time_minutes,
        })
    }
}
