//! Upload coordinator: one slot request, then concurrent direct uploads.

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use log::{info, warn};
use tracing::Instrument;

use super::UploadFile;
use crate::config::UploadConfig;
use crate::error::UploadError;
use crate::sanitize::redact_signed_url;
use crate::service::{JobService, ObjectStorage, UploadSlot, UploadSlotRequest};

/// A file that did not land in object storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedUpload {
    pub file_name: String,
    pub reason: String,
}

/// Aggregate result of a batch upload. At least one file succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub batch_id: String,
    /// Names of uploaded files, in submission order.
    pub succeeded: Vec<String>,
    pub failed: Vec<FailedUpload>,
}

impl UploadOutcome {
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }
}

pub struct UploadCoordinator {
    job_service: Arc<dyn JobService>,
    storage: Arc<dyn ObjectStorage>,
    max_files: usize,
    max_concurrency: usize,
}

impl UploadCoordinator {
    pub fn new(
        job_service: Arc<dyn JobService>,
        storage: Arc<dyn ObjectStorage>,
        config: &UploadConfig,
    ) -> Self {
        Self {
            job_service,
            storage,
            max_files: config.max_files,
            max_concurrency: config.max_concurrency.max(1),
        }
    }

    /// Requests slots for every file and uploads them concurrently.
    ///
    /// Per-file failures are collected, never propagated; only a batch where
    /// nothing landed is an error.
    pub async fn upload(
        &self,
        files: Vec<UploadFile>,
        user_id: &str,
        chat_id: Option<&str>,
    ) -> Result<UploadOutcome, UploadError> {
        if files.is_empty() {
            return Err(UploadError::EmptyBatch);
        }
        if files.len() > self.max_files {
            return Err(UploadError::TooManyFiles {
                count: files.len(),
                max: self.max_files,
            });
        }

        let request = UploadSlotRequest {
            file_names: files.iter().map(|f| f.name.clone()).collect(),
            user_id: user_id.to_string(),
            chat_id: chat_id.map(str::to_string),
        };
        let slots = self
            .job_service
            .request_upload_slots(&request)
            .await
            .map_err(UploadError::SlotRequest)?;

        info!(
            "Received {} upload slots for batch {} ({} files)",
            slots.upload_urls.len(),
            slots.batch_id,
            files.len()
        );

        let (assigned, mut failed) = assign_slots(files, slots.upload_urls);

        let storage = &self.storage;
        let mut results: Vec<(usize, String, Result<(), String>)> = stream::iter(assigned)
            .map(|(position, file, slot)| {
                let span = tracing::info_span!("upload.put", file = %file.name);
                async move {
                    let content_type = file.content_type();
                    let outcome = storage
                        .put(&slot, &content_type, file.data)
                        .await
                        .map_err(|e| {
                            warn!(
                                "Upload of '{}' to {} failed: {}",
                                file.name,
                                redact_signed_url(&slot.signed_url),
                                e
                            );
                            e.to_string()
                        });
                    (position, file.name, outcome)
                }
                .instrument(span)
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        results.sort_by_key(|(position, _, _)| *position);

        let mut succeeded = Vec::new();
        for (_, name, outcome) in results {
            match outcome {
                Ok(()) => succeeded.push(name),
                Err(reason) => failed.push(FailedUpload {
                    file_name: name,
                    reason,
                }),
            }
        }

        if succeeded.is_empty() {
            return Err(UploadError::AllUploadsFailed {
                failed: failed.len(),
            });
        }

        if !failed.is_empty() {
            warn!(
                "Batch {}: {} of {} uploads failed",
                slots.batch_id,
                failed.len(),
                succeeded.len() + failed.len()
            );
        }

        Ok(UploadOutcome {
            batch_id: slots.batch_id,
            succeeded,
            failed,
        })
    }
}

type Assigned = Vec<(usize, UploadFile, UploadSlot)>;

/// Pairs each file with the first unused slot issued for its name. Files
/// without a slot are reported as failed.
fn assign_slots(files: Vec<UploadFile>, slots: Vec<UploadSlot>) -> (Assigned, Vec<FailedUpload>) {
    let mut remaining: Vec<Option<UploadSlot>> = slots.into_iter().map(Some).collect();
    let mut assigned = Vec::with_capacity(files.len());
    let mut failed = Vec::new();

    for (position, file) in files.into_iter().enumerate() {
        let slot = remaining
            .iter_mut()
            .find(|s| s.as_ref().is_some_and(|s| s.file_name == file.name))
            .and_then(Option::take);
        match slot {
            Some(slot) => assigned.push((position, file, slot)),
            None => {
                warn!("No upload slot was issued for '{}'", file.name);
                failed.push(FailedUpload {
                    file_name: file.name,
                    reason: "no upload slot issued".to_string(),
                });
            }
        }
    }

    (assigned, failed)
}
