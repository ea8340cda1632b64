//! Direct uploads to object storage and job launch.

use std::path::Path;

use crate::error::UploadError;

pub mod coordinator;
pub mod launcher;

pub use coordinator::{FailedUpload, UploadCoordinator, UploadOutcome};
pub use launcher::{Job, JobLauncher};

/// Content type used when the file name has no recognizable extension.
pub const DEFAULT_CONTENT_TYPE: &str = "application/pdf";

/// A local file ready to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub data: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Reads a file from disk, naming it after its file name component.
    pub async fn from_path(path: &Path) -> Result<Self, UploadError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| UploadError::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })?;
        Ok(Self::new(crate::sanitize::redact_path(path), data))
    }

    pub fn content_type(&self) -> String {
        mime_guess::from_path(&self.name)
            .first()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
    }
}
