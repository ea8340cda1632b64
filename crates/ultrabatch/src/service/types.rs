//! Wire types exchanged with the job service and object storage.

use serde::{Deserialize, Serialize};

// ─── Upload slots ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadSlotRequest {
    pub file_names: Vec<String>,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
}

/// A single-use, time-limited write capability for one file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadSlot {
    #[serde(alias = "file_name")]
    pub file_name: String,
    #[serde(alias = "signed_url")]
    pub signed_url: String,
    #[serde(alias = "storage_path")]
    pub storage_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadSlotsResponse {
    #[serde(alias = "batchId")]
    pub batch_id: String,
    #[serde(alias = "uploadUrls", default)]
    pub upload_urls: Vec<UploadSlot>,
}

// ─── Job launch ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LaunchRequest {
    pub batch_id: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LaunchResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, alias = "jobId")]
    pub job_id: Option<String>,
    #[serde(default, alias = "totalFiles")]
    pub total_files: Option<u32>,
    #[serde(default, alias = "estimatedTimeMinutes")]
    pub estimated_time_minutes: Option<u32>,
    #[serde(default)]
    pub error: Option<String>,
}

// ─── Job status ────────────────────────────────────────────────────────────

/// Remote job status. Owned by the job service; read-only here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum JobStatus {
    Pending,
    #[default]
    Processing,
    Completed,
    Failed,
}

impl From<String> for JobStatus {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "pending" => JobStatus::Pending,
            "processing" => JobStatus::Processing,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            other => {
                log::warn!("Unknown job status '{}', treating it as processing", other);
                JobStatus::Processing
            }
        }
    }
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    #[serde(default, alias = "processed_files")]
    pub processed_files: u32,
    #[serde(default, alias = "total_files")]
    pub total_files: u32,
    #[serde(default, alias = "success_count")]
    pub success_count: u32,
    #[serde(default, alias = "failure_count")]
    pub failure_count: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, alias = "job_id")]
    pub job_id: Option<String>,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub progress: JobProgress,
    #[serde(default)]
    pub results: Vec<RawResultRecord>,
    #[serde(default, alias = "created_at")]
    pub created_at: Option<serde_json::Value>,
    #[serde(default, alias = "completed_at")]
    pub completed_at: Option<serde_json::Value>,
    #[serde(default, alias = "estimated_time_minutes")]
    pub estimated_time_minutes: Option<u32>,
}

impl JobStatusResponse {
    /// Terminal when the status says so, or when every file is accounted for.
    ///
    /// `expected_total` is used when the response carries no total of its own.
    pub fn is_terminal(&self, expected_total: u32) -> bool {
        if self.status.is_terminal() {
            return true;
        }
        let total = if self.progress.total_files > 0 {
            self.progress.total_files
        } else {
            expected_total
        };
        total > 0 && self.progress.processed_files >= total
    }
}

// ─── Result records ────────────────────────────────────────────────────────

/// A record index as the store keys it: a number or a numeric string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RecordIndex {
    Number(u64),
    Text(String),
    Other(serde_json::Value),
}

impl RecordIndex {
    /// The numeric index, or `None` when the key is not a non-negative integer.
    pub fn as_index(&self) -> Option<u32> {
        match self {
            RecordIndex::Number(n) => u32::try_from(*n).ok(),
            RecordIndex::Text(s) => s.trim().parse::<u32>().ok(),
            RecordIndex::Other(_) => None,
        }
    }
}

impl From<u32> for RecordIndex {
    fn from(value: u32) -> Self {
        RecordIndex::Number(u64::from(value))
    }
}

/// A result record exactly as it arrives, with every field-name variant kept
/// apart. Normalized by [`crate::results::ResultStoreReader`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawResultRecord {
    #[serde(
        default,
        rename = "fileIndex",
        alias = "file_index",
        alias = "index",
        skip_serializing_if = "Option::is_none"
    )]
    pub file_index: Option<RecordIndex>,
    #[serde(default, rename = "fileName", skip_serializing_if = "Option::is_none")]
    pub file_name_camel: Option<String>,
    #[serde(default, rename = "file_name", skip_serializing_if = "Option::is_none")]
    pub file_name_snake: Option<String>,
    #[serde(default, rename = "finalMessage", skip_serializing_if = "Option::is_none")]
    pub final_message_camel: Option<String>,
    #[serde(default, rename = "final_message", skip_serializing_if = "Option::is_none")]
    pub final_message_snake: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(
        default,
        rename = "processedAt",
        alias = "processed_at",
        skip_serializing_if = "Option::is_none"
    )]
    pub processed_at: Option<serde_json::Value>,
}
