//! Conversation messages and attachments.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::results::Batch;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Files represented in results versus files submitted.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UltraBatchProgress {
    pub current: u32,
    pub total: u32,
}

/// One conversation entry.
///
/// The `ultra_batch_*` fields form the job pointer. `ultra_batch_batches` is
/// derived from the result store and never serialized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_token_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidates_token_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_content: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_standard_analysis: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ultra_batch_job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ultra_batch_total: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ultra_batch_progress: Option<UltraBatchProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ultra_batch_estimated_time_minutes: Option<u32>,
    #[serde(skip)]
    pub ultra_batch_batches: Option<Vec<Batch>>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            file_names: Vec::new(),
            source: None,
            sources: Vec::new(),
            prompt_token_count: None,
            candidates_token_count: None,
            latency_ms: None,
            original_content: None,
            is_standard_analysis: false,
            ultra_batch_job_id: None,
            ultra_batch_total: None,
            ultra_batch_progress: None,
            ultra_batch_estimated_time_minutes: None,
            ultra_batch_batches: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn carries_job(&self, job_id: &str) -> bool {
        self.ultra_batch_job_id.as_deref() == Some(job_id)
    }

    /// Prompt plus candidate tokens.
    pub fn token_count(&self) -> u64 {
        self.prompt_token_count
            .unwrap_or(0)
            .saturating_add(self.candidates_token_count.unwrap_or(0))
    }
}

/// Metadata of a file attached to a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttachedFile {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}
