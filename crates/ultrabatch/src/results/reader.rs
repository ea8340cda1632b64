//! Result store reader: the single normalization boundary for result records.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::warn;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::error::ServiceError;
use crate::service::{RawResultRecord, ResultStore};

/// One file's analysis outcome in canonical shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Position of the file in submission order.
    pub index: u32,
    pub file_name: String,
    /// Final analysis text; absent when the file failed.
    pub content: Option<String>,
    pub success: bool,
    pub error: Option<String>,
    pub processed_at: Option<String>,
}

impl ResultRecord {
    /// Normalizes a raw record. Returns `None` when the record has no usable
    /// numeric index.
    pub fn from_raw(raw: RawResultRecord) -> Option<Self> {
        let index = match raw.file_index.as_ref().and_then(|i| i.as_index()) {
            Some(index) => index,
            None => {
                warn!(
                    "Skipping result record with missing or non-numeric index: {:?}",
                    raw.file_index
                );
                return None;
            }
        };

        let file_name = first_non_empty(raw.file_name_camel, raw.file_name_snake)
            .unwrap_or_else(|| format!("file_{}", index));
        let content = first_non_empty(raw.final_message_camel, raw.final_message_snake);
        let error = raw.error.filter(|e| !e.trim().is_empty());
        let processed_at = raw.processed_at.and_then(|value| match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s),
            other => Some(other.to_string()),
        });

        Some(Self {
            index,
            file_name,
            content,
            success: raw.success.unwrap_or(false),
            error,
            processed_at,
        })
    }
}

fn first_non_empty(a: Option<String>, b: Option<String>) -> Option<String> {
    a.filter(|s| !s.trim().is_empty())
        .or_else(|| b.filter(|s| !s.trim().is_empty()))
}

/// Reads every result record available so far for a job.
///
/// Stateless: two reads with no new records return the same sequence.
#[derive(Clone)]
pub struct ResultStoreReader {
    store: Arc<dyn ResultStore>,
}

impl ResultStoreReader {
    pub fn new(store: Arc<dyn ResultStore>) -> Self {
        Self { store }
    }

    /// Current records for `job_id`, sorted ascending by numeric index.
    pub async fn read(&self, job_id: &str) -> Result<Vec<ResultRecord>, ServiceError> {
        let raw = self
            .store
            .fetch_records(job_id)
            .instrument(tracing::debug_span!("results.read", job_id = %job_id))
            .await?;
        Ok(Self::normalize(raw))
    }

    /// Normalizes and orders raw records.
    ///
    /// Records without a numeric index are skipped. When two records share an
    /// index the first one wins.
    pub fn normalize(raw: Vec<RawResultRecord>) -> Vec<ResultRecord> {
        let mut by_index: BTreeMap<u32, ResultRecord> = BTreeMap::new();
        for record in raw.into_iter().filter_map(ResultRecord::from_raw) {
            if by_index.contains_key(&record.index) {
                warn!("Duplicate result record for index {}, keeping the first", record.index);
                continue;
            }
            by_index.insert(record.index, record);
        }
        by_index.into_values().collect()
    }
}
