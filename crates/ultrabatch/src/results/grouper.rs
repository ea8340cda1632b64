//! Display batching and content formatting for result records.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::reader::ResultRecord;

/// Number of files per display batch.
pub const DEFAULT_BATCH_SIZE: usize = 5;

static LEADING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*```[A-Za-z0-9_+-]*[ \t]*\r?\n?").unwrap());
static TRAILING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r?\n?[ \t]*```\s*$").unwrap());

/// One file's display entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFile {
    pub index: u32,
    pub file_name: String,
    /// Final analysis text, else the error message, else empty.
    pub content: String,
    pub success: bool,
}

/// A fixed-size slice of consecutive results, numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub batch_number: usize,
    pub files: Vec<BatchFile>,
}

/// Groups ordered result records into display batches. Pure.
#[derive(Debug, Clone, Copy)]
pub struct BatchGrouper {
    batch_size: usize,
}

impl Default for BatchGrouper {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl BatchGrouper {
    /// A zero batch size falls back to [`DEFAULT_BATCH_SIZE`].
    pub fn new(batch_size: usize) -> Self {
        let batch_size = if batch_size == 0 {
            DEFAULT_BATCH_SIZE
        } else {
            batch_size
        };
        Self { batch_size }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn group(&self, records: &[ResultRecord]) -> Vec<Batch> {
        records
            .chunks(self.batch_size)
            .enumerate()
            .map(|(i, chunk)| Batch {
                batch_number: i + 1,
                files: chunk.iter().map(to_batch_file).collect(),
            })
            .collect()
    }
}

fn to_batch_file(record: &ResultRecord) -> BatchFile {
    let raw = record
        .content
        .as_deref()
        .or(record.error.as_deref())
        .unwrap_or("");
    BatchFile {
        index: record.index,
        file_name: record.file_name.clone(),
        content: strip_code_fences(raw),
        success: record.success,
    }
}

/// Removes a leading and a trailing triple-backtick fence, if present.
pub fn strip_code_fences(content: &str) -> String {
    let without_leading = LEADING_FENCE.replace(content, "");
    let without_trailing = TRAILING_FENCE.replace(&without_leading, "");
    without_trailing.trim().to_string()
}

/// Total number of files across all batches.
pub fn file_count(batches: &[Batch]) -> usize {
    batches.iter().map(|b| b.files.len()).sum()
}

/// Renders batches into the assistant message text. Rebuilt from scratch on
/// every call.
pub fn render_content(batches: &[Batch], total_files: u32) -> String {
    let mut sections = Vec::with_capacity(batches.len());
    for batch in batches {
        let mut section = format!("## Batch {}\n", batch.batch_number);
        for file in &batch.files {
            let marker = if file.success { "" } else { " (failed)" };
            section.push_str(&format!("\n### {}{}\n\n", file.file_name, marker));
            section.push_str(&file.content);
            section.push('\n');
        }
        sections.push(section);
    }

    let done = file_count(batches);
    let mut content = sections.join("\n---\n\n");
    if (done as u64) < u64::from(total_files) {
        content.push_str(&format!(
            "\n---\n\n_Processed {} of {} files. More results will appear as they finish._\n",
            done, total_files
        ));
    }
    content
}

/// Banner shown before any result has arrived.
pub fn processing_banner(total_files: u32, estimated_time_minutes: Option<u32>) -> String {
    match estimated_time_minutes {
        Some(minutes) if minutes > 0 => format!(
            "Processing {} files. Results will appear here as each file finishes (estimated time: about {} min).",
            total_files, minutes
        ),
        _ => format!(
            "Processing {} files. Results will appear here as each file finishes.",
            total_files
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: u32, content: Option<&str>, error: Option<&str>) -> ResultRecord {
        ResultRecord {
            index,
            file_name: format!("report_{}.pdf", index),
            content: content.map(str::to_string),
            success: content.is_some(),
            error: error.map(str::to_string),
            processed_at: None,
        }
    }

    fn records(n: u32) -> Vec<ResultRecord> {
        (0..n).map(|i| record(i, Some("ok"), None)).collect()
    }

    #[test]
    fn test_groups_into_fixed_size_batches() {
        let batches = BatchGrouper::new(5).group(&records(6));
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].batch_number, 1);
        assert_eq!(batches[0].files.len(), 5);
        assert_eq!(batches[1].batch_number, 2);
        assert_eq!(batches[1].files.len(), 1);
        assert_eq!(batches[1].files[0].index, 5);
    }

    #[test]
    fn test_grouping_is_idempotent() {
        let input = records(12);
        let grouper = BatchGrouper::default();
        assert_eq!(grouper.group(&input), grouper.group(&input));
    }

    #[test]
    fn test_empty_records_yield_no_batches() {
        assert!(BatchGrouper::default().group(&[]).is_empty());
    }

    #[test]
    fn test_zero_batch_size_uses_default() {
        assert_eq!(BatchGrouper::new(0).batch_size(), DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn test_error_used_when_content_missing() {
        let batches = BatchGrouper::default().group(&[record(0, None, Some("unreadable file"))]);
        assert_eq!(batches[0].files[0].content, "unreadable file");
        assert!(!batches[0].files[0].success);
    }

    #[test]
    fn test_malformed_record_degrades_to_empty_content() {
        let batches = BatchGrouper::default().group(&[
            record(0, None, None),
            record(1, Some("fine"), None),
        ]);
        assert_eq!(batches[0].files[0].content, "");
        assert_eq!(batches[0].files[1].content, "fine");
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```markdown\n# Title\nBody\n```"), "# Title\nBody");
        assert_eq!(strip_code_fences("```\nplain\n```\n"), "plain");
        assert_eq!(strip_code_fences("no fences here"), "no fences here");
        assert_eq!(
            strip_code_fences("keeps ```inline``` fences"),
            "keeps ```inline``` fences"
        );
    }

    #[test]
    fn test_render_content_mentions_every_file() {
        let batches = BatchGrouper::new(5).group(&records(6));
        let content = render_content(&batches, 6);
        assert!(content.contains("## Batch 1"));
        assert!(content.contains("## Batch 2"));
        for i in 0..6 {
            assert!(content.contains(&format!("report_{}.pdf", i)));
        }
        assert!(!content.contains("Processed"));
    }

    #[test]
    fn test_render_content_notes_pending_files() {
        let batches = BatchGrouper::new(5).group(&records(2));
        let content = render_content(&batches, 6);
        assert!(content.contains("Processed 2 of 6 files"));
    }

    #[test]
    fn test_processing_banner() {
        assert!(processing_banner(6, Some(12)).contains("about 12 min"));
        assert!(!processing_banner(6, None).contains("min"));
    }
}
