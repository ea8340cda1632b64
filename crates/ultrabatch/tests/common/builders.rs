//! Builders for creating test data programmatically.

#![allow(dead_code)]

use ultrabatch::service::{
    JobProgress, JobStatus, JobStatusResponse, RawResultRecord, RecordIndex,
};
use ultrabatch::UploadFile;

/// `count` PDF files named `report_1.pdf` .. `report_{count}.pdf`.
pub fn pdf_files(count: usize) -> Vec<UploadFile> {
    (1..=count)
        .map(|i| UploadFile::new(format!("report_{}.pdf", i), format!("%PDF-{}", i).into_bytes()))
        .collect()
}

/// A successful record the way the job service writes it, with the analysis
/// wrapped in a markdown code fence.
pub fn raw_record(index: u32, file_name: &str) -> RawResultRecord {
    RawResultRecord {
        file_index: Some(RecordIndex::Text(index.to_string())),
        file_name_camel: Some(file_name.to_string()),
        final_message_camel: Some(format!("```markdown\nAnalysis of {}\n```", file_name)),
        success: Some(true),
        ..Default::default()
    }
}

/// A failed record carrying only an error.
pub fn failed_record(index: u32, file_name: &str, error: &str) -> RawResultRecord {
    RawResultRecord {
        file_index: Some(RecordIndex::Number(u64::from(index))),
        file_name_snake: Some(file_name.to_string()),
        error: Some(error.to_string()),
        success: Some(false),
        ..Default::default()
    }
}

/// Records `0..count` for files `names`.
pub fn records_for(names: &[&str], count: usize) -> Vec<RawResultRecord> {
    names
        .iter()
        .take(count)
        .enumerate()
        .map(|(i, name)| raw_record(i as u32, name))
        .collect()
}

/// Builder for `JobStatusResponse` instances.
pub struct StatusBuilder {
    response: JobStatusResponse,
}

impl StatusBuilder {
    pub fn new(job_id: &str, total_files: u32) -> Self {
        Self {
            response: JobStatusResponse {
                success: true,
                job_id: Some(job_id.to_string()),
                status: JobStatus::Processing,
                progress: JobProgress {
                    total_files,
                    ..Default::default()
                },
                ..Default::default()
            },
        }
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.response.status = status;
        self
    }

    /// Sets the records and derives the progress counters from them.
    pub fn results(mut self, results: Vec<RawResultRecord>) -> Self {
        let processed = results.len() as u32;
        let succeeded = results.iter().filter(|r| r.success == Some(true)).count() as u32;
        self.response.progress.processed_files = processed;
        self.response.progress.success_count = succeeded;
        self.response.progress.failure_count = processed - succeeded;
        self.response.results = results;
        self
    }

    pub fn build(self) -> JobStatusResponse {
        self.response
    }
}
