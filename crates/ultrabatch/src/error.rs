use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UltraBatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Polling error: {0}")]
    Poll(#[from] PollError),

    #[error("Job service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),

    #[error("Logging setup error: {0}")]
    Telemetry(#[from] crate::telemetry::TelemetryError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

/// Failures talking to the job service or to object storage.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Request to '{url}' failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to '{url}' returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Failed to decode response from '{url}': {reason}")]
    Decode { url: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("No files were selected for upload")]
    EmptyBatch,

    #[error("Too many files: {count} selected, at most {max} allowed per job")]
    TooManyFiles { count: usize, max: usize },

    #[error("All {failed} uploads failed")]
    AllUploadsFailed { failed: usize },

    #[error("Failed to request upload slots: {0}")]
    SlotRequest(#[source] ServiceError),

    #[error("Failed to read '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Job service rejected the job: {reason}")]
    Creation { reason: String },

    #[error(transparent)]
    Service(#[from] ServiceError),
}

#[derive(Error, Debug)]
pub enum PollError {
    #[error("Status request for job {job_id} timed out after {after:?}")]
    Timeout { job_id: String, after: Duration },

    #[error(transparent)]
    Service(#[from] ServiceError),
}

pub type Result<T> = std::result::Result<T, UltraBatchError>;
