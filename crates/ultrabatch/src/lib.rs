pub mod broadcast;
pub mod config;
pub mod conversation;
pub mod db;
pub mod error;
pub mod polling;
pub mod results;
pub mod sanitize;
pub mod secrets;
pub mod service;
pub mod session;
pub mod telemetry;
pub mod upload;

pub use broadcast::{EventBroadcaster, NotificationLevel, SessionEvent, StopReason};
pub use config::{load_config, load_config_from_str, Config};
pub use conversation::{
    AttachedFile, Conversation, ConversationHydrator, ConversationStore, ConversationSummary,
    ConversationView, HydrationOutcome, JobPointer, Message, Role, SaveOptions, UltraBatchProgress,
};
pub use db::{Database, DatabaseError};
pub use error::{
    ConfigError, JobError, PollError, Result, ServiceError, UltraBatchError, UploadError,
};
pub use polling::{Poller, PollerRegistry, PollingState, StatusHandler};
pub use results::{Batch, BatchFile, BatchGrouper, ResultRecord, ResultStoreReader};
pub use service::{HttpJobService, HttpObjectStorage, JobService, ObjectStorage, ResultStore};
pub use session::{Session, SessionBuilder, SubmitOptions, Submission};
pub use telemetry::{init_logging, TelemetryError};
pub use upload::{FailedUpload, Job, JobLauncher, UploadCoordinator, UploadFile, UploadOutcome};
