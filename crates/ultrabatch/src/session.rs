//! One user's chat session: submits ultra-batch jobs, keeps the in-memory
//! conversation current and persists it.

use std::sync::Arc;

use log::{error, info, warn};

use crate::broadcast::{EventBroadcaster, SessionEvent};
use crate::config::{Config, JobServiceConfig, PollingConfig};
use crate::conversation::{
    job_ids, shown_count, AttachedFile, Conversation, ConversationHydrator, ConversationStore,
    ConversationSummary, ConversationView, JobPointer, Message, Role, SaveOptions,
};
use crate::db::{default_database_path, Database, DatabaseError};
use crate::polling::{Poller, PollerRegistry, PollingState, StatusHandler};
use crate::results::{BatchGrouper, ResultRecord, ResultStoreReader};
use crate::service::{
    HttpJobService, HttpObjectStorage, JobService, JobStatus, JobStatusResponse, ObjectStorage,
    ResultStore,
};
use crate::upload::{Job, JobLauncher, UploadCoordinator, UploadFile, UploadOutcome};

/// Extra data for a submission.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Title used if the submission creates the conversation.
    pub title: Option<String>,
    pub attached_files: Vec<AttachedFile>,
}

/// What a successful [`Session::submit`] produced.
#[derive(Debug, Clone)]
pub struct Submission {
    pub job: Job,
    pub upload: UploadOutcome,
    /// `None` when the job pointer could not be persisted.
    pub conversation_id: Option<String>,
}

/// Builds a [`Session`]. Collaborators not supplied are created from config.
pub struct SessionBuilder {
    config: Config,
    user_id: String,
    job_service: Option<Arc<dyn JobService>>,
    result_store: Option<Arc<dyn ResultStore>>,
    object_storage: Option<Arc<dyn ObjectStorage>>,
    database: Option<Database>,
    events: Option<EventBroadcaster>,
}

impl SessionBuilder {
    pub fn new(config: Config, user_id: impl Into<String>) -> Self {
        Self {
            config,
            user_id: user_id.into(),
            job_service: None,
            result_store: None,
            object_storage: None,
            database: None,
            events: None,
        }
    }

    pub fn job_service(mut self, job_service: Arc<dyn JobService>) -> Self {
        self.job_service = Some(job_service);
        self
    }

    pub fn result_store(mut self, result_store: Arc<dyn ResultStore>) -> Self {
        self.result_store = Some(result_store);
        self
    }

    pub fn object_storage(mut self, object_storage: Arc<dyn ObjectStorage>) -> Self {
        self.object_storage = Some(object_storage);
        self
    }

    pub fn database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }

    pub fn events(mut self, events: EventBroadcaster) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> crate::Result<Session> {
        let config = self.config;
        let mut http: Option<Arc<HttpJobService>> = None;

        let job_service: Arc<dyn JobService> = match self.job_service {
            Some(service) => service,
            None => {
                let service: Arc<dyn JobService> = shared_http(&mut http, &config.job_service)?;
                service
            }
        };
        let result_store: Arc<dyn ResultStore> = match self.result_store {
            Some(store) => store,
            None => {
                let store: Arc<dyn ResultStore> = shared_http(&mut http, &config.job_service)?;
                store
            }
        };
        let object_storage: Arc<dyn ObjectStorage> = match self.object_storage {
            Some(storage) => storage,
            None => Arc::new(HttpObjectStorage::new(
                &config.upload,
                config.job_service.connect_timeout(),
            )?),
        };
        let database = match self.database {
            Some(database) => database,
            None => open_database(&config)?,
        };
        let events = self.events.unwrap_or_default();

        let hydrator = ConversationHydrator::new(BatchGrouper::new(config.display.batch_size));

        Ok(Session {
            user_id: self.user_id,
            polling: config.polling.clone(),
            view: ConversationView::new(),
            hydrator,
            store: ConversationStore::new(database, hydrator),
            reader: ResultStoreReader::new(result_store),
            coordinator: UploadCoordinator::new(
                Arc::clone(&job_service),
                object_storage,
                &config.upload,
            ),
            launcher: JobLauncher::new(Arc::clone(&job_service)),
            registry: PollerRegistry::new(events.clone()),
            job_service,
            events,
        })
    }
}

fn shared_http(
    slot: &mut Option<Arc<HttpJobService>>,
    config: &JobServiceConfig,
) -> crate::Result<Arc<HttpJobService>> {
    if let Some(service) = slot {
        return Ok(Arc::clone(service));
    }
    let service = Arc::new(HttpJobService::from_config(config)?);
    *slot = Some(Arc::clone(&service));
    Ok(service)
}

fn open_database(config: &Config) -> Result<Database, DatabaseError> {
    match config.database.path.clone().or_else(default_database_path) {
        Some(path) => Database::open(&path),
        None => {
            warn!("No home directory found, conversations will not outlive this session");
            Database::open_in_memory()
        }
    }
}

pub struct Session {
    user_id: String,
    polling: PollingConfig,
    view: ConversationView,
    hydrator: ConversationHydrator,
    store: ConversationStore,
    reader: ResultStoreReader,
    coordinator: UploadCoordinator,
    launcher: JobLauncher,
    registry: PollerRegistry,
    job_service: Arc<dyn JobService>,
    events: EventBroadcaster,
}

impl Session {
    pub fn builder(config: Config, user_id: impl Into<String>) -> SessionBuilder {
        SessionBuilder::new(config, user_id)
    }

    /// A session talking to the configured HTTP job service.
    pub fn from_config(config: Config, user_id: impl Into<String>) -> crate::Result<Self> {
        SessionBuilder::new(config, user_id).build()
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    /// Snapshot of the in-memory (hydrated) messages.
    pub fn messages(&self) -> Vec<Message> {
        self.view.messages()
    }

    pub fn revision(&self) -> u64 {
        self.view.revision()
    }

    pub fn conversation_id(&self) -> Option<String> {
        self.view.conversation_id()
    }

    pub fn polling_state(&self, job_id: &str) -> Option<PollingState> {
        self.registry.state(job_id)
    }

    pub fn active_jobs(&self) -> Vec<String> {
        self.registry.active_jobs()
    }

    /// Waits until the polling loop for `job_id` has exited.
    pub async fn wait_for_job(&self, job_id: &str) -> Option<PollingState> {
        self.registry.wait(job_id).await
    }

    /// Uploads `files`, launches a job for the ones that landed, records the
    /// job's message pair in the conversation and starts polling it.
    ///
    /// Nothing is added to the conversation when the upload or the launch
    /// fails; both failures are also published as error notifications.
    pub async fn submit(
        &self,
        files: Vec<UploadFile>,
        options: SubmitOptions,
    ) -> crate::Result<Submission> {
        let chat_id = self.view.conversation_id();

        let upload = match self
            .coordinator
            .upload(files, &self.user_id, chat_id.as_deref())
            .await
        {
            Ok(upload) => upload,
            Err(e) => {
                error!("Upload failed: {}", e);
                self.events.error("Upload failed", &e.to_string());
                return Err(e.into());
            }
        };

        if upload.is_partial() {
            let attempted = upload.succeeded.len() + upload.failed.len();
            self.events.warning(
                "Some files failed to upload",
                &format!(
                    "{} of {} files could not be uploaded and will not be analyzed",
                    upload.failed.len(),
                    attempted
                ),
            );
        }

        let job = match self
            .launcher
            .launch(
                &upload.batch_id,
                &self.user_id,
                chat_id.as_deref(),
                upload.succeeded.len(),
            )
            .await
        {
            Ok(job) => job,
            Err(e) => {
                error!("Job launch failed for batch {}: {}", upload.batch_id, e);
                self.events.error("Could not start the analysis", &e.to_string());
                return Err(e.into());
            }
        };

        let pointer = JobPointer {
            job_id: job.job_id.clone(),
            total_files: job.total_files,
            estimated_time_minutes: job.estimated_time_minutes,
            file_names: upload.succeeded.clone(),
        };

        if let Some(revision) = self
            .view
            .update(|messages| self.hydrator.hydrate(messages, &pointer, &[]).into_messages())
        {
            self.events.send(SessionEvent::ViewUpdated { revision });
        }

        let save = SaveOptions {
            title: options.title,
            attached_files: options.attached_files,
        };
        let conversation_id = match self.persist(&save) {
            Ok(id) => Some(id),
            Err(e) => {
                error!("Failed to persist job {}: {}", job.job_id, e);
                self.events.error(
                    "Could not save the conversation",
                    "The analysis continues, but reloading will lose its progress",
                );
                None
            }
        };

        self.events.info(
            "Analysis started",
            &crate::results::processing_banner(job.total_files, job.estimated_time_minutes),
        );
        self.start_polling(pointer);

        Ok(Submission {
            job,
            upload,
            conversation_id,
        })
    }

    /// Reads the status of a job once, outside its polling schedule, and
    /// applies it. Returns the new view revision if anything changed.
    pub async fn refresh_job(&self, job_id: &str) -> crate::Result<Option<u64>> {
        let Some(pointer) = job_pointer(&self.view.messages(), job_id) else {
            warn!("Job {} is not part of the current conversation", job_id);
            return Ok(None);
        };
        let status = Poller::new(Arc::clone(&self.job_service), self.polling.clone())
            .poll_once(job_id)
            .await?;
        Ok(apply_status(
            &self.view,
            &self.hydrator,
            &self.events,
            &pointer,
            &status,
        ))
    }

    /// Loads a persisted conversation into the view, re-expanding every job
    /// from the result store and resuming polling for unfinished ones.
    ///
    /// Polling for the previous conversation stops.
    pub async fn load_conversation(&self, id: &str) -> crate::Result<Option<Conversation>> {
        let Some(mut conversation) = self.store.load(&self.user_id, id)? else {
            warn!("Conversation {} not found", id);
            return Ok(None);
        };
        self.registry.cancel_all();

        let messages = self
            .hydrator
            .rehydrate(std::mem::take(&mut conversation.messages), &self.reader)
            .await;
        let revision = self.view.reset(Some(conversation.id.clone()), messages.clone());
        self.events.send(SessionEvent::ViewUpdated { revision });

        for job_id in job_ids(&messages) {
            let Some(pointer) = job_pointer(&messages, &job_id) else {
                continue;
            };
            // A job whose results could not be read shows nothing yet, so it
            // is polled again even if its persisted progress is complete
            let shown = messages
                .iter()
                .find(|m| m.role == Role::Assistant && m.carries_job(&job_id))
                .map(shown_count)
                .unwrap_or(0);
            if shown < pointer.total_files {
                info!(
                    "Resuming job {} ({}/{} files shown)",
                    job_id, shown, pointer.total_files
                );
                self.start_polling(pointer);
            }
        }

        conversation.messages = messages;
        Ok(Some(conversation))
    }

    /// Starts an empty conversation, stopping all polling.
    pub fn new_conversation(&self) {
        self.registry.cancel_all();
        let revision = self.view.reset(None, Vec::new());
        self.events.send(SessionEvent::ViewUpdated { revision });
    }

    /// Persists the current view. Returns the conversation id.
    pub fn save(&self, options: &SaveOptions) -> crate::Result<String> {
        Ok(self.persist(options)?)
    }

    pub fn list_conversations(&self) -> crate::Result<Vec<ConversationSummary>> {
        Ok(self.store.list(&self.user_id)?)
    }

    pub fn rename_conversation(&self, id: &str, title: &str) -> crate::Result<()> {
        Ok(self.store.rename(&self.user_id, id, title)?)
    }

    /// Archives a conversation. Archiving the open one also clears the view.
    pub fn archive_conversation(&self, id: &str) -> crate::Result<bool> {
        let archived = self.store.archive(&self.user_id, id)?;
        if archived && self.view.conversation_id().as_deref() == Some(id) {
            self.new_conversation();
        }
        Ok(archived)
    }

    /// Stops every polling loop.
    pub fn close(&self) {
        let cancelled = self.registry.cancel_all();
        if cancelled > 0 {
            info!("Session closed, stopped polling {} jobs", cancelled);
        }
    }

    fn persist(&self, options: &SaveOptions) -> Result<String, DatabaseError> {
        let messages = self.view.messages();
        let chat_id = self.view.conversation_id();
        let id = self
            .store
            .save(&self.user_id, &messages, chat_id.as_deref(), options)?;
        Ok(self.view.adopt_conversation_id(&id))
    }

    fn start_polling(&self, pointer: JobPointer) -> bool {
        let handler = status_handler(
            self.view.clone(),
            self.hydrator,
            self.events.clone(),
            pointer.clone(),
        );
        self.registry.start(
            &pointer.job_id,
            pointer.total_files,
            Arc::clone(&self.job_service),
            self.polling.clone(),
            handler,
        )
    }
}

fn status_handler(
    view: ConversationView,
    hydrator: ConversationHydrator,
    events: EventBroadcaster,
    pointer: JobPointer,
) -> StatusHandler {
    Arc::new(move |_job_id: &str, status: &JobStatusResponse| {
        apply_status(&view, &hydrator, &events, &pointer, status);
        if status.is_terminal(pointer.total_files) {
            match status.status {
                JobStatus::Failed => events.error(
                    "Analysis failed",
                    &format!("Job {} reported a failure", pointer.job_id),
                ),
                _ => events.info(
                    "Analysis complete",
                    &format!("{} files processed", status.progress.processed_files),
                ),
            }
        }
    })
}

/// Applies one status read through the view's reducer.
///
/// Jobs that are no longer in the view (another conversation was opened)
/// are ignored.
fn apply_status(
    view: &ConversationView,
    hydrator: &ConversationHydrator,
    events: &EventBroadcaster,
    pointer: &JobPointer,
    status: &JobStatusResponse,
) -> Option<u64> {
    let records: Vec<ResultRecord> = ResultStoreReader::normalize(status.results.clone());
    let revision = view.update(|messages| {
        if !messages.iter().any(|m| m.carries_job(&pointer.job_id)) {
            return None;
        }
        hydrator.hydrate(messages, pointer, &records).into_messages()
    })?;
    events.send(SessionEvent::ViewUpdated { revision });
    Some(revision)
}

/// Rebuilds a job's pointer from the messages that carry it.
fn job_pointer(messages: &[Message], job_id: &str) -> Option<JobPointer> {
    let carrier = messages.iter().find(|m| m.carries_job(job_id))?;
    let file_names = messages
        .iter()
        .find(|m| m.role == Role::User && m.carries_job(job_id))
        .map(|m| m.file_names.clone())
        .unwrap_or_default();
    Some(JobPointer {
        job_id: job_id.to_string(),
        total_files: carrier.ultra_batch_total.unwrap_or(0),
        estimated_time_minutes: carrier.ultra_batch_estimated_time_minutes,
        file_names,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::UltraBatchProgress;

    fn carrier(role: Role, job_id: &str) -> Message {
        let mut message = Message::new(role, "x");
        message.ultra_batch_job_id = Some(job_id.to_string());
        message.ultra_batch_total = Some(4);
        message.ultra_batch_estimated_time_minutes = Some(3);
        message.ultra_batch_progress = Some(UltraBatchProgress {
            current: 1,
            total: 4,
        });
        message
    }

    #[test]
    fn test_job_pointer_from_messages() {
        let mut user = carrier(Role::User, "job-7");
        user.file_names = vec!["a.pdf".into(), "b.pdf".into()];
        let messages = vec![Message::user("hello"), user, carrier(Role::Assistant, "job-7")];

        let pointer = job_pointer(&messages, "job-7").unwrap();
        assert_eq!(pointer.total_files, 4);
        assert_eq!(pointer.estimated_time_minutes, Some(3));
        assert_eq!(pointer.file_names, vec!["a.pdf", "b.pdf"]);
        assert!(job_pointer(&messages, "job-8").is_none());
    }

    #[test]
    fn test_apply_status_ignores_jobs_outside_view() {
        let view = ConversationView::new();
        view.reset(None, vec![Message::user("unrelated")]);
        let before = view.revision();

        let pointer = job_pointer(&[carrier(Role::User, "job-7")], "job-7").unwrap();
        let revision = apply_status(
            &view,
            &ConversationHydrator::default(),
            &EventBroadcaster::default(),
            &pointer,
            &JobStatusResponse::default(),
        );

        assert!(revision.is_none());
        assert_eq!(view.revision(), before);
        assert_eq!(view.messages().len(), 1);
    }
}
