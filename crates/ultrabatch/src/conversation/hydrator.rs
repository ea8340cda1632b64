//! Merges job results into the message list and converts between the
//! expanded in-memory form and the dehydrated persisted form.
//!
//! Every operation here is a reducer: it receives the current messages and
//! returns the next ones (or nothing) without touching shared state.

use std::collections::HashMap;

use log::{debug, warn};

use super::message::{Message, Role, UltraBatchProgress};
use crate::results::{
    file_count, processing_banner, render_content, BatchGrouper, ResultRecord, ResultStoreReader,
};

/// The pointer fields a job contributes to its message pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPointer {
    pub job_id: String,
    pub total_files: u32,
    pub estimated_time_minutes: Option<u32>,
    /// Names of the files that made it into the job.
    pub file_names: Vec<String>,
}

/// Result of one hydration step.
#[derive(Debug, Clone, PartialEq)]
pub enum HydrationOutcome {
    /// Nothing new; the current message list stays as it is.
    Unchanged,
    /// The job's message pair was appended. This list must be persisted once.
    Created(Vec<Message>),
    /// The job's messages were rebuilt in place. Local only.
    Updated(Vec<Message>),
}

impl HydrationOutcome {
    /// The next message list, if the step produced one.
    pub fn into_messages(self) -> Option<Vec<Message>> {
        match self {
            HydrationOutcome::Unchanged => None,
            HydrationOutcome::Created(messages) | HydrationOutcome::Updated(messages) => {
                Some(messages)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConversationHydrator {
    grouper: BatchGrouper,
}

impl ConversationHydrator {
    pub fn new(grouper: BatchGrouper) -> Self {
        Self { grouper }
    }

    pub fn grouper(&self) -> &BatchGrouper {
        &self.grouper
    }

    /// Applies the latest result records for a job.
    ///
    /// - no message carries the job: append the user/assistant pair
    /// - the represented count did not grow: [`HydrationOutcome::Unchanged`]
    /// - otherwise: rebuild the assistant content and bump progress on both
    pub fn hydrate(
        &self,
        messages: &[Message],
        job: &JobPointer,
        records: &[ResultRecord],
    ) -> HydrationOutcome {
        let batches = self.grouper.group(records);
        let count = clamp_count(file_count(&batches), job.total_files);

        if !messages.iter().any(|m| m.carries_job(&job.job_id)) {
            let progress = UltraBatchProgress {
                current: count,
                total: job.total_files,
            };
            let mut user = Message::user(user_prompt(job));
            user.file_names = job.file_names.clone();
            apply_pointer(&mut user, job, progress);

            let mut assistant = Message::assistant(String::new());
            apply_pointer(&mut assistant, job, progress);
            assistant.content = if batches.is_empty() {
                processing_banner(job.total_files, job.estimated_time_minutes)
            } else {
                render_content(&batches, job.total_files)
            };
            assistant.ultra_batch_batches = Some(batches);

            debug!(
                "Created message pair for job {} ({}/{})",
                job.job_id, count, job.total_files
            );

            let mut next = messages.to_vec();
            next.push(user);
            next.push(assistant);
            return HydrationOutcome::Created(next);
        }

        let assistant_pos = messages
            .iter()
            .position(|m| m.role == Role::Assistant && m.carries_job(&job.job_id));

        let shown = assistant_pos
            .map(|pos| shown_count(&messages[pos]))
            .unwrap_or(0);

        if assistant_pos.is_some() && count <= shown {
            return HydrationOutcome::Unchanged;
        }

        // A reload that could not reach the result store keeps the persisted
        // progress while showing nothing; progress must not move backwards.
        let current = messages
            .iter()
            .filter(|m| m.carries_job(&job.job_id))
            .filter_map(|m| m.ultra_batch_progress)
            .map(|p| p.current)
            .max()
            .unwrap_or(0);

        let mut next = messages.to_vec();
        let assistant_pos = match assistant_pos {
            Some(pos) => pos,
            None => {
                // The user half survived without its reply; restore it right after
                let anchor = next
                    .iter()
                    .rposition(|m| m.carries_job(&job.job_id))
                    .map(|p| p + 1)
                    .unwrap_or(next.len());
                let mut assistant = Message::assistant(String::new());
                apply_pointer(&mut assistant, job, UltraBatchProgress::default());
                next.insert(anchor, assistant);
                anchor
            }
        };

        let progress = UltraBatchProgress {
            current: count.max(current).min(job.total_files),
            total: job.total_files,
        };
        for message in next.iter_mut().filter(|m| m.carries_job(&job.job_id)) {
            message.ultra_batch_progress = Some(progress);
        }

        let assistant = &mut next[assistant_pos];
        assistant.content = if batches.is_empty() {
            processing_banner(job.total_files, job.estimated_time_minutes)
        } else {
            render_content(&batches, job.total_files)
        };
        assistant.ultra_batch_batches = Some(batches);

        debug!(
            "Updated job {} messages ({} -> {}/{})",
            job.job_id, current, count, job.total_files
        );

        HydrationOutcome::Updated(next)
    }

    /// The persisted form: assistant job messages keep only their pointer and
    /// a placeholder, and no message keeps derived batches.
    pub fn dehydrate(&self, messages: &[Message]) -> Vec<Message> {
        messages
            .iter()
            .map(|message| {
                let mut persisted = message.clone();
                persisted.ultra_batch_batches = None;
                if persisted.role == Role::Assistant && persisted.ultra_batch_job_id.is_some()
                {
                    persisted.content = processing_banner(
                        persisted.ultra_batch_total.unwrap_or(0),
                        persisted.ultra_batch_estimated_time_minutes,
                    );
                }
                persisted
            })
            .collect()
    }

    /// Re-expands every job pointer from already-fetched records. Jobs missing
    /// from `records_by_job` keep their persisted form.
    pub fn rehydrate_with(
        &self,
        messages: Vec<Message>,
        records_by_job: &HashMap<String, Vec<ResultRecord>>,
    ) -> Vec<Message> {
        let mut next = messages;
        for job_id in job_ids(&next) {
            let Some(records) = records_by_job.get(&job_id) else {
                continue;
            };
            let total = next
                .iter()
                .find(|m| m.carries_job(&job_id))
                .and_then(|m| m.ultra_batch_total)
                .unwrap_or(records.len() as u32);

            let batches = self.grouper.group(records);
            let progress = UltraBatchProgress {
                current: clamp_count(file_count(&batches), total),
                total,
            };

            for message in next.iter_mut().filter(|m| m.carries_job(&job_id)) {
                message.ultra_batch_progress = Some(progress);
                if message.role == Role::Assistant {
                    message.content = if batches.is_empty() {
                        processing_banner(total, message.ultra_batch_estimated_time_minutes)
                    } else {
                        render_content(&batches, total)
                    };
                    message.ultra_batch_batches = Some(batches.clone());
                }
            }
        }
        next
    }

    /// Reads the result store once per job pointer and re-expands the messages.
    ///
    /// A failed read leaves that job's messages in their persisted form.
    pub async fn rehydrate(
        &self,
        messages: Vec<Message>,
        reader: &ResultStoreReader,
    ) -> Vec<Message> {
        let mut records_by_job = HashMap::new();
        for job_id in job_ids(&messages) {
            match reader.read(&job_id).await {
                Ok(records) => {
                    records_by_job.insert(job_id, records);
                }
                Err(e) => {
                    warn!("Failed to rehydrate job {}: {}", job_id, e);
                }
            }
        }
        self.rehydrate_with(messages, &records_by_job)
    }
}

/// Distinct job ids in message order.
pub fn job_ids(messages: &[Message]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for id in messages.iter().filter_map(|m| m.ultra_batch_job_id.as_ref()) {
        if !ids.contains(id) {
            ids.push(id.clone());
        }
    }
    ids
}

/// Files the message actually displays. A persisted or not yet expanded
/// message displays none, whatever its stored progress says.
pub fn shown_count(message: &Message) -> u32 {
    message
        .ultra_batch_batches
        .as_deref()
        .map(|batches| u32::try_from(file_count(batches)).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

fn clamp_count(count: usize, total: u32) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX).min(total)
}

fn apply_pointer(message: &mut Message, job: &JobPointer, progress: UltraBatchProgress) {
    message.ultra_batch_job_id = Some(job.job_id.clone());
    message.ultra_batch_total = Some(job.total_files);
    message.ultra_batch_progress = Some(progress);
    message.ultra_batch_estimated_time_minutes = job.estimated_time_minutes;
}

fn user_prompt(job: &JobPointer) -> String {
    if job.total_files == 1 {
        "Ultra-batch analysis of 1 file".to_string()
    } else {
        format!("Ultra-batch analysis of {} files", job.total_files)
    }
}
