//! Persisted conversations. Messages are always written dehydrated.

use chrono::{DateTime, SecondsFormat, Utc};
use log::{info, warn};
use uuid::Uuid;

use super::hydrator::ConversationHydrator;
use super::message::{AttachedFile, Message, Role};
use crate::db::conversation_repo::{self, ConversationRow};
use crate::db::{Database, DatabaseError};

/// Title used when a conversation has no user message yet.
pub const DEFAULT_TITLE: &str = "New conversation";

/// Maximum title length, in characters, derived from the first user message.
pub const MAX_DERIVED_TITLE_CHARS: usize = 30;

#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Explicit title for a new conversation.
    pub title: Option<String>,
    pub attached_files: Vec<AttachedFile>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub title: String,
    /// As persisted: job messages carry pointers, not results.
    pub messages: Vec<Message>,
    pub attached_files: Vec<AttachedFile>,
    pub total_tokens: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    match DateTime::parse_from_rfc3339(value) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(e) => {
            warn!("Invalid stored timestamp '{}': {}", value, e);
            DateTime::<Utc>::default()
        }
    }
}

fn to_json<T: serde::Serialize>(column: &'static str, value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialization { column, source: e })
}

fn from_json<T: serde::de::DeserializeOwned>(
    column: &'static str,
    value: &str,
) -> Result<T, DatabaseError> {
    serde_json::from_str(value).map_err(|e| DatabaseError::Serialization { column, source: e })
}

/// Title for a new conversation: explicit, else the first user message
/// truncated, else [`DEFAULT_TITLE`].
pub fn derive_title(explicit: Option<&str>, messages: &[Message]) -> String {
    if let Some(title) = explicit.map(str::trim).filter(|t| !t.is_empty()) {
        return title.to_string();
    }
    messages
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.trim())
        .filter(|c| !c.is_empty())
        .map(|c| c.chars().take(MAX_DERIVED_TITLE_CHARS).collect())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string())
}

/// Sum of prompt and candidate tokens over every message.
pub fn total_tokens(messages: &[Message]) -> u64 {
    messages
        .iter()
        .map(Message::token_count)
        .fold(0, u64::saturating_add)
}

/// Appends files whose id is not present yet.
pub fn union_attachments(existing: &mut Vec<AttachedFile>, added: &[AttachedFile]) {
    for file in added {
        if !existing.iter().any(|f| f.id == file.id) {
            existing.push(file.clone());
        }
    }
}

#[derive(Clone)]
pub struct ConversationStore {
    db: Database,
    hydrator: ConversationHydrator,
}

impl ConversationStore {
    pub fn new(db: Database, hydrator: ConversationHydrator) -> Self {
        Self { db, hydrator }
    }

    /// Creates a conversation (no `chat_id`) or replaces the messages of an
    /// existing one. Returns the conversation id.
    pub fn save(
        &self,
        user_id: &str,
        messages: &[Message],
        chat_id: Option<&str>,
        options: &SaveOptions,
    ) -> Result<String, DatabaseError> {
        let persisted = self.hydrator.dehydrate(messages);
        let messages_json = to_json("messages", &persisted)?;
        let tokens = i64::try_from(total_tokens(&persisted)).unwrap_or(i64::MAX);
        let now = timestamp(Utc::now());

        match chat_id {
            Some(id) => {
                let row = conversation_repo::find_by_id(&self.db, user_id, id)?
                    .ok_or_else(|| DatabaseError::NotFound { id: id.to_string() })?;
                let mut attached: Vec<AttachedFile> =
                    from_json("attached_files", &row.attached_files)?;
                union_attachments(&mut attached, &options.attached_files);

                conversation_repo::update_contents(
                    &self.db,
                    user_id,
                    id,
                    &messages_json,
                    &to_json("attached_files", &attached)?,
                    tokens,
                    &now,
                )?;
                Ok(id.to_string())
            }
            None => {
                let mut attached = Vec::new();
                union_attachments(&mut attached, &options.attached_files);
                let row = ConversationRow {
                    id: Uuid::new_v4().to_string(),
                    user_id: user_id.to_string(),
                    title: derive_title(options.title.as_deref(), &persisted),
                    messages: messages_json,
                    attached_files: to_json("attached_files", &attached)?,
                    total_tokens: tokens,
                    created_at: now.clone(),
                    updated_at: now,
                };
                conversation_repo::insert(&self.db, &row)?;
                info!("Created conversation {} for user {}", row.id, user_id);
                Ok(row.id)
            }
        }
    }

    /// Loads one of `user_id`'s conversations as persisted (dehydrated).
    pub fn load(&self, user_id: &str, id: &str) -> Result<Option<Conversation>, DatabaseError> {
        let Some(row) = conversation_repo::find_by_id(&self.db, user_id, id)? else {
            return Ok(None);
        };
        Ok(Some(Conversation {
            messages: from_json("messages", &row.messages)?,
            attached_files: from_json("attached_files", &row.attached_files)?,
            total_tokens: u64::try_from(row.total_tokens).unwrap_or(0),
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
            id: row.id,
            user_id: row.user_id,
            title: row.title,
        }))
    }

    /// Sidebar listing, newest first.
    pub fn list(&self, user_id: &str) -> Result<Vec<ConversationSummary>, DatabaseError> {
        Ok(conversation_repo::list_by_user(&self.db, user_id)?
            .into_iter()
            .map(|row| ConversationSummary {
                created_at: parse_timestamp(&row.created_at),
                id: row.id,
                title: row.title,
            })
            .collect())
    }

    pub fn rename(&self, user_id: &str, id: &str, title: &str) -> Result<(), DatabaseError> {
        conversation_repo::rename(&self.db, user_id, id, title.trim(), &timestamp(Utc::now()))
    }

    /// Soft delete by the owner. Returns `false` when the user has no such
    /// conversation.
    pub fn archive(&self, user_id: &str, id: &str) -> Result<bool, DatabaseError> {
        match conversation_repo::archive(&self.db, user_id, id, &timestamp(Utc::now())) {
            Ok(()) => {
                info!("Archived conversation {}", id);
                Ok(true)
            }
            Err(DatabaseError::NotFound { .. }) => {
                warn!("Conversation {} not found to archive", id);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
