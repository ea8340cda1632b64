//! Conversation repository: CRUD for the `conversations` table and the
//! soft-delete move into `archived_conversations`.
//!
//! Every lookup by id is scoped to the owning user; another user's
//! conversation behaves exactly like a missing one.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw conversation row. `messages` and `attached_files` are JSON text.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub messages: String,
    pub attached_files: String,
    pub total_tokens: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl ConversationRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            title: row.get("title")?,
            messages: row.get("messages")?,
            attached_files: row.get("attached_files")?,
            total_tokens: row.get("total_tokens")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Sidebar entry for one conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummaryRow {
    pub id: String,
    pub title: String,
    pub created_at: String,
}

pub fn insert(db: &Database, row: &ConversationRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO conversations (id, user_id, title, messages, attached_files,
             total_tokens, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                row.id,
                row.user_id,
                row.title,
                row.messages,
                row.attached_files,
                row.total_tokens,
                row.created_at,
                row.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Replaces the message list, attachments and token total of a conversation.
pub fn update_contents(
    db: &Database,
    user_id: &str,
    id: &str,
    messages: &str,
    attached_files: &str,
    total_tokens: i64,
    updated_at: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE conversations SET messages=?3, attached_files=?4, total_tokens=?5,
             updated_at=?6 WHERE id=?1 AND user_id=?2",
            params![id, user_id, messages, attached_files, total_tokens, updated_at],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound { id: id.to_string() });
        }
        Ok(())
    })
}

pub fn find_by_id(
    db: &Database,
    user_id: &str,
    id: &str,
) -> Result<Option<ConversationRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM conversations WHERE id = ?1 AND user_id = ?2")?;
        let mut rows = stmt.query_map(params![id, user_id], ConversationRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists a user's conversations, newest first.
pub fn list_by_user(
    db: &Database,
    user_id: &str,
) -> Result<Vec<ConversationSummaryRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, title, created_at FROM conversations
             WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(ConversationSummaryRow {
                id: row.get(0)?,
                title: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    })
}

pub fn rename(
    db: &Database,
    user_id: &str,
    id: &str,
    title: &str,
    updated_at: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE conversations SET title=?3, updated_at=?4 WHERE id=?1 AND user_id=?2",
            params![id, user_id, title, updated_at],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound { id: id.to_string() });
        }
        Ok(())
    })
}

/// Moves a user's conversation into `archived_conversations` in one
/// transaction, recording the user as `deleted_by`.
pub fn archive(
    db: &Database,
    user_id: &str,
    id: &str,
    archived_at: &str,
) -> Result<(), DatabaseError> {
    db.with_transaction(|tx| {
        let copied = tx.execute(
            "INSERT INTO archived_conversations (id, user_id, title, messages, attached_files,
             total_tokens, created_at, updated_at, archived_at, deleted_by)
             SELECT id, user_id, title, messages, attached_files, total_tokens, created_at,
             updated_at, ?3, user_id FROM conversations WHERE id = ?1 AND user_id = ?2",
            params![id, user_id, archived_at],
        )?;
        if copied == 0 {
            return Err(DatabaseError::NotFound { id: id.to_string() });
        }
        tx.execute(
            "DELETE FROM conversations WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(())
    })
}

/// Number of archived copies of a conversation (0 or 1).
pub fn archived_count(db: &Database, id: &str) -> Result<u32, DatabaseError> {
    db.with_conn(|conn| {
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM archived_conversations WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
