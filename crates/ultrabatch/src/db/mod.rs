//! SQLite persistence for conversations.
//!
//! One connection per `Database`, shared by every clone and serialized by a
//! mutex. Sessions reloading the same file each open their own handle, so
//! file databases wait on locks instead of failing with `SQLITE_BUSY`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, Transaction};

pub mod conversation_repo;
pub mod error;
pub mod migrations;

pub use error::DatabaseError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the conversation database at `path`, creating
    /// parent directories and applying pending migrations.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let db = Self::prepare(conn)?;

        log::info!("Conversation database ready at {}", path.display());
        Ok(db)
    }

    /// A private database that disappears with the last clone.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self, DatabaseError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::run_all(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Database lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Runs `f` with exclusive access to the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.lock();
        f(&conn)
    }

    /// Runs `f` inside a transaction that commits when `f` succeeds and rolls
    /// back otherwise.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, DatabaseError>,
    {
        let conn = self.lock();
        let tx = conn.unchecked_transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

/// `~/.ultrabatch/data/ultrabatch.db`, or `None` without a home directory.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".ultrabatch").join("data").join("ultrabatch.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation_count(db: &Database) -> u32 {
        db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM conversations", [], |r| r.get(0))?)
        })
        .unwrap()
    }

    fn insert_stub(conn: &Connection, id: &str) -> Result<(), DatabaseError> {
        conn.execute(
            "INSERT INTO conversations (id, user_id, title, created_at, updated_at)
             VALUES (?1, 'u1', 'Hello', '2026-01-01', '2026-01-01')",
            [id],
        )?;
        Ok(())
    }

    #[test]
    fn test_file_db_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ultrabatch.db");

        let db = Database::open(&path).unwrap();
        db.with_conn(|conn| insert_stub(conn, "c1")).unwrap();
        drop(db);

        let reopened = Database::open(&path).unwrap();
        assert_eq!(conversation_count(&reopened), 1);
    }

    #[test]
    fn test_two_handles_on_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ultrabatch.db");
        let first = Database::open(&path).unwrap();
        let second = Database::open(&path).unwrap();

        first.with_conn(|conn| insert_stub(conn, "c1")).unwrap();
        assert_eq!(conversation_count(&second), 1);
    }

    #[test]
    fn test_clones_share_the_connection() {
        let db = Database::open_in_memory().unwrap();
        let clone = db.clone();
        db.with_conn(|conn| insert_stub(conn, "c1")).unwrap();
        assert_eq!(conversation_count(&clone), 1);
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        let result: Result<(), DatabaseError> = db.with_transaction(|tx| {
            insert_stub(tx, "c1")?;
            Err(DatabaseError::NotFound { id: "c2".into() })
        });

        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));
        assert_eq!(conversation_count(&db), 0);
    }

    #[test]
    fn test_default_database_path() {
        let path = default_database_path().unwrap();
        assert!(path.ends_with("ultrabatch.db"));
        assert!(path.to_string_lossy().contains(".ultrabatch"));
    }
}
