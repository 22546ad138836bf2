//! Durable journal of accepted work items.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection};

use super::QueueError;
use crate::task::WorkItem;

/// Records accepted work so it survives a restart.
pub trait QueueJournal: Send + Sync {
    /// Record an accepted item. Returns its journal id.
    fn append(&self, item: &WorkItem) -> Result<i64, QueueError>;

    /// Forget an item once its task is terminal.
    fn remove(&self, id: i64) -> Result<(), QueueError>;

    /// All journaled items in acceptance order.
    fn load(&self) -> Result<Vec<(i64, WorkItem)>, QueueError>;
}

fn journal_err(e: impl std::fmt::Display) -> QueueError {
    QueueError::Journal(e.to_string())
}

/// SQLite-backed queue journal.
pub struct SqliteQueueJournal {
    conn: Mutex<Connection>,
}

impl SqliteQueueJournal {
    /// Open (or create) the journal in the given database file.
    pub fn new(path: &Path) -> Result<Self, QueueError> {
        let conn = Connection::open(path).map_err(journal_err)?;
        conn.busy_timeout(Duration::from_secs(5)).map_err(journal_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory journal (useful for testing).
    pub fn in_memory() -> Result<Self, QueueError> {
        let conn = Connection::open_in_memory().map_err(journal_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), QueueError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS queue_journal (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                item TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(journal_err)
    }
}

impl QueueJournal for SqliteQueueJournal {
    fn append(&self, item: &WorkItem) -> Result<i64, QueueError> {
        let json = serde_json::to_string(item).map_err(journal_err)?;
        let conn = self.conn.lock().map_err(journal_err)?;
        conn.execute(
            "INSERT INTO queue_journal (item, created_at) VALUES (?1, ?2)",
            params![json, Utc::now().to_rfc3339()],
        )
        .map_err(journal_err)?;
        Ok(conn.last_insert_rowid())
    }

    fn remove(&self, id: i64) -> Result<(), QueueError> {
        let conn = self.conn.lock().map_err(journal_err)?;
        conn.execute("DELETE FROM queue_journal WHERE id = ?1", params![id])
            .map_err(journal_err)?;
        Ok(())
    }

    fn load(&self) -> Result<Vec<(i64, WorkItem)>, QueueError> {
        let conn = self.conn.lock().map_err(journal_err)?;
        let mut stmt = conn
            .prepare("SELECT id, item FROM queue_journal ORDER BY id ASC")
            .map_err(journal_err)?;
        let rows = stmt
            .query_map([], |row| {
                let id: i64 = row.get(0)?;
                let json: String = row.get(1)?;
                Ok((id, json))
            })
            .map_err(journal_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(journal_err)?;

        let mut items = Vec::with_capacity(rows.len());
        for (id, json) in rows {
            match serde_json::from_str::<WorkItem>(&json) {
                Ok(item) => items.push((id, item)),
                Err(e) => {
                    tracing::warn!(journal_id = id, error = %e, "Dropping unreadable journal entry");
                    conn.execute("DELETE FROM queue_journal WHERE id = ?1", params![id])
                        .map_err(journal_err)?;
                }
            }
        }
        Ok(items)
    }
}
