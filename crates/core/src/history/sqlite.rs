//! SQLite-backed history store.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{HistoryError, HistoryFilter, HistoryRecord, HistoryStore};
use crate::task::{normalize_path, Task};

/// SQLite-backed history store. Records and logs live in separate tables
/// and are written in one transaction.
pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
}

/// Fixed-width UTC timestamp so text ordering matches time ordering.
fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn db_err(e: impl std::fmt::Display) -> HistoryError {
    HistoryError::Database(e.to_string())
}

impl SqliteHistoryStore {
    /// Create a new SQLite history store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, HistoryError> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.busy_timeout(Duration::from_secs(5)).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite history store (useful for testing).
    pub fn in_memory() -> Result<Self, HistoryError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), HistoryError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS history (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id TEXT NOT NULL UNIQUE,
                identity TEXT NOT NULL,
                state TEXT NOT NULL,
                finished_at TEXT NOT NULL,
                output_dir TEXT,
                task TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS task_logs (
                task_id TEXT PRIMARY KEY,
                lines TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_history_identity ON history(identity, state);
            CREATE INDEX IF NOT EXISTS idx_history_finished_at ON history(finished_at);
            CREATE INDEX IF NOT EXISTS idx_history_output_dir ON history(output_dir);
            "#,
        )
        .map_err(db_err)?;

        Ok(())
    }

    fn build_where_clause(filter: &HistoryFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref state) = filter.state {
            conditions.push("state = ?");
            params.push(Box::new(state.clone()));
        }

        if let Some(ref from) = filter.from {
            conditions.push("finished_at >= ?");
            params.push(Box::new(timestamp(from)));
        }

        if let Some(ref to) = filter.to {
            conditions.push("finished_at <= ?");
            params.push(Box::new(timestamp(to)));
        }

        if let Some(ref identity) = filter.identity {
            conditions.push("identity = ?");
            params.push(Box::new(identity.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<HistoryRecord> {
        let seq: i64 = row.get(0)?;
        let task_json: String = row.get(1)?;
        let task: Task = serde_json::from_str(&task_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(HistoryRecord { seq, task })
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn append(&self, task: &Task, log: &[String]) -> Result<HistoryRecord, HistoryError> {
        if !task.state.is_terminal() {
            return Err(HistoryError::NotTerminal(task.id.clone()));
        }

        let finished_at = task.finished_at.unwrap_or_else(Utc::now);
        let output_dir = task
            .state
            .summary()
            .and_then(|s| s.output_dir.as_ref())
            .map(|p| normalize_path(p).to_string_lossy().into_owned());
        let task_json = serde_json::to_string(task).map_err(db_err)?;
        let log_json = serde_json::to_string(log).map_err(db_err)?;

        let mut conn = self.conn.lock().map_err(db_err)?;
        let tx = conn.transaction().map_err(db_err)?;

        let inserted = tx.execute(
            "INSERT INTO history (task_id, identity, state, finished_at, output_dir, task)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                task.id,
                task.identity,
                task.state.state_type(),
                timestamp(&finished_at),
                output_dir,
                task_json,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(HistoryError::Duplicate(task.id.clone()));
            }
            Err(e) => return Err(db_err(e)),
        }
        let seq = tx.last_insert_rowid();

        tx.execute(
            "INSERT OR REPLACE INTO task_logs (task_id, lines) VALUES (?1, ?2)",
            params![task.id, log_json],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)?;

        Ok(HistoryRecord {
            seq,
            task: task.clone(),
        })
    }

    fn get(&self, task_id: &str) -> Result<Option<HistoryRecord>, HistoryError> {
        let conn = self.conn.lock().map_err(db_err)?;
        conn.query_row(
            "SELECT seq, task FROM history WHERE task_id = ?1",
            params![task_id],
            Self::row_to_record,
        )
        .optional()
        .map_err(db_err)
    }

    fn list(&self, filter: &HistoryFilter) -> Result<Vec<HistoryRecord>, HistoryError> {
        let conn = self.conn.lock().map_err(db_err)?;
        let (where_clause, mut params) = Self::build_where_clause(filter);

        // Completion order is append order.
        let sql = format!(
            "SELECT seq, task FROM history {} ORDER BY seq DESC LIMIT ? OFFSET ?",
            where_clause
        );
        params.push(Box::new(filter.limit));
        params.push(Box::new(filter.offset));

        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let records = stmt
            .query_map(param_refs.as_slice(), Self::row_to_record)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;

        Ok(records)
    }

    fn count(&self, filter: &HistoryFilter) -> Result<i64, HistoryError> {
        let conn = self.conn.lock().map_err(db_err)?;
        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM history {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(db_err)
    }

    fn log(&self, task_id: &str) -> Result<Option<Vec<String>>, HistoryError> {
        let conn = self.conn.lock().map_err(db_err)?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT lines FROM task_logs WHERE task_id = ?1",
                params![task_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;

        raw.map(|json| serde_json::from_str(&json).map_err(db_err))
            .transpose()
    }

    fn delete(&self, task_id: &str) -> Result<HistoryRecord, HistoryError> {
        let mut conn = self.conn.lock().map_err(db_err)?;
        let tx = conn.transaction().map_err(db_err)?;

        let record = tx
            .query_row(
                "SELECT seq, task FROM history WHERE task_id = ?1",
                params![task_id],
                Self::row_to_record,
            )
            .optional()
            .map_err(db_err)?
            .ok_or_else(|| HistoryError::NotFound(task_id.to_string()))?;

        tx.execute("DELETE FROM history WHERE task_id = ?1", params![task_id])
            .map_err(db_err)?;
        tx.execute("DELETE FROM task_logs WHERE task_id = ?1", params![task_id])
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;

        Ok(record)
    }

    fn last_success(&self, identity: &str) -> Result<Option<DateTime<Utc>>, HistoryError> {
        let conn = self.conn.lock().map_err(db_err)?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT MAX(finished_at) FROM history WHERE identity = ?1 AND state = 'succeeded'",
                params![identity],
                |row| row.get(0),
            )
            .map_err(db_err)?;

        Ok(raw.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        }))
    }

    fn count_output_refs(&self, output_dir: &Path) -> Result<i64, HistoryError> {
        let conn = self.conn.lock().map_err(db_err)?;
        conn.query_row(
            "SELECT COUNT(*) FROM history WHERE output_dir = ?1",
            params![normalize_path(output_dir).to_string_lossy()],
            |row| row.get(0),
        )
        .map_err(db_err)
    }
}
