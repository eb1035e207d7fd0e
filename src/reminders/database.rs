//! Persistent SQLite storage for reminder tasks.

use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{Connection, Row, params};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::reminders::clock::STORAGE_FORMAT;
use crate::reminders::task::ReminderTask;

#[derive(Debug)]
pub enum StorageError {
    /// Could not open or initialise the database file.
    Open { path: PathBuf, source: rusqlite::Error },
    Query(rusqlite::Error),
    /// A stored date does not parse back.
    CorruptDate { id: i64, value: String },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { path, source } => {
                write!(f, "failed to open database '{}': {}", path.display(), source)
            }
            Self::Query(e) => write!(f, "database query failed: {}", e),
            Self::CorruptDate { id, value } => {
                write!(f, "reminder #{} has unreadable date '{}'", id, value)
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Open { source, .. } => Some(source),
            Self::Query(e) => Some(e),
            Self::CorruptDate { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::FromSqlConversionFailure(_, _, inner) = &e
            && let Some(c) = inner.downcast_ref::<CorruptDate>()
        {
            return StorageError::CorruptDate { id: c.id, value: c.value.clone() };
        }
        StorageError::Query(e)
    }
}

/// Carried through rusqlite's conversion error so it surfaces as `StorageError::CorruptDate`.
#[derive(Debug)]
struct CorruptDate {
    id: i64,
    value: String,
}

impl fmt::Display for CorruptDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unreadable date '{}' on reminder #{}", self.value, self.id)
    }
}

impl std::error::Error for CorruptDate {}

/// Result of an insert attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Created(ReminderTask),
    /// A task with the same (date, text) already exists.
    Duplicate,
}

const SELECT_COLUMNS: &str = "SELECT id, chat_id, notification_text, notification_date FROM notification_tasks";

fn format_date(date: NaiveDateTime) -> String {
    date.format(STORAGE_FORMAT).to_string()
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<ReminderTask> {
    let id: i64 = row.get(0)?;
    let raw: String = row.get(3)?;
    let notification_date = NaiveDateTime::parse_from_str(&raw, STORAGE_FORMAT).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(CorruptDate { id, value: raw.clone() }))
    })?;

    Ok(ReminderTask {
        id,
        chat_id: row.get(1)?,
        notification_text: row.get(2)?,
        notification_date,
    })
}

/// Reminder table backed by SQLite.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Create a new in-memory database.
    pub fn new() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Open { path: PathBuf::from(":memory:"), source: e })?;
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema()
            .map_err(|e| StorageError::Open { path: PathBuf::from(":memory:"), source: e })?;
        Ok(db)
    }

    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)
            .map_err(|e| StorageError::Open { path: path.to_path_buf(), source: e })?;
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema()
            .map_err(|e| StorageError::Open { path: path.to_path_buf(), source: e })?;

        let count = db.count()?;
        info!("Loaded database from {:?} ({} pending reminders)", path, count);
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database lock poisoned")
    }

    fn init_schema(&self) -> rusqlite::Result<()> {
        self.conn().execute_batch(r#"
            CREATE TABLE IF NOT EXISTS notification_tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER NOT NULL,
                notification_text TEXT NOT NULL,
                notification_date TEXT NOT NULL,
                delivery_attempts INTEGER NOT NULL DEFAULT 0,
                UNIQUE (notification_date, notification_text)
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_chat_id ON notification_tasks(chat_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_date ON notification_tasks(notification_date);
        "#)
    }

    /// Insert a task unless one with the same (date, text) exists.
    ///
    /// The check and the write are one statement, so concurrent callers
    /// cannot both create the same reminder.
    pub fn insert(
        &self,
        chat_id: i64,
        text: &str,
        date: NaiveDateTime,
    ) -> Result<InsertOutcome, StorageError> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO notification_tasks (chat_id, notification_text, notification_date)
             VALUES (?1, ?2, ?3)",
            params![chat_id, text, format_date(date)],
        )?;

        if inserted == 0 {
            debug!("Duplicate reminder for {} ignored", date);
            return Ok(InsertOutcome::Duplicate);
        }

        Ok(InsertOutcome::Created(ReminderTask {
            id: conn.last_insert_rowid(),
            chat_id,
            notification_text: text.to_string(),
            notification_date: date,
        }))
    }

    pub fn exists_by_date_and_text(&self, date: NaiveDateTime, text: &str) -> Result<bool, StorageError> {
        let exists: bool = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM notification_tasks WHERE notification_date = ?1 AND notification_text = ?2)",
            params![format_date(date), text],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// All tasks for one chat, oldest first.
    pub fn find_by_chat(&self, chat_id: i64) -> Result<Vec<ReminderTask>, StorageError> {
        self.select(&format!("{SELECT_COLUMNS} WHERE chat_id = ?1 ORDER BY id"), params![chat_id])
    }

    /// Tasks due exactly at `date`.
    pub fn find_by_date(&self, date: NaiveDateTime) -> Result<Vec<ReminderTask>, StorageError> {
        self.select(
            &format!("{SELECT_COLUMNS} WHERE notification_date = ?1 ORDER BY id"),
            params![format_date(date)],
        )
    }

    /// Tasks due at or before `date`.
    pub fn find_due(&self, date: NaiveDateTime) -> Result<Vec<ReminderTask>, StorageError> {
        self.select(
            &format!("{SELECT_COLUMNS} WHERE notification_date <= ?1 ORDER BY notification_date, id"),
            params![format_date(date)],
        )
    }

    /// Tasks a tick for `minute` must deliver: those due exactly then, plus
    /// earlier ones whose delivery already failed at least once.
    pub fn find_for_tick(&self, minute: NaiveDateTime) -> Result<Vec<ReminderTask>, StorageError> {
        self.select(
            &format!(
                "{SELECT_COLUMNS} WHERE notification_date = ?1
                 OR (delivery_attempts > 0 AND notification_date < ?1)
                 ORDER BY notification_date, id"
            ),
            params![format_date(minute)],
        )
    }

    /// Count a failed delivery. Returns the attempts so far.
    pub fn record_failed_delivery(&self, id: i64) -> Result<u32, StorageError> {
        let attempts: i64 = self.conn().query_row(
            "UPDATE notification_tasks SET delivery_attempts = delivery_attempts + 1
             WHERE id = ?1 RETURNING delivery_attempts",
            params![id],
            |row| row.get(0),
        )?;
        Ok(attempts as u32)
    }

    /// Returns false when no such task existed.
    pub fn delete(&self, id: i64) -> Result<bool, StorageError> {
        let deleted = self.conn().execute("DELETE FROM notification_tasks WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    pub fn count(&self) -> Result<usize, StorageError> {
        let count: i64 = self.conn().query_row("SELECT COUNT(*) FROM notification_tasks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn select(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<ReminderTask>, StorageError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let tasks = stmt
            .query_map(params, task_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }
}
