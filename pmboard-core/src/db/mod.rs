//! SQLite persistence.
//!
//! [`Database`] is a cheaply cloneable handle around a single connection.
//! Every public method takes the lock once; multi-row position rewrites run
//! inside one transaction so readers never observe a half-renumbered scope.

mod attachments;
mod changelog;
mod features;
mod milestones;
mod projects;
mod schema;
mod subtasks;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::Connection;
use uuid::Uuid;

pub use changelog::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use features::MoveOutcome;
pub use subtasks::{AppliedSubtaskChange, BatchError};

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a database file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    /// Open the database in the platform data directory.
    pub fn open_default() -> Result<Self> {
        Self::open(&Self::default_data_dir()?.join("pmboard.db"))
    }

    /// In-memory database, used by tests.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    pub fn default_data_dir() -> Result<PathBuf> {
        directories::ProjectDirs::from("dev", "pmboard", "pmboard")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .context("Could not determine a data directory for this platform")
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute_batch(schema::SCHEMA)
                .context("Failed to apply schema")?;
            Ok(())
        })?;
        tracing::debug!("database schema up to date");
        Ok(())
    }

    /// Run `f` with exclusive access to the connection.
    pub fn with_connection<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R>,
    {
        let mut guard = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Database lock poisoned: {}", e))?;
        f(&mut guard)
    }

    /// Run `f` on the blocking thread pool so async handlers never block a
    /// runtime worker on SQLite I/O.
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Database) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .context("Database task panicked")?
    }
}

/// Current time at storage precision, so values round-trip unchanged.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

pub(crate) fn parse_uuid(idx: usize, raw: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn parse_opt_uuid(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<Uuid>> {
    raw.map(|s| parse_uuid(idx, &s)).transpose()
}

pub(crate) fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

pub(crate) fn parse_date(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<NaiveDate>> {
    raw.map(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|e| conversion_error(idx, e)))
        .transpose()
}

pub(crate) fn parse_enum<T>(
    idx: usize,
    raw: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    parse(raw).ok_or_else(|| conversion_error(idx, format!("unexpected value '{}'", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn migrate_is_idempotent() {
        let db = Database::open_memory().unwrap();
        db.migrate().unwrap();
        db.migrate().unwrap();
    }

    #[test]
    fn open_creates_missing_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("board.db");

        let db = Database::open(&path).unwrap();
        db.migrate().unwrap();

        assert!(path.exists());
    }

    #[test]
    fn timestamps_round_trip_at_millisecond_precision() {
        let ts = now();
        let parsed = parse_ts(0, &format_ts(&ts)).unwrap();
        assert_eq!(parsed, ts);
    }

    #[tokio::test]
    async fn call_runs_on_blocking_pool() {
        let db = Database::open_memory().unwrap();
        db.migrate().unwrap();
        let projects = db.call(|db| db.list_projects()).await.unwrap();
        assert!(projects.is_empty());
    }
}
