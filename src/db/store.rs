//! SQLite database store implementation.

use crate::model::{format_timespan, parse_timespan, HealthCheck, HealthCheckEntry, HealthCheckHistoryEntry, HealthStatus};
use crate::state::{apply_update, create_entry, status_transition, Clock, IngestOutcome};

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

const DB_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database lock poisoned")]
    LockPoisoned,
    #[error("Health check {0:?} is not registered")]
    UnregisteredCheck(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Thread-safe database store.
///
/// Every write runs under the connection lock, so ingests for the same key
/// never interleave.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> Result<Self, DbError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        embedded::migrations::runner()
            .run(&mut conn)
            .map_err(|e| DbError::Migration(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    // --- Health check definitions ---

    /// Store a definition. If one with the same name exists it is returned
    /// unchanged.
    pub fn register_health_check(&self, check: &HealthCheck) -> Result<HealthCheck, DbError> {
        let conn = self.conn()?;
        if let Some(existing) = select_health_check(&conn, &check.name)? {
            return Ok(existing);
        }

        let mut stored = check.clone();
        if stored.id.is_nil() {
            stored.id = Uuid::new_v4();
        }
        conn.execute(
            "INSERT INTO health_checks (id, name, description, tags) VALUES (?1, ?2, ?3, ?4)",
            params![
                stored.id.to_string(),
                stored.name,
                stored.description,
                serde_json::to_string(&stored.tags)?,
            ],
        )?;
        Ok(stored)
    }

    pub fn find_health_check(&self, name: &str) -> Result<Option<HealthCheck>, DbError> {
        let conn = self.conn()?;
        select_health_check(&conn, name)
    }

    // --- Entries ---

    /// Apply one reported result, stamped with the clock's time.
    ///
    /// Runs in a single transaction: a new entry and its first history row
    /// are written together or not at all. The clock is read under the
    /// lock, so history times follow the order ingests are applied in.
    pub fn ingest(&self, incoming: &HealthCheckEntry, clock: &dyn Clock) -> Result<IngestOutcome, DbError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let now = clock.now();

        let existing = select_entry(&tx, incoming.application_id, &incoming.server_name, &incoming.name)?;
        let outcome = match existing {
            None => {
                let definition = select_health_check(&tx, &incoming.name)?
                    .ok_or_else(|| DbError::UnregisteredCheck(incoming.name.clone()))?;
                let (entry, history) = create_entry(incoming, &definition, now);
                insert_entry(&tx, &entry, definition.id)?;
                insert_history(&tx, &history)?;
                IngestOutcome {
                    entry_id: entry.id,
                    created: true,
                    history_appended: true,
                }
            }
            Some(mut entry) => {
                let latest = latest_history(&tx, entry.id)?;
                let appended = match status_transition(entry.id, latest.as_ref(), incoming, now) {
                    Some(history) => {
                        insert_history(&tx, &history)?;
                        true
                    }
                    None => false,
                };
                apply_update(&mut entry, incoming, now);
                update_entry(&tx, &entry)?;
                IngestOutcome {
                    entry_id: entry.id,
                    created: false,
                    history_appended: appended,
                }
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    /// Current entries of an application, each with its definition.
    pub fn get_application_entries(&self, application_id: Uuid) -> Result<Vec<HealthCheckEntry>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE e.application_id = ?1 ORDER BY e.name, e.server_name",
            ENTRY_SELECT
        ))?;
        let entries = stmt
            .query_map(params![application_id.to_string()], entry_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(entries)
    }

    /// Entries of one check across servers, each with its history.
    pub fn get_check_entries(&self, application_id: Uuid, name: &str) -> Result<Vec<HealthCheckEntry>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE e.application_id = ?1 AND e.name = ?2 ORDER BY e.server_name",
            ENTRY_SELECT
        ))?;
        let mut entries = stmt
            .query_map(params![application_id.to_string(), name], entry_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        for entry in &mut entries {
            entry.history_entries = Some(select_history(&conn, entry.id)?);
        }
        Ok(entries)
    }

    /// History of an entry, most recent first.
    pub fn get_history(&self, entry_id: Uuid) -> Result<Vec<HealthCheckHistoryEntry>, DbError> {
        let conn = self.conn()?;
        Ok(select_history(&conn, entry_id)?)
    }
}

const ENTRY_SELECT: &str = "SELECT e.id, e.application_id, e.server_name, e.name, e.description, e.status, \
     e.last_execution, e.last_duration, c.id, c.name, c.description, c.tags \
     FROM health_check_entries e JOIN health_checks c ON c.id = e.health_check_id";

const HISTORY_SELECT: &str = "SELECT id, entry_id, status, status_from, last_execution, last_duration \
     FROM health_check_history_entries WHERE entry_id = ?1 ORDER BY last_execution DESC, rowid DESC";

fn select_health_check(conn: &Connection, name: &str) -> Result<Option<HealthCheck>, DbError> {
    let check = conn
        .query_row(
            "SELECT id, name, description, tags FROM health_checks WHERE name = ?1",
            params![name],
            |row| health_check_from_row(row, 0),
        )
        .optional()?;
    Ok(check)
}

/// Entry by key, without its definition.
fn select_entry(
    conn: &Connection,
    application_id: Uuid,
    server_name: &str,
    name: &str,
) -> Result<Option<HealthCheckEntry>, DbError> {
    let entry = conn
        .query_row(
            &format!(
                "{} WHERE e.application_id = ?1 AND e.server_name = ?2 AND e.name = ?3",
                ENTRY_SELECT
            ),
            params![application_id.to_string(), server_name, name],
            entry_from_row,
        )
        .optional()?;
    Ok(entry)
}

fn insert_entry(conn: &Connection, entry: &HealthCheckEntry, health_check_id: Uuid) -> SqlResult<()> {
    conn.execute(
        "INSERT INTO health_check_entries (id, application_id, server_name, name, description, status, last_execution, last_duration, health_check_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            entry.id.to_string(),
            entry.application_id.to_string(),
            entry.server_name,
            entry.name,
            entry.description,
            entry.status.to_db(),
            format_db_time(entry.last_execution),
            format_timespan(entry.last_duration),
            health_check_id.to_string(),
        ],
    )?;
    Ok(())
}

fn update_entry(conn: &Connection, entry: &HealthCheckEntry) -> SqlResult<()> {
    conn.execute(
        "UPDATE health_check_entries SET description = ?1, status = ?2, last_execution = ?3, last_duration = ?4 WHERE id = ?5",
        params![
            entry.description,
            entry.status.to_db(),
            format_db_time(entry.last_execution),
            format_timespan(entry.last_duration),
            entry.id.to_string(),
        ],
    )?;
    Ok(())
}

fn insert_history(conn: &Connection, history: &HealthCheckHistoryEntry) -> SqlResult<()> {
    conn.execute(
        "INSERT INTO health_check_history_entries (id, entry_id, status, status_from, last_execution, last_duration) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            history.id.to_string(),
            history.entry_id.to_string(),
            history.status.to_db(),
            format_db_time(history.status_from),
            format_db_time(history.last_execution),
            format_timespan(history.last_duration),
        ],
    )?;
    Ok(())
}

fn latest_history(conn: &Connection, entry_id: Uuid) -> SqlResult<Option<HealthCheckHistoryEntry>> {
    conn.query_row(
        &format!("{} LIMIT 1", HISTORY_SELECT),
        params![entry_id.to_string()],
        history_from_row,
    )
    .optional()
}

fn select_history(conn: &Connection, entry_id: Uuid) -> SqlResult<Vec<HealthCheckHistoryEntry>> {
    let mut stmt = conn.prepare(HISTORY_SELECT)?;
    let rows = stmt.query_map(params![entry_id.to_string()], history_from_row)?;
    rows.collect()
}

// --- Row mapping ---

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn uuid_at(row: &Row, idx: usize) -> SqlResult<Uuid> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e.to_string()))
}

fn time_at(row: &Row, idx: usize) -> SqlResult<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    parse_db_time(&s).ok_or_else(|| conversion_error(idx, format!("invalid time {:?}", s)))
}

fn duration_at(row: &Row, idx: usize) -> SqlResult<Duration> {
    let s: String = row.get(idx)?;
    parse_timespan(&s).ok_or_else(|| conversion_error(idx, format!("invalid duration {:?}", s)))
}

fn status_at(row: &Row, idx: usize) -> SqlResult<HealthStatus> {
    let value: i64 = row.get(idx)?;
    HealthStatus::from_db(value)
        .ok_or_else(|| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, format!("invalid status {}", value).into()))
}

fn health_check_from_row(row: &Row, offset: usize) -> SqlResult<HealthCheck> {
    let tags: String = row.get(offset + 3)?;
    Ok(HealthCheck {
        id: uuid_at(row, offset)?,
        name: row.get(offset + 1)?,
        description: row.get(offset + 2)?,
        tags: serde_json::from_str(&tags).map_err(|e| conversion_error(offset + 3, e.to_string()))?,
    })
}

fn entry_from_row(row: &Row) -> SqlResult<HealthCheckEntry> {
    Ok(HealthCheckEntry {
        id: uuid_at(row, 0)?,
        application_id: uuid_at(row, 1)?,
        server_name: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        status: status_at(row, 5)?,
        last_execution: time_at(row, 6)?,
        last_duration: duration_at(row, 7)?,
        health_check: Some(health_check_from_row(row, 8)?),
        history_entries: None,
    })
}

fn history_from_row(row: &Row) -> SqlResult<HealthCheckHistoryEntry> {
    Ok(HealthCheckHistoryEntry {
        id: uuid_at(row, 0)?,
        entry_id: uuid_at(row, 1)?,
        status: status_at(row, 2)?,
        status_from: time_at(row, 3)?,
        last_execution: time_at(row, 4)?,
        last_duration: duration_at(row, 5)?,
    })
}

fn format_db_time(t: DateTime<Utc>) -> String {
    t.format(DB_TIME_FORMAT).to_string()
}

fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [DB_TIME_FORMAT, "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
}
