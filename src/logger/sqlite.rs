//! SQLite audit store (WAL mode).

#![allow(missing_docs)]

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, params};

use crate::core::errors::{ReclaimError, Result};
use crate::logger::{AuditEvent, AuditLevel, AuditSink};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS audit_events (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp   TEXT NOT NULL,
    level       TEXT NOT NULL,
    source      TEXT NOT NULL,
    message     TEXT NOT NULL,
    details     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_events_timestamp ON audit_events(timestamp);
";

#[derive(Debug)]
pub struct SqliteLogger {
    conn: Mutex<Connection>,
}

impl SqliteLogger {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ReclaimError::io(parent, e))?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn insert(&self, event: &AuditEvent) -> Result<()> {
        let details = serde_json::to_string(&event.details)?;
        self.conn.lock().execute(
            "INSERT INTO audit_events (timestamp, level, source, message, details)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.timestamp.to_rfc3339(),
                event.level.as_str(),
                event.source,
                event.message,
                details
            ],
        )?;
        Ok(())
    }

    /// Newest `limit` events, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<AuditEvent>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT timestamp, level, source, message, details
             FROM audit_events ORDER BY id DESC LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (timestamp, level, source, message, details) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| ReclaimError::Serialization {
                    context: "audit timestamp",
                    details: e.to_string(),
                })?;
            events.push(AuditEvent {
                timestamp,
                level: parse_level(&level),
                source,
                message,
                details: serde_json::from_str(&details)?,
            });
        }
        Ok(events)
    }
}

fn parse_level(raw: &str) -> AuditLevel {
    match raw {
        "error" => AuditLevel::Error,
        "warning" => AuditLevel::Warning,
        _ => AuditLevel::Info,
    }
}

impl AuditSink for SqliteLogger {
    fn record_event(&self, event: AuditEvent) {
        if let Err(err) = self.insert(&event) {
            eprintln!("[RCL-AUDIT] sqlite write failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_reads_back_newest_first() {
        let logger = SqliteLogger::open_in_memory().expect("open");
        logger
            .insert(&AuditEvent::cleanup(AuditLevel::Info, "one", serde_json::json!({"bytes": 10})))
            .expect("insert");
        logger
            .insert(&AuditEvent::cleanup(AuditLevel::Error, "two", serde_json::Value::Null))
            .expect("insert");
        let events = logger.recent(10).expect("recent");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message, "two");
        assert_eq!(events[0].level, AuditLevel::Error);
        assert_eq!(events[1].details["bytes"], 10);
        assert_eq!(logger.recent(1).expect("recent").len(), 1);
    }

    #[test]
    fn file_database_persists() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("db").join("audit.sqlite3");
        {
            let logger = SqliteLogger::open(&path).expect("open");
            logger.record_event(AuditEvent::cleanup(AuditLevel::Info, "kept", serde_json::Value::Null));
        }
        let logger = SqliteLogger::open(&path).expect("reopen");
        assert_eq!(logger.recent(5).expect("recent")[0].message, "kept");
    }
}
