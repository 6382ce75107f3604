//! Audit logging: one structured event per cleanup batch or scheduler run.
//!
//! Sinks are fire-and-forget. A sink that cannot write degrades (to stderr, or
//! to its healthy sibling in [`dual::DualLogger`]) and never fails the caller.

#![allow(missing_docs)]

pub mod dual;
pub mod jsonl;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Source tag carried by every engine event.
pub const CLEANUP_SOURCE: &str = "Cleanup";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    Info,
    Warning,
    Error,
}

impl AuditLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub level: AuditLevel,
    pub source: String,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl AuditEvent {
    #[must_use]
    pub fn cleanup(level: AuditLevel, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            source: CLEANUP_SOURCE.to_string(),
            message: message.into(),
            details,
        }
    }

    #[must_use]
    pub const fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    fn record_event(&self, event: AuditEvent);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record_event(&self, _event: AuditEvent) {}
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record_event(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}
