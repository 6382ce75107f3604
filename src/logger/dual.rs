//! Dual-write audit sink: JSONL always, SQLite when available.
//!
//! Either backend may be missing or failing; the other keeps recording.

#![allow(missing_docs)]

use crate::core::config::LoggingConfig;
use crate::logger::jsonl::JsonlLogger;
#[cfg(feature = "sqlite")]
use crate::logger::sqlite::SqliteLogger;
use crate::logger::{AuditEvent, AuditSink};

#[derive(Debug, Default)]
pub struct DualLogger {
    jsonl: Option<JsonlLogger>,
    #[cfg(feature = "sqlite")]
    sqlite: Option<SqliteLogger>,
}

impl DualLogger {
    /// Open whichever backends the configuration names. Open failures are
    /// reported on stderr and leave that backend disabled.
    #[must_use]
    pub fn from_config(config: &LoggingConfig) -> Self {
        let jsonl = match JsonlLogger::open(&config.jsonl_path) {
            Ok(logger) => Some(logger),
            Err(err) => {
                eprintln!(
                    "[RCL-AUDIT] cannot open {}: {err}; audit events go to stderr",
                    config.jsonl_path.display()
                );
                None
            }
        };
        Self {
            jsonl,
            #[cfg(feature = "sqlite")]
            sqlite: config.sqlite_path.as_deref().and_then(|path| match SqliteLogger::open(path) {
                Ok(logger) => Some(logger),
                Err(err) => {
                    eprintln!("[RCL-AUDIT] sqlite audit store disabled: {err}");
                    None
                }
            }),
        }
    }

    #[must_use]
    pub const fn jsonl(&self) -> Option<&JsonlLogger> {
        self.jsonl.as_ref()
    }

    #[cfg(feature = "sqlite")]
    #[must_use]
    pub const fn sqlite(&self) -> Option<&SqliteLogger> {
        self.sqlite.as_ref()
    }

    fn has_backend(&self) -> bool {
        #[cfg(feature = "sqlite")]
        if self.sqlite.is_some() {
            return true;
        }
        self.jsonl.is_some()
    }
}

impl AuditSink for DualLogger {
    fn record_event(&self, event: AuditEvent) {
        if !self.has_backend() {
            if let Ok(line) = serde_json::to_string(&event) {
                eprintln!("[RCL-AUDIT] {line}");
            }
            return;
        }
        #[cfg(feature = "sqlite")]
        if let Some(sqlite) = &self.sqlite {
            sqlite.record_event(event.clone());
        }
        if let Some(jsonl) = &self.jsonl {
            jsonl.record_event(event);
        }
    }
}
