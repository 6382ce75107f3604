//! Append-only JSON-lines audit log.
//!
//! One event per line. After the first write failure the logger switches to
//! stderr for the rest of the process lifetime.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::logger::{AuditEvent, AuditSink};

#[derive(Debug)]
pub struct JsonlLogger {
    path: PathBuf,
    file: Mutex<Option<File>>,
    degraded: AtomicBool,
}

impl JsonlLogger {
    /// Open (creating parents) `path` for appending.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
            degraded: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True once a write has failed and output went to stderr instead.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Write one event, reporting failure instead of degrading.
    pub fn try_record(&self, event: &AuditEvent) -> io::Result<()> {
        let mut line = serde_json::to_vec(event).map_err(io::Error::other)?;
        line.push(b'\n');
        let mut guard = self.file.lock();
        let file = guard
            .as_mut()
            .ok_or_else(|| io::Error::other("audit log closed after an earlier failure"))?;
        let written = file.write_all(&line).and_then(|()| file.flush());
        if written.is_err() {
            *guard = None;
        }
        written
    }

    /// Read back every parseable event. Malformed lines are skipped.
    pub fn read_all(path: &Path) -> io::Result<Vec<AuditEvent>> {
        let text = fs::read_to_string(path)?;
        Ok(text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

impl AuditSink for JsonlLogger {
    fn record_event(&self, event: AuditEvent) {
        if !self.is_degraded() && self.try_record(&event).is_ok() {
            return;
        }
        self.degraded.store(true, Ordering::Relaxed);
        if let Ok(line) = serde_json::to_string(&event) {
            eprintln!("[RCL-AUDIT] {line}");
        }
    }
}
