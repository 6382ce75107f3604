//! Persisted delete-on-reboot queue.
//!
//! Items that cannot be removed now are appended to a JSON file. The service
//! drains the queue on its next start, before any scheduled run.

#![allow(missing_docs)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::cancel::CancellationToken;
use crate::deletion::aggressive::AggressiveDeleter;

/// One queued removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDeletion {
    pub path: PathBuf,
    pub scheduled_at: DateTime<Utc>,
}

/// What happened to each queued item during a drain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub removed: Vec<PathBuf>,
    /// Items still on disk, with the reason they could not be removed.
    pub remaining: Vec<(PathBuf, String)>,
}

impl DrainReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.remaining.is_empty()
    }
}

#[derive(Debug)]
pub struct PendingRebootQueue {
    path: PathBuf,
    guard: Mutex<()>,
}

impl PendingRebootQueue {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue `target`. Scheduling the same path twice keeps the first entry.
    pub fn schedule(&self, target: &Path) -> io::Result<()> {
        let _held = self.guard.lock();
        let mut entries = self.read_entries()?;
        if entries.iter().any(|entry| entry.path == target) {
            return Ok(());
        }
        entries.push(PendingDeletion {
            path: target.to_path_buf(),
            scheduled_at: Utc::now(),
        });
        self.write_entries(&entries)
    }

    pub fn list(&self) -> io::Result<Vec<PendingDeletion>> {
        let _held = self.guard.lock();
        self.read_entries()
    }

    /// Attempt every queued removal. Successes (including items that already
    /// vanished) leave the queue; failures stay for the next drain.
    pub fn drain(&self, deleter: &AggressiveDeleter, cancel: &CancellationToken) -> io::Result<DrainReport> {
        let _held = self.guard.lock();
        let entries = self.read_entries()?;
        let mut report = DrainReport {
            removed: Vec::new(),
            remaining: Vec::new(),
        };
        let mut kept = Vec::new();
        for entry in entries {
            if cancel.is_cancelled() {
                kept.push(entry);
                continue;
            }
            let is_directory = fs::symlink_metadata(&entry.path).is_ok_and(|meta| meta.is_dir());
            let outcome = deleter.try_aggressive_delete(&entry.path, is_directory, cancel);
            if outcome.success {
                report.removed.push(entry.path);
            } else {
                let reason = outcome.failure_reason.unwrap_or_else(|| "unknown failure".to_string());
                report.remaining.push((entry.path.clone(), reason));
                kept.push(entry);
            }
        }
        self.write_entries(&kept)?;
        Ok(report)
    }

    fn read_entries(&self) -> io::Result<Vec<PendingDeletion>> {
        match fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(Vec::new()),
            Ok(text) => serde_json::from_str(&text).map_err(io::Error::other),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    fn write_entries(&self, entries: &[PendingDeletion]) -> io::Result<()> {
        if entries.is_empty() {
            return match fs::remove_file(&self.path) {
                Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
                _ => Ok(()),
            };
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_vec_pretty(entries).map_err(io::Error::other)?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, body)?;
        fs::rename(&staging, &self.path)
    }
}
