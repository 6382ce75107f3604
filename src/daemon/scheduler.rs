//! Automation scheduler: periodic preview → trim → delete runs.
//!
//! ```text
//! idle -> (timer or run_once) -> running [single-flight]
//!      -> skipped: disabled | skipped: no candidates | completed | failed
//!      -> idle
//! ```
//!
//! A trigger that arrives while a run is active is dropped, not queued. Every
//! run that gets past the single-flight gate records exactly one audit event.

#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::json;

use crate::core::cancel::CancellationToken;
use crate::core::clock::Clock;
use crate::core::errors::{ReclaimError, Result};
use crate::core::units::format_bytes;
use crate::daemon::automation::AutomationSettings;
use crate::daemon::settings_store::SettingsStore;
use crate::deletion::model::{DeletionOptions, DeletionResult};
use crate::deletion::pipeline::DeletionPipeline;
use crate::logger::{AuditEvent, AuditLevel, AuditSink};
use crate::platform::locks::LockInspector;
use crate::scanner::preview::{PreviewItem, PreviewSource};
use crate::scanner::target::TargetDefinition;

/// Longest the timer sleeps before re-reading settings.
pub const MAX_TIMER_WAIT: Duration = Duration::from_secs(60);

/// What one trigger produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum RunOutcome {
    Completed { result: DeletionResult, locked_skipped: usize },
    Skipped { reason: String },
    /// Another run held the single-flight lock; this trigger was dropped.
    AlreadyRunning,
    Cancelled { partial: DeletionResult },
    Failed { error: String },
}

impl RunOutcome {
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Collaborators a scheduler drives.
pub struct SchedulerParts {
    pub preview: Arc<dyn PreviewSource>,
    pub pipeline: Arc<DeletionPipeline>,
    pub store: Arc<dyn SettingsStore>,
    pub audit: Arc<dyn AuditSink>,
    pub locks: Arc<dyn LockInspector>,
    pub clock: Arc<dyn Clock>,
    /// Full target list; each run narrows it with [`AutomationSettings::scope`].
    pub targets: Vec<TargetDefinition>,
    /// Filters shared with manual cleanup; the deletion mode layers over them.
    pub base_options: DeletionOptions,
}

enum Control {
    Wake,
    Shutdown,
}

struct Inner {
    parts: SchedulerParts,
    settings: RwLock<AutomationSettings>,
    /// Start of the latest enabled run, whatever its outcome. Not persisted.
    last_attempt: Mutex<Option<DateTime<Utc>>>,
    running: AtomicBool,
    cancel: CancellationToken,
}

/// Clears the single-flight flag when a run ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct AutomationScheduler {
    inner: Arc<Inner>,
    timer: Mutex<Option<(Sender<Control>, JoinHandle<()>)>>,
}

impl std::fmt::Debug for AutomationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutomationScheduler")
            .field("settings", &*self.inner.settings.read())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl AutomationScheduler {
    /// Build a scheduler, loading persisted settings from the store.
    pub fn new(parts: SchedulerParts) -> Result<Self> {
        let settings = parts.store.load()?.normalized();
        Ok(Self {
            inner: Arc::new(Inner {
                parts,
                settings: RwLock::new(settings),
                last_attempt: Mutex::new(None),
                running: AtomicBool::new(false),
                cancel: CancellationToken::new(),
            }),
            timer: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn settings(&self) -> AutomationSettings {
        self.inner.settings.read().clone()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Clamp, persist, then adopt `settings`. If persisting fails the active
    /// settings are left untouched.
    pub fn apply_settings(&self, settings: AutomationSettings) -> Result<AutomationSettings> {
        let normalized = settings.normalized();
        self.inner.parts.store.save(&normalized)?;
        *self.inner.settings.write() = normalized.clone();
        if let Some((tx, _)) = self.timer.lock().as_ref() {
            let _ = tx.send(Control::Wake);
        }
        Ok(normalized)
    }

    /// Run immediately, honoring single-flight.
    pub fn run_once(&self, cancel: &CancellationToken) -> RunOutcome {
        self.inner.run(cancel)
    }

    /// Start the background timer thread. Idempotent.
    pub fn start(&self) -> Result<()> {
        let mut timer = self.timer.lock();
        if timer.is_some() {
            return Ok(());
        }
        let (tx, rx) = crossbeam_channel::unbounded();
        let inner = Arc::clone(&self.inner);
        let handle = std::thread::Builder::new()
            .name("reclaim-scheduler".to_string())
            .spawn(move || timer_loop(&inner, &rx))
            .map_err(|e| ReclaimError::Runtime {
                details: format!("failed to spawn scheduler thread: {e}"),
            })?;
        *timer = Some((tx, handle));
        Ok(())
    }

    /// Cancel any active run and stop the timer thread. Final: a stopped
    /// scheduler's timer exits immediately if started again.
    pub fn stop(&self) {
        self.inner.cancel.cancel();
        if let Some((tx, handle)) = self.timer.lock().take() {
            let _ = tx.send(Control::Shutdown);
            let _ = handle.join();
        }
    }
}

impl Drop for AutomationScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn timer_loop(inner: &Inner, rx: &Receiver<Control>) {
    loop {
        let wait = inner.time_until_due();
        match rx.recv_timeout(wait) {
            Ok(Control::Wake) => {}
            Ok(Control::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                let settings = inner.settings.read().clone();
                if settings.enabled && inner.next_trigger(&settings) <= inner.parts.clock.now() {
                    let _ = inner.run(&inner.cancel);
                }
            }
        }
        if inner.cancel.is_cancelled() {
            break;
        }
    }
}

impl Inner {
    fn time_until_due(&self) -> Duration {
        let settings = self.settings.read();
        if !settings.enabled {
            return MAX_TIMER_WAIT;
        }
        let remaining = self
            .next_trigger(&settings)
            .signed_duration_since(self.parts.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        remaining.min(MAX_TIMER_WAIT)
    }

    /// The persisted due time, pushed back one interval after a failed or
    /// cancelled attempt so the timer does not spin on a persistent failure.
    fn next_trigger(&self, settings: &AutomationSettings) -> DateTime<Utc> {
        let due = settings.next_due();
        let Some(attempt) = *self.last_attempt.lock() else {
            return due;
        };
        let interval = chrono::Duration::minutes(i64::from(settings.interval_minutes));
        due.max(attempt.checked_add_signed(interval).unwrap_or(DateTime::<Utc>::MAX_UTC))
    }

    fn run(&self, cancel: &CancellationToken) -> RunOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return RunOutcome::AlreadyRunning;
        }
        let _guard = RunGuard(&self.running);

        let settings = self.settings.read().clone();
        let outcome = if settings.enabled {
            *self.last_attempt.lock() = Some(self.parts.clock.now());
            self.execute(&settings, cancel)
        } else {
            RunOutcome::Skipped {
                reason: "Automation is disabled".to_string(),
            }
        };

        // Only finished runs move the persisted schedule.
        if matches!(outcome, RunOutcome::Completed { .. } | RunOutcome::Skipped { .. }) && settings.enabled {
            self.record_last_run();
        }
        self.audit(&settings, &outcome);
        outcome
    }

    fn execute(&self, settings: &AutomationSettings, cancel: &CancellationToken) -> RunOutcome {
        let parts = &self.parts;
        let targets = settings.scope(&parts.targets);
        let mut preview = match parts.preview.preview(&targets, parts.clock.now(), cancel) {
            Ok(preview) => preview,
            Err(err) if err.is_cancellation() => {
                return RunOutcome::Cancelled {
                    partial: DeletionResult::from_entries(Vec::new()),
                };
            }
            Err(err) => {
                return RunOutcome::Failed {
                    error: err.to_string(),
                };
            }
        };
        preview.truncate(settings.top_item_count);

        let mut locked_skipped = 0;
        let mut items: Vec<PreviewItem> = preview.preview_items();
        if settings.deletion_mode.skips_locked() && !items.is_empty() {
            let paths: Vec<PathBuf> = items.iter().map(|item| item.path.clone()).collect();
            let locked: BTreeSet<PathBuf> = parts
                .locks
                .blocking_processes(&paths)
                .into_iter()
                .map(|holder| holder.candidate)
                .collect();
            let before = items.len();
            items.retain(|item| !locked.contains(&item.path));
            locked_skipped = before - items.len();
        }
        if items.is_empty() {
            let reason = if locked_skipped > 0 {
                format!("No cleanup candidates found ({locked_skipped} locked item(s) left alone)")
            } else {
                "No cleanup candidates found".to_string()
            };
            return RunOutcome::Skipped { reason };
        }

        let options = settings
            .deletion_mode
            .deletion_options(parts.base_options.clone())
            .with_retained_paths(preview.retained);
        match parts.pipeline.delete(&items, &options, cancel, None) {
            Ok(result) => RunOutcome::Completed { result, locked_skipped },
            Err(ReclaimError::DeletionCancelled { partial }) => RunOutcome::Cancelled { partial: *partial },
            Err(err) => RunOutcome::Failed {
                error: err.to_string(),
            },
        }
    }

    fn record_last_run(&self) {
        let now = self.parts.clock.now();
        let mut updated = self.settings.read().clone();
        updated.last_run_utc = Some(now);
        match self.parts.store.save(&updated) {
            Ok(()) => *self.settings.write() = updated,
            Err(err) => {
                let event = AuditEvent::cleanup(
                    AuditLevel::Error,
                    "Failed to persist automation run time",
                    json!({ "error": err.to_string(), "code": err.code() }),
                );
                self.parts.audit.record_event(event.at(now));
            }
        }
    }

    fn audit(&self, settings: &AutomationSettings, outcome: &RunOutcome) {
        let now = self.parts.clock.now();
        let mode = settings.deletion_mode.label();
        let event = match outcome {
            RunOutcome::Completed { result, locked_skipped } => AuditEvent::cleanup(
                if result.failed_count > 0 { AuditLevel::Warning } else { AuditLevel::Info },
                format!("Automated cleanup completed: {}", result.summary),
                json!({
                    "mode": mode,
                    "deleted": result.deleted_count,
                    "skipped": result.skipped_count,
                    "failed": result.failed_count,
                    "pending_reboot": result.pending_reboot_count,
                    "bytes_freed": result.bytes_freed,
                    "bytes_freed_human": format_bytes(result.bytes_freed),
                    "locked_skipped": locked_skipped,
                }),
            ),
            RunOutcome::Skipped { reason } => AuditEvent::cleanup(
                AuditLevel::Info,
                format!("Automated cleanup skipped: {reason}"),
                json!({ "mode": mode, "reason": reason }),
            ),
            RunOutcome::Cancelled { partial } => AuditEvent::cleanup(
                AuditLevel::Warning,
                format!("Automated cleanup cancelled: {}", partial.summary),
                json!({
                    "mode": mode,
                    "processed": partial.total(),
                    "bytes_freed": partial.bytes_freed,
                }),
            ),
            RunOutcome::Failed { error } => AuditEvent::cleanup(
                AuditLevel::Error,
                format!("Automated cleanup failed: {error}"),
                json!({ "mode": mode, "error": error }),
            ),
            RunOutcome::AlreadyRunning => return,
        };
        self.parts.audit.record_event(event.at(now));
    }
}
