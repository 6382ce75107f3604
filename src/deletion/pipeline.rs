//! Deletion pipeline: verified, sequential removal of a batch of preview items.
//!
//! Per item:
//!
//! ```text
//! received -> dedup -> re-verify [skipped: missing | changed type]
//!          -> protected (lexical and resolved) / retained check [skipped]
//!          -> hidden / system / recency filters [skipped: filtered]
//!          -> attempt (recycle bin or permanent)
//!               ok                                   -> deleted
//!               error -> aggressive retry            -> deleted
//!                     -> ownership takeover + retry  -> deleted
//!                     -> delete-on-reboot queue      -> pending-reboot
//!                     -> otherwise                   -> failed
//! ```
//!
//! Items run one at a time; a parent-directory removal racing a child-file
//! removal is never possible inside one batch. Cancellation is checked before
//! every item and inside the aggressive helper.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::core::cancel::CancellationToken;
use crate::core::clock::Clock;
use crate::core::errors::{ReclaimError, Result};
use crate::core::paths::{NormalizedPath, absolutize};
use crate::core::units::format_duration;
use crate::deletion::aggressive::AggressiveDeleter;
use crate::deletion::model::{DeletionEntry, DeletionOptions, DeletionResult};
use crate::deletion::progress::{DEFAULT_PROGRESS_INTERVAL, DeletionProgress, ProgressThrottle};
use crate::platform::pal::Platform;
use crate::scanner::preview::PreviewItem;
use crate::scanner::protection::PathSafetyClassifier;

/// Ownership takeover attempts after an access-denied failure.
pub const OWNERSHIP_RETRY_ATTEMPTS: u32 = 1;

/// Size and newest modification time of an item, measured right before removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Measurement {
    size_bytes: u64,
    newest_modified: Option<SystemTime>,
}

pub struct DeletionPipeline {
    classifier: PathSafetyClassifier,
    platform: Arc<dyn Platform>,
    clock: Arc<dyn Clock>,
    aggressive: AggressiveDeleter,
    progress_interval: Duration,
}

impl std::fmt::Debug for DeletionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionPipeline")
            .field("progress_interval", &self.progress_interval)
            .finish_non_exhaustive()
    }
}

impl DeletionPipeline {
    #[must_use]
    pub fn new(classifier: PathSafetyClassifier, platform: Arc<dyn Platform>, clock: Arc<dyn Clock>) -> Self {
        let aggressive = AggressiveDeleter::new(Arc::clone(&platform), Arc::clone(&clock));
        Self {
            classifier,
            platform,
            clock,
            aggressive,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    #[must_use]
    pub const fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    #[must_use]
    pub const fn aggressive(&self) -> &AggressiveDeleter {
        &self.aggressive
    }

    /// Delete `items` sequentially.
    ///
    /// Returns one entry per unique normalized path. Blank paths are ignored.
    ///
    /// # Errors
    /// [`ReclaimError::DeletionCancelled`] when `cancel` fires before the batch
    /// finishes; it carries the entries processed so far.
    pub fn delete(
        &self,
        items: &[PreviewItem],
        options: &DeletionOptions,
        cancel: &CancellationToken,
        mut progress: Option<&mut dyn FnMut(&DeletionProgress)>,
    ) -> Result<DeletionResult> {
        let queue = dedup(items);
        let total = queue.len();
        let mut throttle = ProgressThrottle::new(self.progress_interval);
        let mut entries = Vec::with_capacity(total);
        let mut bytes_freed = 0_u64;

        for (index, (path, item)) in queue.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(ReclaimError::DeletionCancelled {
                    partial: Box::new(DeletionResult::from_entries(entries)),
                });
            }
            let entry = self.process(&path, item, options, cancel);
            bytes_freed = bytes_freed.saturating_add(entry.actual_bytes_freed());
            entries.push(entry);

            if let Some(callback) = progress.as_deref_mut() {
                let processed = index + 1;
                if throttle.should_emit(Instant::now(), processed == total) {
                    callback(&DeletionProgress {
                        processed,
                        total,
                        bytes_freed,
                        current_path: Some(path),
                    });
                }
            }
        }
        Ok(DeletionResult::from_entries(entries))
    }

    /// Run [`Self::delete`] on a dedicated worker thread.
    pub fn delete_in_background(
        self: Arc<Self>,
        items: Vec<PreviewItem>,
        options: DeletionOptions,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<Result<DeletionResult>>> {
        std::thread::Builder::new()
            .name("reclaim-delete".to_string())
            .spawn(move || self.delete(&items, &options, &cancel, None))
            .map_err(|e| ReclaimError::Runtime {
                details: format!("failed to spawn deletion worker: {e}"),
            })
    }

    fn process(
        &self,
        path: &Path,
        item: &PreviewItem,
        options: &DeletionOptions,
        cancel: &CancellationToken,
    ) -> DeletionEntry {
        let path_buf = path.to_path_buf();
        let metadata = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return DeletionEntry::skipped(path_buf, 0, item.is_directory, "Missing: no longer exists on disk");
            }
            Err(err) => {
                return DeletionEntry::failed(
                    path_buf,
                    0,
                    item.is_directory,
                    format!("Unable to inspect item: {err}"),
                );
            }
        };
        let is_directory = metadata.is_dir();
        let measured = measure(path, &metadata);
        let size = measured.size_bytes;

        if is_directory != item.is_directory {
            return DeletionEntry::skipped(
                path_buf,
                size,
                is_directory,
                format!(
                    "Changed type since scan: scanned as a {}, now a {}",
                    kind(item.is_directory),
                    kind(is_directory)
                ),
            );
        }

        if !options.allow_protected_system_paths {
            if let Some(reason) = self.protection_veto(path) {
                return DeletionEntry::skipped(path_buf, size, is_directory, reason);
            }
        }

        if options.is_retained(path) {
            return DeletionEntry::skipped(
                path_buf,
                size,
                is_directory,
                "Retained: among the most recent crash dumps of its program",
            );
        }

        let attrs = self.platform.attributes(path, &metadata);
        if options.skip_hidden && attrs.hidden {
            return DeletionEntry::skipped(path_buf, size, is_directory, "Filtered: hidden item");
        }
        if options.skip_system && attrs.system {
            return DeletionEntry::skipped(path_buf, size, is_directory, "Filtered: system item");
        }
        if options.skip_recent && self.is_recent(measured.newest_modified, options.recent_threshold) {
            return DeletionEntry::skipped(
                path_buf,
                size,
                is_directory,
                format!(
                    "Filtered: modified within the last {}",
                    format_duration(options.recent_threshold)
                ),
            );
        }

        self.attempt(path_buf, size, is_directory, options, cancel)
    }

    fn attempt(
        &self,
        path: PathBuf,
        size: u64,
        is_directory: bool,
        options: &DeletionOptions,
        cancel: &CancellationToken,
    ) -> DeletionEntry {
        if options.prefer_recycle_bin {
            match self.platform.move_to_recycle_bin(&path) {
                Ok(()) => {
                    return DeletionEntry::deleted(path, size, is_directory).with_note("Moved to recycle bin");
                }
                Err(err) if !options.allow_permanent_fallback => {
                    return DeletionEntry::failed(
                        path,
                        size,
                        is_directory,
                        format!("Recycle bin unavailable: {err}"),
                    );
                }
                Err(_) => {}
            }
        }

        let first = if is_directory {
            self.platform.remove_dir_all(&path)
        } else {
            self.platform.remove_file(&path)
        };
        let first_error = match first {
            Ok(()) => return DeletionEntry::deleted(path, size, is_directory),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return DeletionEntry::skipped(path, 0, is_directory, "Missing: removed by another process");
            }
            Err(err) => err,
        };

        let mut access_denied = first_error.kind() == io::ErrorKind::PermissionDenied;
        let outcome = self.aggressive.try_aggressive_delete(&path, is_directory, cancel);
        if outcome.success {
            return DeletionEntry::deleted(path, size, is_directory);
        }
        access_denied |= outcome.access_denied;
        let mut reason = outcome
            .failure_reason
            .unwrap_or_else(|| format!("Removal failed: {first_error}"));

        if access_denied && options.take_ownership_on_access_denied {
            for _ in 0..OWNERSHIP_RETRY_ATTEMPTS {
                if cancel.is_cancelled() {
                    break;
                }
                if let Err(err) = self.platform.take_ownership(&path) {
                    reason = format!("{reason}; ownership takeover failed: {err}");
                    break;
                }
                let retry = self.aggressive.try_aggressive_delete(&path, is_directory, cancel);
                if retry.success {
                    return DeletionEntry::deleted(path, size, is_directory).with_note("Deleted after taking ownership");
                }
                if let Some(why) = retry.failure_reason {
                    reason = why;
                }
            }
        }

        if options.allow_delete_on_reboot && !cancel.is_cancelled() {
            return match self.platform.schedule_delete_on_reboot(&path) {
                Ok(()) => DeletionEntry::pending_reboot(
                    path,
                    size,
                    is_directory,
                    format!("Scheduled for removal on next restart ({reason})"),
                ),
                Err(err) => DeletionEntry::failed(
                    path,
                    size,
                    is_directory,
                    format!("{reason}; scheduling removal on restart failed: {err}"),
                ),
            };
        }

        DeletionEntry::failed(path, size, is_directory, reason)
    }

    /// Reason to refuse `path`, checking both its spelling and the location
    /// its parent resolves to. The final component is not followed, so a
    /// symlink candidate is judged by where it lives, not what it targets.
    fn protection_veto(&self, path: &Path) -> Option<String> {
        let lexical = self.verdict_reason(path);
        if lexical.is_some() {
            return lexical;
        }
        match resolve_parent(path) {
            Ok(resolved) if resolved.as_path() == path => None,
            Ok(resolved) => self
                .verdict_reason(&resolved)
                .map(|reason| format!("{reason} (resolved to {})", resolved.display())),
            Err(err) => Some(format!("Protected: location could not be resolved ({err})")),
        }
    }

    fn verdict_reason(&self, path: &Path) -> Option<String> {
        match self.classifier.classify_path(path) {
            Ok(verdict) if verdict.is_critical() => Some(format!("Protected: {verdict}")),
            Ok(_) => None,
            Err(err) => Some(format!("Protected: path could not be classified ({err})")),
        }
    }

    /// Recent iff modified strictly less than `threshold` ago. Unknown and
    /// future timestamps count as recent.
    fn is_recent(&self, newest: Option<SystemTime>, threshold: Duration) -> bool {
        let Some(newest) = newest else {
            return true;
        };
        let threshold = chrono::Duration::from_std(threshold).unwrap_or_else(|_| chrono::Duration::zero());
        let age = self.clock.now().signed_duration_since(DateTime::<Utc>::from(newest));
        age < threshold
    }
}

/// Absolute path plus first request for every unique normalized path, in
/// request order.
fn dedup(items: &[PreviewItem]) -> Vec<(PathBuf, &PreviewItem)> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for item in items {
        if item.path.as_os_str().is_empty() || item.path.to_string_lossy().trim().is_empty() {
            continue;
        }
        let absolute = absolutize(&item.path);
        let key = NormalizedPath::from_path(&absolute)
            .map_or_else(|_| absolute.to_string_lossy().into_owned(), |n| n.key());
        if seen.insert(key) {
            unique.push((absolute, item));
        }
    }
    unique
}

/// `path` with its parent canonicalized and its final component kept as is.
fn resolve_parent(path: &Path) -> io::Result<PathBuf> {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => Ok(fs::canonicalize(parent)?.join(name)),
        _ => fs::canonicalize(path),
    }
}

const fn kind(is_directory: bool) -> &'static str {
    if is_directory { "directory" } else { "file" }
}

/// Recursive file size sum and newest mtime, at deletion time.
fn measure(path: &Path, metadata: &Metadata) -> Measurement {
    if !metadata.is_dir() {
        return Measurement {
            size_bytes: metadata.len(),
            newest_modified: metadata.modified().ok(),
        };
    }
    let mut measurement = Measurement {
        size_bytes: 0,
        newest_modified: metadata.modified().ok(),
    };
    for entry in WalkDir::new(path).min_depth(1).follow_links(false).into_iter().flatten() {
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if meta.is_file() {
            measurement.size_bytes = measurement.size_bytes.saturating_add(meta.len());
        }
        if let Ok(modified) = meta.modified() {
            measurement.newest_modified = Some(
                measurement
                    .newest_modified
                    .map_or(modified, |current| current.max(modified)),
            );
        }
    }
    measurement
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::FixedClock;
    use crate::deletion::model::DeletionDisposition;
    use crate::deletion::reboot::PendingRebootQueue;
    use crate::platform::pal::NativePlatform;
    use filetime::FileTime;

    fn pipeline(state: &Path, now: DateTime<Utc>) -> DeletionPipeline {
        let platform = Arc::new(NativePlatform::new(PendingRebootQueue::new(state.join("q.json"))));
        DeletionPipeline::new(PathSafetyClassifier::builtin(), platform, Arc::new(FixedClock::new(now)))
    }

    fn item(path: &Path, size: u64, is_directory: bool) -> PreviewItem {
        PreviewItem {
            name: path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
            path: path.to_path_buf(),
            size_bytes: size,
            last_modified: Utc::now(),
            is_directory,
            extension: String::new(),
            is_hidden: false,
        }
    }

    fn permissive() -> DeletionOptions {
        DeletionOptions {
            skip_recent: false,
            ..DeletionOptions::default()
        }
    }

    #[test]
    fn directory_size_is_measured_recursively() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = tmp.path().join("bundle");
        fs::create_dir_all(dir.join("a").join("b")).expect("mkdir");
        fs::write(dir.join("one"), vec![0_u8; 1000]).expect("write");
        fs::write(dir.join("a").join("two"), vec![0_u8; 2000]).expect("write");
        fs::write(dir.join("a").join("b").join("three"), vec![0_u8; 3000]).expect("write");

        let result = pipeline(tmp.path(), Utc::now())
            .delete(&[item(&dir, 1, true)], &permissive(), &CancellationToken::new(), None)
            .expect("delete");
        let entry = &result.entries[0];
        assert_eq!(entry.disposition, DeletionDisposition::Deleted);
        assert_eq!(entry.size_bytes, 6000);
        assert!(entry.is_directory);
        assert!(!dir.exists());
    }

    #[test]
    fn blank_paths_are_ignored() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let blank = item(Path::new(""), 10, false);
        let spaces = item(Path::new("   "), 10, false);
        let result = pipeline(tmp.path(), Utc::now())
            .delete(&[blank, spaces], &permissive(), &CancellationToken::new(), None)
            .expect("delete");
        assert!(result.is_empty());
    }

    #[test]
    fn recent_items_are_filtered_strictly() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let now = Utc::now();
        let boundary = tmp.path().join("boundary.tmp");
        let fresh = tmp.path().join("fresh.tmp");
        fs::write(&boundary, b"x").expect("write");
        fs::write(&fresh, b"x").expect("write");
        let threshold = Duration::from_secs(3600);
        let at = |secs_ago: i64| FileTime::from_unix_time(now.timestamp() - secs_ago, 0);
        filetime::set_file_mtime(&boundary, at(3600)).expect("mtime");
        filetime::set_file_mtime(&fresh, at(3599)).expect("mtime");

        let clock_now = DateTime::<Utc>::from_timestamp(now.timestamp(), 0).expect("timestamp");
        let options = DeletionOptions {
            skip_recent: true,
            recent_threshold: threshold,
            ..DeletionOptions::default()
        };
        let result = pipeline(tmp.path(), clock_now)
            .delete(
                &[item(&boundary, 1, false), item(&fresh, 1, false)],
                &options,
                &CancellationToken::new(),
                None,
            )
            .expect("delete");
        assert_eq!(result.entry_for(&boundary).expect("boundary").disposition, DeletionDisposition::Deleted);
        let fresh_entry = result.entry_for(&fresh).expect("fresh");
        assert_eq!(fresh_entry.disposition, DeletionDisposition::Skipped);
        assert!(fresh_entry.reason.as_deref().is_some_and(|r| r.starts_with("Filtered")));
        assert!(fresh.exists());
    }

    #[cfg(unix)]
    #[test]
    fn hidden_filter_applies_to_dotfiles() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let hidden = tmp.path().join(".cache-blob");
        fs::write(&hidden, b"x").expect("write");
        let options = DeletionOptions {
            skip_hidden: true,
            ..permissive()
        };
        let result = pipeline(tmp.path(), Utc::now())
            .delete(&[item(&hidden, 1, false)], &options, &CancellationToken::new(), None)
            .expect("delete");
        assert_eq!(result.skipped_count, 1);
        assert!(hidden.exists());
    }

    #[test]
    fn retained_paths_are_skipped() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dump = tmp.path().join("app.exe.9.dmp");
        fs::write(&dump, b"dump").expect("write");
        let options = permissive().with_retained_paths([dump.clone()].into_iter().collect());
        let result = pipeline(tmp.path(), Utc::now())
            .delete(&[item(&dump, 4, false)], &options, &CancellationToken::new(), None)
            .expect("delete");
        let entry = &result.entries[0];
        assert_eq!(entry.disposition, DeletionDisposition::Skipped);
        assert!(entry.reason.as_deref().is_some_and(|r| r.starts_with("Retained")));
        assert!(dump.exists());
    }

    #[test]
    fn progress_is_reported_and_final_update_forced() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let items: Vec<_> = (0..5)
            .map(|i| {
                let path = tmp.path().join(format!("f{i}.tmp"));
                fs::write(&path, b"abc").expect("write");
                item(&path, 3, false)
            })
            .collect();
        let mut updates = Vec::new();
        let mut record = |p: &DeletionProgress| updates.push(p.clone());
        let result = pipeline(tmp.path(), Utc::now())
            .with_progress_interval(Duration::from_secs(3600))
            .delete(&items, &permissive(), &CancellationToken::new(), Some(&mut record))
            .expect("delete");
        assert_eq!(result.deleted_count, 5);
        assert_eq!(updates.len(), 2);
        let last = updates.last().expect("final update");
        assert_eq!(last.processed, 5);
        assert_eq!(last.bytes_freed, 15);
    }

    #[test]
    fn background_worker_returns_result() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let file = tmp.path().join("bg.tmp");
        fs::write(&file, b"abc").expect("write");
        let handle = Arc::new(pipeline(tmp.path(), Utc::now()))
            .delete_in_background(vec![item(&file, 3, false)], permissive(), CancellationToken::new())
            .expect("spawn");
        let result = handle.join().expect("join").expect("delete");
        assert_eq!(result.bytes_freed, 3);
    }
}
