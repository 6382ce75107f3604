//! Deletion options, per-item outcomes and batch aggregates.

#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::config::DeletionConfig;
use crate::core::paths::NormalizedPath;
use crate::core::units::format_bytes;

/// Default recency window for the skip-recent filter.
pub const DEFAULT_RECENT_THRESHOLD: Duration = Duration::from_secs(24 * 60 * 60);

/// Per-invocation deletion behavior. Never global state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionOptions {
    pub skip_hidden: bool,
    pub skip_system: bool,
    pub skip_recent: bool,
    /// Items modified less than this long ago are "recent".
    pub recent_threshold: Duration,
    pub prefer_recycle_bin: bool,
    /// Must stay `false` unless a caller explicitly opts in.
    pub allow_protected_system_paths: bool,
    pub take_ownership_on_access_denied: bool,
    pub allow_delete_on_reboot: bool,
    /// When the recycle bin refuses an item, fall back to permanent removal.
    pub allow_permanent_fallback: bool,
    /// Paths kept by the crash-dump retention policy.
    pub retained_paths: BTreeSet<PathBuf>,
}

impl Default for DeletionOptions {
    fn default() -> Self {
        Self {
            skip_hidden: false,
            skip_system: true,
            skip_recent: true,
            recent_threshold: DEFAULT_RECENT_THRESHOLD,
            prefer_recycle_bin: false,
            allow_protected_system_paths: false,
            take_ownership_on_access_denied: false,
            allow_delete_on_reboot: false,
            allow_permanent_fallback: true,
            retained_paths: BTreeSet::new(),
        }
    }
}

impl From<&DeletionConfig> for DeletionOptions {
    fn from(config: &DeletionConfig) -> Self {
        Self {
            skip_hidden: config.skip_hidden,
            skip_system: config.skip_system,
            skip_recent: config.skip_recent,
            recent_threshold: config.recent_threshold(),
            ..Self::default()
        }
    }
}

impl DeletionOptions {
    #[must_use]
    pub fn with_retained_paths(mut self, retained: BTreeSet<PathBuf>) -> Self {
        self.retained_paths = retained;
        self
    }

    /// Whether `path` was protected by retention, compared by normalized key.
    #[must_use]
    pub fn is_retained(&self, path: &Path) -> bool {
        if self.retained_paths.is_empty() {
            return false;
        }
        if self.retained_paths.contains(path) {
            return true;
        }
        let Ok(wanted) = NormalizedPath::from_path(path) else {
            return false;
        };
        let wanted = wanted.key();
        self.retained_paths
            .iter()
            .filter_map(|candidate| NormalizedPath::from_path(candidate).ok())
            .any(|candidate| candidate.key() == wanted)
    }
}

/// Terminal classification of one deletion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeletionDisposition {
    Deleted,
    Skipped,
    Failed,
    PendingReboot,
}

impl fmt::Display for DeletionDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Deleted => "deleted",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::PendingReboot => "pending-reboot",
        })
    }
}

/// Outcome record for one unique path.
///
/// Every non-`Deleted` entry carries a reason; construction goes through the
/// disposition-specific constructors so that cannot be violated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionEntry {
    pub path: PathBuf,
    /// Measured when the item was processed, not copied from the preview.
    pub size_bytes: u64,
    pub is_directory: bool,
    pub disposition: DeletionDisposition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl DeletionEntry {
    #[must_use]
    pub fn deleted(path: PathBuf, size_bytes: u64, is_directory: bool) -> Self {
        Self {
            path,
            size_bytes,
            is_directory,
            disposition: DeletionDisposition::Deleted,
            reason: None,
        }
    }

    #[must_use]
    pub fn skipped(path: PathBuf, size_bytes: u64, is_directory: bool, reason: impl Into<String>) -> Self {
        Self::with_reason(path, size_bytes, is_directory, DeletionDisposition::Skipped, reason)
    }

    #[must_use]
    pub fn failed(path: PathBuf, size_bytes: u64, is_directory: bool, reason: impl Into<String>) -> Self {
        Self::with_reason(path, size_bytes, is_directory, DeletionDisposition::Failed, reason)
    }

    #[must_use]
    pub fn pending_reboot(path: PathBuf, size_bytes: u64, is_directory: bool, reason: impl Into<String>) -> Self {
        Self::with_reason(path, size_bytes, is_directory, DeletionDisposition::PendingReboot, reason)
    }

    /// Attach an informational note to a `Deleted` entry.
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.reason = Some(note.into());
        self
    }

    fn with_reason(
        path: PathBuf,
        size_bytes: u64,
        is_directory: bool,
        disposition: DeletionDisposition,
        reason: impl Into<String>,
    ) -> Self {
        let reason = reason.into();
        let reason = if reason.trim().is_empty() {
            format!("{disposition} without further detail")
        } else {
            reason
        };
        Self {
            path,
            size_bytes,
            is_directory,
            disposition,
            reason: Some(reason),
        }
    }

    /// Bytes actually reclaimed: the measured size when deleted, zero otherwise.
    #[must_use]
    pub const fn actual_bytes_freed(&self) -> u64 {
        match self.disposition {
            DeletionDisposition::Deleted => self.size_bytes,
            _ => 0,
        }
    }
}

/// Immutable aggregate over one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionResult {
    pub entries: Vec<DeletionEntry>,
    pub deleted_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
    pub pending_reboot_count: usize,
    pub bytes_freed: u64,
    pub skipped_bytes: u64,
    pub failed_bytes: u64,
    pub pending_reboot_bytes: u64,
    pub summary: String,
}

impl DeletionResult {
    #[must_use]
    pub fn from_entries(entries: Vec<DeletionEntry>) -> Self {
        let mut result = Self {
            entries: Vec::new(),
            deleted_count: 0,
            skipped_count: 0,
            failed_count: 0,
            pending_reboot_count: 0,
            bytes_freed: 0,
            skipped_bytes: 0,
            failed_bytes: 0,
            pending_reboot_bytes: 0,
            summary: String::new(),
        };
        for entry in &entries {
            match entry.disposition {
                DeletionDisposition::Deleted => {
                    result.deleted_count += 1;
                    result.bytes_freed = result.bytes_freed.saturating_add(entry.actual_bytes_freed());
                }
                DeletionDisposition::Skipped => {
                    result.skipped_count += 1;
                    result.skipped_bytes = result.skipped_bytes.saturating_add(entry.size_bytes);
                }
                DeletionDisposition::Failed => {
                    result.failed_count += 1;
                    result.failed_bytes = result.failed_bytes.saturating_add(entry.size_bytes);
                }
                DeletionDisposition::PendingReboot => {
                    result.pending_reboot_count += 1;
                    result.pending_reboot_bytes = result.pending_reboot_bytes.saturating_add(entry.size_bytes);
                }
            }
        }
        result.entries = entries;
        result.summary = result.render_summary();
        result
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The single outcome recorded for `path`, matched by normalized key so
    /// duplicate spellings of one path resolve to the same entry.
    #[must_use]
    pub fn entry_for(&self, path: &Path) -> Option<&DeletionEntry> {
        let wanted = normalized_key(path);
        self.entries
            .iter()
            .find(|entry| normalized_key(&entry.path) == wanted)
    }

    fn render_summary(&self) -> String {
        if self.entries.is_empty() {
            return "Nothing to delete.".to_string();
        }
        let mut parts = vec![format!(
            "Deleted {} item(s), freed {}",
            self.deleted_count,
            format_bytes(self.bytes_freed)
        )];
        if self.skipped_count > 0 {
            parts.push(format!("{} skipped", self.skipped_count));
        }
        if self.pending_reboot_count > 0 {
            parts.push(format!(
                "{} pending restart ({})",
                self.pending_reboot_count,
                format_bytes(self.pending_reboot_bytes)
            ));
        }
        if self.failed_count > 0 {
            parts.push(format!("{} failed", self.failed_count));
        }
        let mut summary = parts.join(", ");
        summary.push('.');
        summary
    }
}

fn normalized_key(path: &Path) -> String {
    let absolute = crate::core::paths::absolutize(path);
    NormalizedPath::from_path(&absolute)
        .map_or_else(|_| absolute.to_string_lossy().into_owned(), |n| n.key())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_never_allow_protected_paths() {
        let options = DeletionOptions::default();
        assert!(!options.allow_protected_system_paths);
        assert!(options.skip_system);
        assert!(options.allow_permanent_fallback);
    }

    #[test]
    fn only_deleted_entries_free_bytes() {
        let p = PathBuf::from("/tmp/x");
        assert_eq!(DeletionEntry::deleted(p.clone(), 10, false).actual_bytes_freed(), 10);
        assert_eq!(DeletionEntry::skipped(p.clone(), 10, false, "Filtered").actual_bytes_freed(), 0);
        assert_eq!(DeletionEntry::failed(p.clone(), 10, false, "Denied").actual_bytes_freed(), 0);
        assert_eq!(DeletionEntry::pending_reboot(p, 10, false, "Later").actual_bytes_freed(), 0);
    }

    #[test]
    fn blank_reasons_are_replaced() {
        let entry = DeletionEntry::failed(PathBuf::from("/tmp/x"), 1, false, "  ");
        assert_eq!(entry.reason.as_deref(), Some("failed without further detail"));
    }

    #[test]
    fn aggregate_partitions_by_disposition() {
        let result = DeletionResult::from_entries(vec![
            DeletionEntry::deleted(PathBuf::from("/a"), 1024, false),
            DeletionEntry::deleted(PathBuf::from("/b"), 1024, true),
            DeletionEntry::skipped(PathBuf::from("/c"), 7, false, "Protected"),
            DeletionEntry::pending_reboot(PathBuf::from("/d"), 9, false, "Locked"),
            DeletionEntry::failed(PathBuf::from("/e"), 11, false, "Denied"),
        ]);
        assert_eq!(result.deleted_count, 2);
        assert_eq!(result.bytes_freed, 2048);
        assert_eq!(result.skipped_bytes, 7);
        assert_eq!(result.pending_reboot_bytes, 9);
        assert_eq!(result.failed_bytes, 11);
        assert_eq!(result.total(), 5);
        assert_eq!(
            result.summary,
            "Deleted 2 item(s), freed 2.0 KiB, 1 skipped, 1 pending restart (9 B), 1 failed."
        );
    }

    #[test]
    fn empty_batch_summary() {
        let result = DeletionResult::from_entries(Vec::new());
        assert!(result.is_empty());
        assert_eq!(result.summary, "Nothing to delete.");
    }

    #[cfg(unix)]
    #[test]
    fn entry_lookup_uses_normalized_paths() {
        let result = DeletionResult::from_entries(vec![DeletionEntry::deleted(
            PathBuf::from("/var/tmp/cache/blob"),
            3,
            false,
        )]);
        let entry = result.entry_for(Path::new("/var/tmp/./cache//blob")).expect("entry");
        assert_eq!(entry.size_bytes, 3);
        assert!(result.entry_for(Path::new("/var/tmp/other")).is_none());
    }

    #[test]
    fn retained_paths_match_by_key() {
        let mut retained = BTreeSet::new();
        retained.insert(PathBuf::from("/dumps/app.exe.4.dmp"));
        let options = DeletionOptions::default().with_retained_paths(retained);
        assert!(options.is_retained(Path::new("/dumps/app.exe.4.dmp")));
        assert!(!options.is_retained(Path::new("/dumps/app.exe.1.dmp")));
    }
}
