//! Capture file contexts and directory snapshots under one target root.
//!
//! Only the immediate children of a root become candidates. Files yield a
//! [`FileContext`]; directories are walked (without following symlinks) and
//! folded into a single [`DirectorySnapshot`]. Symlinked children are never
//! candidates.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fs::{self, Metadata};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::core::cancel::CancellationToken;
use crate::core::errors::{ReclaimError, Result};
use crate::platform::pal::Platform;
use crate::scanner::target::{DirectorySnapshot, FileContext, TargetDefinition, extension_of};

/// Entries walked between two cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkerConfig {
    /// Depth limit inside a candidate directory.
    pub max_depth: usize,
    /// Items modified within this window are flagged recent at capture time.
    pub recent_window: Duration,
    /// Lowercased extensions counted as temp files in snapshots.
    pub temp_extensions: Vec<String>,
}

/// Everything captured under one target root.
#[derive(Debug, Clone, Default)]
pub struct TargetCapture {
    pub files: Vec<FileContext>,
    pub directories: Vec<DirectorySnapshot>,
    /// Children that could not be inspected, rendered for display.
    pub errors: Vec<String>,
}

impl TargetCapture {
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len() + self.directories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.directories.is_empty()
    }
}

pub struct TargetWalker {
    config: WalkerConfig,
    platform: Arc<dyn Platform>,
}

impl std::fmt::Debug for TargetWalker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetWalker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TargetWalker {
    #[must_use]
    pub fn new(config: WalkerConfig, platform: Arc<dyn Platform>) -> Self {
        Self { config, platform }
    }

    #[must_use]
    pub const fn config(&self) -> &WalkerConfig {
        &self.config
    }

    /// Capture the children of `target.root`. A missing root yields an empty
    /// capture; an unreadable one is an error.
    pub fn capture(
        &self,
        target: &TargetDefinition,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<TargetCapture> {
        let root = &target.root;
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(TargetCapture::default()),
            Err(err) => return Err(ReclaimError::io(root, err)),
        };

        let mut capture = TargetCapture::default();
        for entry in entries {
            cancel.check("scan")?;
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    capture.errors.push(format!("{}: {err}", root.display()));
                    continue;
                }
            };
            let path = entry.path();
            let metadata = match fs::symlink_metadata(&path) {
                Ok(metadata) => metadata,
                Err(err) => {
                    capture.errors.push(format!("{}: {err}", path.display()));
                    continue;
                }
            };
            if metadata.file_type().is_symlink() {
                continue;
            }
            if metadata.is_dir() {
                capture.directories.push(self.snapshot_directory(&path, &metadata, now, cancel)?);
            } else if metadata.is_file() {
                capture.files.push(self.file_context(&path, &metadata, now));
            }
        }
        Ok(capture)
    }

    /// Build a [`FileContext`] from already-fetched metadata.
    #[must_use]
    pub fn file_context(&self, path: &Path, metadata: &Metadata, now: DateTime<Utc>) -> FileContext {
        let attrs = self.platform.attributes(path, metadata);
        let name = file_name(path);
        let last_modified = timestamp(metadata.modified(), now);
        FileContext {
            extension: extension_of(&name),
            name,
            full_path: path.to_path_buf(),
            size_bytes: metadata.len(),
            last_modified,
            last_accessed: timestamp(metadata.accessed(), last_modified),
            created: timestamp(metadata.created(), last_modified),
            is_hidden: attrs.hidden,
            is_system: attrs.system,
            is_recently_modified: is_recent(last_modified, now, self.config.recent_window),
        }
    }

    /// Fold one directory tree into a [`DirectorySnapshot`].
    pub fn snapshot_directory(
        &self,
        path: &Path,
        metadata: &Metadata,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<DirectorySnapshot> {
        let attrs = self.platform.attributes(path, metadata);
        let mut snapshot = DirectorySnapshot {
            full_path: path.to_path_buf(),
            name: file_name(path),
            total_size_bytes: 0,
            last_modified: timestamp(metadata.modified(), now),
            is_hidden: attrs.hidden,
            is_system: attrs.system,
            file_count: 0,
            hidden_file_count: 0,
            system_file_count: 0,
            recent_file_count: 0,
            temp_file_count: 0,
            extension_counts: BTreeMap::new(),
        };

        let walker = WalkDir::new(path)
            .min_depth(1)
            .max_depth(self.config.max_depth.max(1))
            .follow_links(false);
        for (visited, entry) in walker.into_iter().enumerate() {
            if visited % CANCEL_CHECK_INTERVAL == 0 {
                cancel.check("scan")?;
            }
            let Ok(entry) = entry else {
                continue;
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            let file_attrs = self.platform.attributes(entry.path(), &meta);
            let modified = timestamp(meta.modified(), now);
            let extension = extension_of(&entry.file_name().to_string_lossy());

            snapshot.file_count += 1;
            snapshot.total_size_bytes = snapshot.total_size_bytes.saturating_add(meta.len());
            snapshot.last_modified = snapshot.last_modified.max(modified);
            if file_attrs.hidden {
                snapshot.hidden_file_count += 1;
            }
            if file_attrs.system {
                snapshot.system_file_count += 1;
            }
            if is_recent(modified, now, self.config.recent_window) {
                snapshot.recent_file_count += 1;
            }
            if self.config.temp_extensions.iter().any(|ext| *ext == extension) {
                snapshot.temp_file_count += 1;
            }
            if !extension.is_empty() {
                *snapshot.extension_counts.entry(extension).or_default() += 1;
            }
        }
        Ok(snapshot)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.to_string_lossy().into_owned(), |n| n.to_string_lossy().into_owned())
}

fn timestamp(raw: io::Result<SystemTime>, fallback: DateTime<Utc>) -> DateTime<Utc> {
    raw.map_or(fallback, DateTime::<Utc>::from)
}

/// Modified less than `window` ago. Future timestamps count as recent.
#[must_use]
pub fn is_recent(modified: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    let window = chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());
    now.signed_duration_since(modified) < window
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deletion::reboot::PendingRebootQueue;
    use crate::platform::pal::NativePlatform;
    use crate::scanner::target::TargetCategory;
    use filetime::FileTime;

    fn walker(state: &Path) -> TargetWalker {
        TargetWalker::new(
            WalkerConfig {
                max_depth: 8,
                recent_window: Duration::from_secs(3600),
                temp_extensions: vec!["tmp".to_string()],
            },
            Arc::new(NativePlatform::new(PendingRebootQueue::new(state.join("q.json")))),
        )
    }

    fn age(path: &Path, days: i64) {
        let when = Utc::now() - chrono::Duration::days(days);
        filetime::set_file_mtime(path, FileTime::from_unix_time(when.timestamp(), 0)).expect("mtime");
    }

    #[test]
    fn missing_root_is_empty() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let target = TargetDefinition::new(TargetCategory::Temp, "Temp", tmp.path().join("absent"));
        let capture = walker(tmp.path())
            .capture(&target, Utc::now(), &CancellationToken::new())
            .expect("capture");
        assert!(capture.is_empty());
    }

    #[test]
    fn captures_children_and_aggregates_directories() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path().join("root");
        let sub = root.join("bundle");
        fs::create_dir_all(sub.join("nested")).expect("mkdir");
        fs::write(root.join("old.tmp"), vec![0_u8; 10]).expect("write");
        fs::write(sub.join("a.tmp"), vec![0_u8; 100]).expect("write");
        fs::write(sub.join("nested").join("b.log"), vec![0_u8; 50]).expect("write");
        age(&root.join("old.tmp"), 30);
        age(&sub.join("a.tmp"), 30);

        let target = TargetDefinition::new(TargetCategory::Temp, "Temp", &root);
        let capture = walker(tmp.path())
            .capture(&target, Utc::now(), &CancellationToken::new())
            .expect("capture");

        assert_eq!(capture.files.len(), 1);
        let file = &capture.files[0];
        assert_eq!(file.extension, "tmp");
        assert_eq!(file.size_bytes, 10);
        assert!(!file.is_recently_modified);

        assert_eq!(capture.directories.len(), 1);
        let dir = &capture.directories[0];
        assert_eq!(dir.file_count, 2);
        assert_eq!(dir.total_size_bytes, 150);
        assert_eq!(dir.temp_file_count, 1);
        assert_eq!(dir.recent_file_count, 1);
        assert_eq!(dir.extension_counts.get("log"), Some(&1));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_children_are_ignored() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path().join("root");
        fs::create_dir_all(&root).expect("mkdir");
        let outside = tmp.path().join("outside.bin");
        fs::write(&outside, b"x").expect("write");
        std::os::unix::fs::symlink(&outside, root.join("link.bin")).expect("symlink");

        let target = TargetDefinition::new(TargetCategory::Temp, "Temp", &root);
        let capture = walker(tmp.path())
            .capture(&target, Utc::now(), &CancellationToken::new())
            .expect("capture");
        assert!(capture.is_empty());
    }

    #[test]
    fn cancelled_scan_stops() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::write(tmp.path().join("a.tmp"), b"x").expect("write");
        let target = TargetDefinition::new(TargetCategory::Temp, "Temp", tmp.path());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = walker(tmp.path())
            .capture(&target, Utc::now(), &cancel)
            .expect_err("cancelled");
        assert!(err.is_cancellation());
    }

    #[test]
    fn recency_is_strict() {
        let now = Utc::now();
        let window = Duration::from_secs(60);
        assert!(is_recent(now - chrono::Duration::seconds(59), now, window));
        assert!(!is_recent(now - chrono::Duration::seconds(60), now, window));
        assert!(is_recent(now + chrono::Duration::seconds(5), now, window));
    }
}
