//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use parking_lot::Mutex;

use reclaim_engine::core::clock::{Clock, FixedClock};
use reclaim_engine::deletion::model::DeletionOptions;
use reclaim_engine::deletion::pipeline::DeletionPipeline;
use reclaim_engine::deletion::reboot::PendingRebootQueue;
use reclaim_engine::platform::pal::{FileAttributes, NativePlatform, Platform};
use reclaim_engine::scanner::preview::PreviewItem;
use reclaim_engine::scanner::protection::PathSafetyClassifier;

/// Write `len` bytes to `dir/name`, creating parents.
pub fn write_file(dir: &Path, name: &str, len: usize) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(&path, vec![b'x'; len]).expect("write fixture");
    path
}

/// A preview item that claims `claimed_size`, whatever is on disk.
pub fn preview_item(path: &Path, claimed_size: u64, is_directory: bool) -> PreviewItem {
    PreviewItem {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        path: path.to_path_buf(),
        size_bytes: claimed_size,
        last_modified: Utc::now(),
        is_directory,
        extension: String::new(),
        is_hidden: false,
    }
}

/// Options for fresh fixtures: the recency filter would skip everything.
pub fn fixture_options() -> DeletionOptions {
    DeletionOptions {
        skip_recent: false,
        ..DeletionOptions::default()
    }
}

pub fn frozen_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(Utc::now()))
}

pub fn native_platform(state_dir: &Path) -> Arc<NativePlatform> {
    Arc::new(NativePlatform::new(PendingRebootQueue::new(
        state_dir.join("pending-reboot.json"),
    )))
}

pub fn pipeline_with(classifier: PathSafetyClassifier, platform: Arc<dyn Platform>) -> DeletionPipeline {
    let clock: Arc<dyn Clock> = frozen_clock();
    DeletionPipeline::new(classifier, platform, clock)
}

/// Native filesystem operations, except that removing a "denied" path fails
/// with `PermissionDenied`. Taking ownership lifts the denial when
/// `ownership_fixes` is set. The recycle bin is always unavailable.
pub struct DenyingPlatform {
    inner: NativePlatform,
    denied: Mutex<HashSet<PathBuf>>,
    ownership_fixes: bool,
    ownership_calls: AtomicUsize,
}

impl DenyingPlatform {
    pub fn new(state_dir: &Path, ownership_fixes: bool) -> Self {
        Self {
            inner: NativePlatform::new(PendingRebootQueue::new(state_dir.join("pending-reboot.json"))),
            denied: Mutex::new(HashSet::new()),
            ownership_fixes,
            ownership_calls: AtomicUsize::new(0),
        }
    }

    pub fn deny(&self, path: &Path) {
        self.denied.lock().insert(path.to_path_buf());
    }

    pub fn ownership_calls(&self) -> usize {
        self.ownership_calls.load(Ordering::SeqCst)
    }

    pub fn reboot_queue(&self) -> &PendingRebootQueue {
        self.inner.reboot_queue()
    }

    fn check(&self, path: &Path) -> io::Result<()> {
        if self.denied.lock().contains(path) {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "injected denial"))
        } else {
            Ok(())
        }
    }
}

impl Platform for DenyingPlatform {
    fn attributes(&self, path: &Path, metadata: &Metadata) -> FileAttributes {
        self.inner.attributes(path, metadata)
    }

    fn clear_restrictive_attributes(&self, path: &Path, metadata: &Metadata) -> io::Result<()> {
        self.inner.clear_restrictive_attributes(path, metadata)
    }

    fn take_ownership(&self, path: &Path) -> io::Result<()> {
        self.ownership_calls.fetch_add(1, Ordering::SeqCst);
        if self.ownership_fixes {
            self.denied.lock().remove(path);
        }
        Ok(())
    }

    fn move_to_recycle_bin(&self, _path: &Path) -> io::Result<()> {
        Err(io::Error::other("recycle bin unavailable in tests"))
    }

    fn schedule_delete_on_reboot(&self, path: &Path) -> io::Result<()> {
        self.inner.schedule_delete_on_reboot(path)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.check(path)?;
        fs::remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        self.check(path)?;
        fs::remove_dir_all(path)
    }
}
