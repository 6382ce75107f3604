//! Platform abstraction layer for the filesystem operations deletion relies on.
//!
//! Every mutating call the deletion pipeline and the aggressive helper make goes
//! through [`Platform`], so tests can substitute a platform that injects
//! access-denied failures without needing real ACLs or a non-root user.

#![allow(missing_docs)]

use std::fs::{self, Metadata};
use std::io;
use std::path::Path;

use crate::deletion::reboot::PendingRebootQueue;

/// Attribute flags relevant to cleanup decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileAttributes {
    pub hidden: bool,
    pub system: bool,
    pub readonly: bool,
}

/// Filesystem capabilities consumed by scanning and deletion.
pub trait Platform: Send + Sync {
    /// Attribute flags for `path`, derived from already-fetched metadata.
    fn attributes(&self, path: &Path, metadata: &Metadata) -> FileAttributes;

    /// Clear read-only (and, where the OS allows, hidden/system) restrictions.
    /// Symlinks are left alone so their targets are never modified.
    fn clear_restrictive_attributes(&self, path: &Path, metadata: &Metadata) -> io::Result<()>;

    /// Make the current user the owner of `path` (recursively for directories).
    fn take_ownership(&self, path: &Path) -> io::Result<()>;

    fn move_to_recycle_bin(&self, path: &Path) -> io::Result<()>;

    /// Ask for `path` to be removed on the next restart.
    fn schedule_delete_on_reboot(&self, path: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path)
    }
}

/// The real platform. Delete-on-reboot requests land in a persisted queue that
/// the service drains on its next start.
#[derive(Debug)]
pub struct NativePlatform {
    reboot_queue: PendingRebootQueue,
}

impl NativePlatform {
    #[must_use]
    pub const fn new(reboot_queue: PendingRebootQueue) -> Self {
        Self { reboot_queue }
    }

    #[must_use]
    pub const fn reboot_queue(&self) -> &PendingRebootQueue {
        &self.reboot_queue
    }
}

impl Platform for NativePlatform {
    fn attributes(&self, path: &Path, metadata: &Metadata) -> FileAttributes {
        native_attributes(path, metadata)
    }

    fn clear_restrictive_attributes(&self, path: &Path, metadata: &Metadata) -> io::Result<()> {
        if metadata.file_type().is_symlink() {
            return Ok(());
        }
        clear_native_attributes(path, metadata)
    }

    fn take_ownership(&self, path: &Path) -> io::Result<()> {
        take_native_ownership(path)
    }

    fn move_to_recycle_bin(&self, path: &Path) -> io::Result<()> {
        trash::delete(path).map_err(io::Error::other)
    }

    fn schedule_delete_on_reboot(&self, path: &Path) -> io::Result<()> {
        self.reboot_queue.schedule(path)
    }
}

// ──────────────────── unix ────────────────────

#[cfg(unix)]
fn native_attributes(path: &Path, metadata: &Metadata) -> FileAttributes {
    use std::os::unix::fs::PermissionsExt;

    let hidden = path
        .file_name()
        .is_some_and(|name| name.to_string_lossy().starts_with('.'));
    FileAttributes {
        hidden,
        system: false,
        readonly: metadata.permissions().mode() & 0o200 == 0,
    }
}

#[cfg(unix)]
fn clear_native_attributes(path: &Path, metadata: &Metadata) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = metadata.permissions().mode();
    let wanted = if metadata.is_dir() { mode | 0o700 } else { mode | 0o600 };
    if wanted == mode {
        return Ok(());
    }
    fs::set_permissions(path, fs::Permissions::from_mode(wanted))
}

#[cfg(unix)]
fn take_native_ownership(path: &Path) -> io::Result<()> {
    use nix::unistd::{chown, getegid, geteuid};

    let uid = geteuid();
    let gid = getegid();
    let metadata = fs::symlink_metadata(path)?;
    if !metadata.is_dir() {
        return chown(path, Some(uid), Some(gid)).map_err(io::Error::from);
    }
    let mut first_error = None;
    for entry in walkdir::WalkDir::new(path).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                first_error.get_or_insert_with(|| io::Error::other(err.to_string()));
                continue;
            }
        };
        if entry.path_is_symlink() {
            continue;
        }
        if let Err(err) = chown(entry.path(), Some(uid), Some(gid)) {
            first_error.get_or_insert_with(|| io::Error::from(err));
        }
    }
    first_error.map_or(Ok(()), Err)
}

// ──────────────────── windows ────────────────────

#[cfg(windows)]
const FILE_ATTRIBUTE_READONLY: u32 = 0x1;
#[cfg(windows)]
const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
#[cfg(windows)]
const FILE_ATTRIBUTE_SYSTEM: u32 = 0x4;

#[cfg(windows)]
fn native_attributes(_path: &Path, metadata: &Metadata) -> FileAttributes {
    use std::os::windows::fs::MetadataExt;

    let attrs = metadata.file_attributes();
    FileAttributes {
        hidden: attrs & FILE_ATTRIBUTE_HIDDEN != 0,
        system: attrs & FILE_ATTRIBUTE_SYSTEM != 0,
        readonly: attrs & FILE_ATTRIBUTE_READONLY != 0,
    }
}

#[cfg(windows)]
fn clear_native_attributes(path: &Path, metadata: &Metadata) -> io::Result<()> {
    let mut permissions = metadata.permissions();
    if !permissions.readonly() {
        return Ok(());
    }
    permissions.set_readonly(false);
    fs::set_permissions(path, permissions)
}

#[cfg(windows)]
fn take_native_ownership(path: &Path) -> io::Result<()> {
    use std::process::Command;

    let is_dir = fs::symlink_metadata(path)?.is_dir();
    let mut takeown = Command::new("takeown");
    takeown.arg("/f").arg(path);
    if is_dir {
        takeown.args(["/r", "/d", "y"]);
    }
    run_checked(takeown, "takeown")?;

    let user = std::env::var("USERNAME").unwrap_or_else(|_| "Administrators".to_string());
    let mut icacls = Command::new("icacls");
    icacls.arg(path).arg("/grant").arg(format!("{user}:F")).args(["/c", "/q"]);
    if is_dir {
        icacls.arg("/t");
    }
    run_checked(icacls, "icacls")
}

#[cfg(windows)]
fn run_checked(mut command: std::process::Command, name: &str) -> io::Result<()> {
    let output = command.output()?;
    if output.status.success() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!(
                "{name} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform(dir: &Path) -> NativePlatform {
        NativePlatform::new(PendingRebootQueue::new(dir.join("pending.json")))
    }

    #[cfg(unix)]
    #[test]
    fn dotfiles_are_hidden_on_unix() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let file = tmp.path().join(".secret");
        fs::write(&file, b"x").expect("write");
        let meta = fs::symlink_metadata(&file).expect("meta");
        let attrs = platform(tmp.path()).attributes(&file, &meta);
        assert!(attrs.hidden);
        assert!(!attrs.system);
    }

    #[cfg(unix)]
    #[test]
    fn clearing_restores_owner_write() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().expect("tempdir");
        let file = tmp.path().join("locked.txt");
        fs::write(&file, b"x").expect("write");
        fs::set_permissions(&file, fs::Permissions::from_mode(0o444)).expect("chmod");
        let p = platform(tmp.path());
        let meta = fs::symlink_metadata(&file).expect("meta");
        assert!(p.attributes(&file, &meta).readonly);
        p.clear_restrictive_attributes(&file, &meta).expect("clear");
        let meta = fs::symlink_metadata(&file).expect("meta");
        assert!(!p.attributes(&file, &meta).readonly);
    }

    #[test]
    fn reboot_requests_are_queued() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let p = platform(tmp.path());
        let target = tmp.path().join("stuck.bin");
        p.schedule_delete_on_reboot(&target).expect("schedule");
        let pending = p.reboot_queue().list().expect("list");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].path, target);
    }
}
