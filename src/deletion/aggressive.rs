//! Last-resort removal used when a plain delete fails.
//!
//! Restrictive attributes are cleared bottom-up across a directory tree before
//! removal is retried. Retry count and backoff are explicit constants and the
//! backoff goes through the injected [`Clock`].

#![allow(missing_docs)]

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::core::cancel::CancellationToken;
use crate::core::clock::Clock;
use crate::platform::pal::Platform;

/// Removal attempts, each preceded by an attribute-clearing pass.
pub const MAX_AGGRESSIVE_ATTEMPTS: u32 = 2;

/// Delay between two attempts.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Entries visited between two cancellation checks while clearing a tree.
pub const CANCEL_CHECK_INTERVAL: usize = 64;

/// Result of [`AggressiveDeleter::try_aggressive_delete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggressiveOutcome {
    pub success: bool,
    pub failure_reason: Option<String>,
    /// The last failure was an access-denied error.
    pub access_denied: bool,
}

impl AggressiveOutcome {
    const fn succeeded() -> Self {
        Self {
            success: true,
            failure_reason: None,
            access_denied: false,
        }
    }

    fn failed(reason: impl Into<String>, access_denied: bool) -> Self {
        Self {
            success: false,
            failure_reason: Some(reason.into()),
            access_denied,
        }
    }
}

struct TreeCancelled;

#[derive(Clone)]
pub struct AggressiveDeleter {
    platform: Arc<dyn Platform>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AggressiveDeleter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggressiveDeleter").finish_non_exhaustive()
    }
}

impl AggressiveDeleter {
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>, clock: Arc<dyn Clock>) -> Self {
        Self { platform, clock }
    }

    /// Remove `path`, clearing restrictive attributes and retrying once.
    ///
    /// Already-missing and blank paths succeed. A cancelled call reports what
    /// is actually on disk: success only if the path is gone.
    pub fn try_aggressive_delete(
        &self,
        path: &Path,
        is_directory: bool,
        cancel: &CancellationToken,
    ) -> AggressiveOutcome {
        if path.as_os_str().is_empty() || path.to_string_lossy().trim().is_empty() {
            return AggressiveOutcome::succeeded();
        }
        let metadata = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return AggressiveOutcome::succeeded(),
            Err(err) => {
                return AggressiveOutcome::failed(
                    format!("Unable to inspect item: {err}"),
                    err.kind() == io::ErrorKind::PermissionDenied,
                );
            }
        };
        let on_disk_dir = metadata.is_dir();
        if on_disk_dir != is_directory {
            return AggressiveOutcome::failed(
                format!(
                    "Item changed type since it was scanned (now a {})",
                    if on_disk_dir { "directory" } else { "file" }
                ),
                false,
            );
        }

        let mut widened = None;
        let outcome = self.remove_with_retries(path, on_disk_dir, cancel, &mut widened);
        if !outcome.success {
            if let Some(permissions) = widened {
                // Put back the mode a failed attempt loosened.
                let _ = fs::set_permissions(path, permissions);
            }
        }
        outcome
    }

    /// The attempt loop. `widened` receives a file's original permissions
    /// when they were loosened to clear a read-only bit.
    fn remove_with_retries(
        &self,
        path: &Path,
        on_disk_dir: bool,
        cancel: &CancellationToken,
        widened: &mut Option<fs::Permissions>,
    ) -> AggressiveOutcome {
        let mut last_error: Option<io::Error> = None;
        for attempt in 0..MAX_AGGRESSIVE_ATTEMPTS {
            if attempt > 0 {
                self.clock.sleep(RETRY_BACKOFF);
            }
            if cancel.is_cancelled() {
                return Self::settle_cancelled(path);
            }

            if on_disk_dir {
                let mut visited = 0;
                if self.clear_tree(path, cancel, &mut visited).is_err() {
                    return Self::settle_cancelled(path);
                }
            } else if let Ok(current) = fs::symlink_metadata(path) {
                let restricted = !current.file_type().is_symlink() && self.platform.attributes(path, &current).readonly;
                if restricted && self.platform.clear_restrictive_attributes(path, &current).is_ok() {
                    widened.get_or_insert_with(|| current.permissions());
                }
            }

            if cancel.is_cancelled() {
                return Self::settle_cancelled(path);
            }

            let removal = if on_disk_dir {
                self.platform.remove_dir_all(path)
            } else {
                self.platform.remove_file(path)
            };
            match removal {
                Ok(()) => return AggressiveOutcome::succeeded(),
                Err(err) if err.kind() == io::ErrorKind::NotFound => return AggressiveOutcome::succeeded(),
                Err(err) => last_error = Some(err),
            }
        }

        if fs::symlink_metadata(path).is_err() {
            return AggressiveOutcome::succeeded();
        }
        match last_error {
            Some(err) => {
                let denied = err.kind() == io::ErrorKind::PermissionDenied;
                let prefix = if denied { "Access denied" } else { "Removal failed" };
                AggressiveOutcome::failed(format!("{prefix}: {err}"), denied)
            }
            None => AggressiveOutcome::failed("Removal failed for an unknown reason", false),
        }
    }

    /// Clear attributes on every descendant (children before their parent)
    /// and finally on `dir` itself.
    fn clear_tree(&self, dir: &Path, cancel: &CancellationToken, visited: &mut usize) -> Result<(), TreeCancelled> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => Some(entries),
            Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                // An unreadable directory may become listable once its own
                // restrictions are lifted.
                if let Ok(meta) = fs::symlink_metadata(dir) {
                    let _ = self.platform.clear_restrictive_attributes(dir, &meta);
                }
                fs::read_dir(dir).ok()
            }
            Err(_) => None,
        };

        if let Some(entries) = entries {
            for entry in entries.flatten() {
                *visited += 1;
                if *visited % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                    return Err(TreeCancelled);
                }
                let child = entry.path();
                let Ok(meta) = fs::symlink_metadata(&child) else {
                    continue;
                };
                if meta.is_dir() {
                    self.clear_tree(&child, cancel, visited)?;
                } else {
                    let _ = self.platform.clear_restrictive_attributes(&child, &meta);
                }
            }
        }

        if let Ok(meta) = fs::symlink_metadata(dir) {
            let _ = self.platform.clear_restrictive_attributes(dir, &meta);
        }
        Ok(())
    }

    fn settle_cancelled(path: &Path) -> AggressiveOutcome {
        if fs::symlink_metadata(path).is_err() {
            AggressiveOutcome::succeeded()
        } else {
            AggressiveOutcome::failed("Cancelled before removal completed", false)
        }
    }
}
