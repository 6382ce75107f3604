//! Lock inspection: which running processes hold files under a path.
//!
//! Used by the skip-locked automation mode to drop candidates that are in use
//! instead of fighting over them.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::Serialize;

/// A process holding an open handle on (or under) a candidate path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessDescriptor {
    pub pid: u32,
    pub name: String,
    /// The requested candidate this handle blocks.
    pub candidate: PathBuf,
    /// The open file that matched.
    pub held_path: PathBuf,
}

pub trait LockInspector: Send + Sync {
    /// Processes holding any of `paths` or anything beneath them. One
    /// descriptor per (candidate, open handle) pair.
    fn blocking_processes(&self, paths: &[PathBuf]) -> Vec<ProcessDescriptor>;
}

/// Blocking processes grouped by the candidate they block.
#[must_use]
pub fn holders_by_candidate(descriptors: Vec<ProcessDescriptor>) -> BTreeMap<PathBuf, Vec<ProcessDescriptor>> {
    let mut grouped: BTreeMap<PathBuf, Vec<ProcessDescriptor>> = BTreeMap::new();
    for descriptor in descriptors {
        grouped.entry(descriptor.candidate.clone()).or_default().push(descriptor);
    }
    grouped
}

/// Reports nothing as locked.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLockInspector;

impl LockInspector for NoLockInspector {
    fn blocking_processes(&self, _paths: &[PathBuf]) -> Vec<ProcessDescriptor> {
        Vec::new()
    }
}

/// Resolves `/proc/<pid>/fd/*` links. Reports nothing where `/proc` is absent.
#[derive(Debug, Clone)]
pub struct ProcFdLockInspector {
    proc_root: PathBuf,
}

impl Default for ProcFdLockInspector {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcFdLockInspector {
    #[must_use]
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    /// Every readable open-file link, keyed by target path.
    #[must_use]
    pub fn open_files(&self) -> BTreeMap<PathBuf, Vec<(u32, String)>> {
        let mut open: BTreeMap<PathBuf, Vec<(u32, String)>> = BTreeMap::new();
        let Ok(proc_dir) = fs::read_dir(&self.proc_root) else {
            return open;
        };
        for entry in proc_dir.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            let Ok(pid) = name.parse::<u32>() else {
                continue;
            };
            let proc_path = entry.path();
            let Ok(fds) = fs::read_dir(proc_path.join("fd")) else {
                continue;
            };
            let comm = fs::read_to_string(proc_path.join("comm"))
                .unwrap_or_default()
                .trim()
                .to_string();
            for fd in fds.flatten() {
                let Ok(target) = fs::read_link(fd.path()) else {
                    continue;
                };
                if target.is_absolute() {
                    open.entry(target).or_default().push((pid, comm.clone()));
                }
            }
        }
        open
    }
}

impl LockInspector for ProcFdLockInspector {
    fn blocking_processes(&self, paths: &[PathBuf]) -> Vec<ProcessDescriptor> {
        if paths.is_empty() {
            return Vec::new();
        }
        let open = self.open_files();
        let mut blockers = Vec::new();
        for candidate in paths {
            for (target, holders) in open.range(candidate.clone()..) {
                if !target.starts_with(candidate) {
                    break;
                }
                blockers.extend(holders.iter().map(|(pid, name)| ProcessDescriptor {
                    pid: *pid,
                    name: name.clone(),
                    candidate: candidate.clone(),
                    held_path: target.clone(),
                }));
            }
        }
        blockers
    }
}
