//! Crash dump retention: keep the newest N dumps per originating program.
//!
//! Applied after scoring as an independent safety net. Program identity is the
//! file stem up to the first dump-sequence marker (a digit run, or a separator
//! followed by `crash`/`dump`), so `chrome.exe.1234.dmp` and
//! `chrome.exe.5678.dmp` group together.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use crate::scanner::target::FileContext;

/// Default number of dumps kept per program.
pub const DEFAULT_CRASH_DUMPS_TO_KEEP: usize = 3;

static SEQUENCE_MARKER: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)[._\-\s]+(?:mini)?(?:crash|dump)|[._\-\s]*\d").ok()
});

/// Keeps the most recent crash artifacts of every program out of deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrashDumpRetentionPolicy {
    retain_count: usize,
}

impl Default for CrashDumpRetentionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_CRASH_DUMPS_TO_KEEP)
    }
}

impl CrashDumpRetentionPolicy {
    #[must_use]
    pub const fn new(retain_count: usize) -> Self {
        Self { retain_count }
    }

    #[must_use]
    pub const fn retain_count(&self) -> usize {
        self.retain_count
    }

    /// `GetPathsToProtect`: paths of the newest `retain_count` dumps per program.
    ///
    /// Groups smaller than the retention count are protected entirely. Ties on
    /// modification time are broken by path so the result is deterministic.
    #[must_use]
    pub fn paths_to_protect(&self, contexts: &[FileContext]) -> BTreeSet<PathBuf> {
        let mut groups: BTreeMap<String, Vec<&FileContext>> = BTreeMap::new();
        for context in contexts {
            groups
                .entry(program_identity(&context.name))
                .or_default()
                .push(context);
        }

        let mut protected = BTreeSet::new();
        for members in groups.values_mut() {
            members.sort_by(|a, b| {
                b.last_modified
                    .cmp(&a.last_modified)
                    .then_with(|| a.full_path.cmp(&b.full_path))
            });
            protected.extend(
                members
                    .iter()
                    .take(self.retain_count)
                    .map(|context| context.full_path.clone()),
            );
        }
        protected
    }
}

/// Lowercased program identity inferred from a dump file name.
#[must_use]
pub fn program_identity(file_name: &str) -> String {
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    };
    let cut = SEQUENCE_MARKER
        .as_ref()
        .and_then(|re| re.find(stem))
        .map_or(stem.len(), |m| m.start());
    let identity = stem[..cut].trim();
    if identity.is_empty() {
        stem.to_lowercase()
    } else {
        identity.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).single().expect("valid")
    }

    fn dump(name: &str, hours: i64) -> FileContext {
        let modified = base() + Duration::hours(hours);
        FileContext {
            name: name.to_string(),
            full_path: PathBuf::from("/dumps").join(name),
            extension: "dmp".to_string(),
            size_bytes: 1024,
            last_modified: modified,
            last_accessed: modified,
            created: modified,
            is_hidden: false,
            is_system: false,
            is_recently_modified: false,
        }
    }

    #[test]
    fn identity_strips_sequence_markers() {
        assert_eq!(program_identity("chrome.exe.1234.dmp"), "chrome.exe");
        assert_eq!(program_identity("Mini030124-01.dmp"), "mini");
        assert_eq!(program_identity("Game_Crash_2024-01-01.dmp"), "game");
        assert_eq!(program_identity("app-minidump-7.mdmp"), "app");
        assert_eq!(program_identity("explorer.dmp"), "explorer");
        assert_eq!(program_identity("1234.dmp"), "1234");
    }

    #[test]
    fn keeps_newest_n_per_program() {
        let contexts = vec![
            dump("app.exe.1.dmp", 1),
            dump("app.exe.2.dmp", 2),
            dump("app.exe.3.dmp", 3),
            dump("app.exe.4.dmp", 4),
        ];
        let protected = CrashDumpRetentionPolicy::new(2).paths_to_protect(&contexts);
        assert_eq!(protected.len(), 2);
        assert!(protected.contains(&PathBuf::from("/dumps/app.exe.4.dmp")));
        assert!(protected.contains(&PathBuf::from("/dumps/app.exe.3.dmp")));
        assert!(!protected.contains(&PathBuf::from("/dumps/app.exe.1.dmp")));
    }

    #[test]
    fn small_groups_are_fully_protected() {
        let contexts = vec![dump("a.exe.1.dmp", 1), dump("b.exe.1.dmp", 1), dump("b.exe.2.dmp", 5)];
        let protected = CrashDumpRetentionPolicy::new(3).paths_to_protect(&contexts);
        assert_eq!(protected.len(), 3);
    }

    #[test]
    fn groups_are_independent() {
        let contexts = vec![
            dump("a.exe.1.dmp", 1),
            dump("a.exe.2.dmp", 2),
            dump("b.exe.1.dmp", 10),
            dump("b.exe.2.dmp", 20),
        ];
        let protected = CrashDumpRetentionPolicy::new(1).paths_to_protect(&contexts);
        assert_eq!(
            protected.into_iter().collect::<Vec<_>>(),
            vec![PathBuf::from("/dumps/a.exe.2.dmp"), PathBuf::from("/dumps/b.exe.2.dmp")]
        );
    }

    #[test]
    fn empty_input_protects_nothing() {
        assert!(CrashDumpRetentionPolicy::default().paths_to_protect(&[]).is_empty());
    }
}
