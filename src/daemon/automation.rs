//! Persisted automation settings and their translation into deletion options.

#![allow(missing_docs)]

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deletion::model::DeletionOptions;
use crate::scanner::target::{TargetCategory, TargetDefinition};

pub const MIN_INTERVAL_MINUTES: u32 = 30;
pub const MAX_INTERVAL_MINUTES: u32 = 30 * 24 * 60;
pub const DEFAULT_INTERVAL_MINUTES: u32 = 24 * 60;

pub const MIN_TOP_ITEMS: usize = 10;
pub const MAX_TOP_ITEMS: usize = 1000;
pub const DEFAULT_TOP_ITEMS: usize = 100;

/// How an automated run removes what it selected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeletionMode {
    /// Leave items held open by other processes alone.
    #[default]
    SkipLocked,
    /// Recycle bin only; nothing is removed permanently.
    MoveToRecycleBin,
    /// Take ownership when denied, and queue leftovers for the next restart.
    ForceDelete,
}

impl DeletionMode {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::SkipLocked => "skip-locked",
            Self::MoveToRecycleBin => "recycle",
            Self::ForceDelete => "force",
        }
    }

    /// Locked candidates are filtered out before deletion.
    #[must_use]
    pub const fn skips_locked(self) -> bool {
        matches!(self, Self::SkipLocked)
    }

    /// Concrete options for this mode, layered over `base`.
    #[must_use]
    pub fn deletion_options(self, base: DeletionOptions) -> DeletionOptions {
        match self {
            Self::SkipLocked => DeletionOptions {
                prefer_recycle_bin: false,
                take_ownership_on_access_denied: false,
                allow_delete_on_reboot: false,
                ..base
            },
            Self::MoveToRecycleBin => DeletionOptions {
                prefer_recycle_bin: true,
                allow_permanent_fallback: false,
                take_ownership_on_access_denied: false,
                allow_delete_on_reboot: false,
                ..base
            },
            Self::ForceDelete => DeletionOptions {
                prefer_recycle_bin: false,
                take_ownership_on_access_denied: true,
                allow_delete_on_reboot: true,
                ..base
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationSettings {
    pub enabled: bool,
    pub interval_minutes: u32,
    pub deletion_mode: DeletionMode,
    pub include_downloads: bool,
    pub include_browser_history: bool,
    pub top_item_count: usize,
    pub last_run_utc: Option<DateTime<Utc>>,
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            deletion_mode: DeletionMode::SkipLocked,
            include_downloads: false,
            include_browser_history: false,
            top_item_count: DEFAULT_TOP_ITEMS,
            last_run_utc: None,
        }
    }
}

impl AutomationSettings {
    /// Interval and top-N clamped into their allowed ranges.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.interval_minutes = self.interval_minutes.clamp(MIN_INTERVAL_MINUTES, MAX_INTERVAL_MINUTES);
        self.top_item_count = self.top_item_count.clamp(MIN_TOP_ITEMS, MAX_TOP_ITEMS);
        self
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_minutes) * 60)
    }

    /// When the next run is due. A never-run schedule is due immediately.
    #[must_use]
    pub fn next_due(&self) -> DateTime<Utc> {
        let interval = chrono::Duration::minutes(i64::from(self.interval_minutes));
        self.last_run_utc.map_or(DateTime::<Utc>::MIN_UTC, |last| {
            last.checked_add_signed(interval).unwrap_or(DateTime::<Utc>::MAX_UTC)
        })
    }

    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_due() <= now
    }

    /// Targets this schedule covers: downloads and browser history only when
    /// opted in.
    #[must_use]
    pub fn scope(&self, targets: &[TargetDefinition]) -> Vec<TargetDefinition> {
        targets
            .iter()
            .filter(|target| match target.category {
                TargetCategory::Downloads => self.include_downloads,
                TargetCategory::BrowserHistory => self.include_browser_history,
                _ => true,
            })
            .cloned()
            .collect()
    }
}
