//! Throttled progress reporting from the deletion pipeline to its caller.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Minimum spacing between two progress callbacks.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Snapshot handed to the progress callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionProgress {
    pub processed: usize,
    pub total: usize,
    pub bytes_freed: u64,
    pub current_path: Option<PathBuf>,
}

impl DeletionProgress {
    #[must_use]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.processed as f64 / self.total as f64
        }
    }
}

/// Rate limiter for progress callbacks. The first update and forced updates
/// (batch completion) always pass.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    min_interval: Duration,
    last_emit: Option<Instant>,
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_INTERVAL)
    }
}

impl ProgressThrottle {
    #[must_use]
    pub const fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_emit: None,
        }
    }

    pub fn should_emit(&mut self, now: Instant, force: bool) -> bool {
        let due = force
            || self
                .last_emit
                .is_none_or(|last| now.saturating_duration_since(last) >= self.min_interval);
        if due {
            self.last_emit = Some(now);
        }
        due
    }
}
