//! Preview building: capture, score, apply retention, rank.

#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::cancel::CancellationToken;
use crate::core::config::Config;
use crate::core::errors::Result;
use crate::platform::pal::Platform;
use crate::scanner::retention::CrashDumpRetentionPolicy;
use crate::scanner::scoring::{EvaluationResult, ScoringEngine};
use crate::scanner::target::{DirectorySnapshot, FileContext, TargetCategory, TargetDefinition};
use crate::scanner::walker::{TargetWalker, WalkerConfig};

/// A deletion candidate as shown to the user. Sizes and timestamps are
/// scan-time values; the pipeline re-measures before deleting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewItem {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
    pub is_directory: bool,
    pub extension: String,
    pub is_hidden: bool,
}

impl From<&FileContext> for PreviewItem {
    fn from(context: &FileContext) -> Self {
        Self {
            name: context.name.clone(),
            path: context.full_path.clone(),
            size_bytes: context.size_bytes,
            last_modified: context.last_modified,
            is_directory: false,
            extension: context.extension.clone(),
            is_hidden: context.is_hidden,
        }
    }
}

impl From<&DirectorySnapshot> for PreviewItem {
    fn from(snapshot: &DirectorySnapshot) -> Self {
        Self {
            name: snapshot.name.clone(),
            path: snapshot.full_path.clone(),
            size_bytes: snapshot.total_size_bytes,
            last_modified: snapshot.last_modified,
            is_directory: true,
            extension: String::new(),
            is_hidden: snapshot.is_hidden,
        }
    }
}

/// A preview item with the evaluation that selected it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPreviewItem {
    pub item: PreviewItem,
    pub category: TargetCategory,
    pub target: String,
    pub evaluation: EvaluationResult,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Preview {
    /// Included candidates, ranked.
    pub items: Vec<ScoredPreviewItem>,
    /// Crash dumps held back by retention.
    pub retained: BTreeSet<PathBuf>,
    /// Number of captures evaluated.
    pub evaluated: usize,
    pub errors: Vec<String>,
}

impl Preview {
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.items
            .iter()
            .fold(0_u64, |acc, scored| acc.saturating_add(scored.item.size_bytes))
    }

    /// The bare items, in ranked order.
    #[must_use]
    pub fn preview_items(&self) -> Vec<PreviewItem> {
        self.items.iter().map(|scored| scored.item.clone()).collect()
    }

    /// Keep only the first `n` ranked items.
    pub fn truncate(&mut self, n: usize) {
        self.items.truncate(n);
    }
}

/// Produces previews for a set of targets.
pub trait PreviewSource: Send + Sync {
    fn preview(
        &self,
        targets: &[TargetDefinition],
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Preview>;
}

#[derive(Debug)]
pub struct PreviewBuilder {
    walker: TargetWalker,
    engine: ScoringEngine,
    retention: CrashDumpRetentionPolicy,
}

impl PreviewBuilder {
    #[must_use]
    pub const fn new(walker: TargetWalker, engine: ScoringEngine, retention: CrashDumpRetentionPolicy) -> Self {
        Self {
            walker,
            engine,
            retention,
        }
    }

    /// Builder wired from configuration: walker limits, scoring weights and
    /// the crash-dump retention count.
    #[must_use]
    pub fn from_config(config: &Config, platform: Arc<dyn Platform>) -> Self {
        let walker = TargetWalker::new(
            WalkerConfig {
                max_depth: config.scanner.max_depth,
                recent_window: config.scanner.recent_window(),
                temp_extensions: config.scoring.temp_extensions.clone(),
            },
            platform,
        );
        Self::new(
            walker,
            ScoringEngine::new(config.scoring.clone()),
            CrashDumpRetentionPolicy::new(config.retention.crash_dumps_to_keep),
        )
    }

    #[must_use]
    pub const fn engine(&self) -> &ScoringEngine {
        &self.engine
    }
}

impl PreviewSource for PreviewBuilder {
    fn preview(
        &self,
        targets: &[TargetDefinition],
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Preview> {
        let mut preview = Preview::default();
        for target in targets {
            cancel.check("preview")?;
            let capture = match self.walker.capture(target, now, cancel) {
                Ok(capture) => capture,
                Err(err) if err.is_cancellation() => return Err(err),
                Err(err) => {
                    preview.errors.push(format!("{}: {err}", target.display_name));
                    continue;
                }
            };
            preview.errors.extend(capture.errors.iter().cloned());
            preview.evaluated += capture.len();

            let retained = if target.category == TargetCategory::CrashDumps {
                self.retention.paths_to_protect(&capture.files)
            } else {
                BTreeSet::new()
            };

            for context in &capture.files {
                if retained.contains(&context.full_path) {
                    continue;
                }
                let evaluation = self.engine.evaluate_file(target, context, now);
                if evaluation.should_include {
                    preview.items.push(scored(PreviewItem::from(context), target, evaluation));
                }
            }
            for snapshot in &capture.directories {
                let evaluation = self.engine.evaluate_directory(target, snapshot, now);
                if evaluation.should_include {
                    preview.items.push(scored(PreviewItem::from(snapshot), target, evaluation));
                }
            }
            preview.retained.extend(retained);
        }
        rank_by_size(&mut preview.items);
        Ok(preview)
    }
}

fn scored(item: PreviewItem, target: &TargetDefinition, evaluation: EvaluationResult) -> ScoredPreviewItem {
    ScoredPreviewItem {
        item,
        category: target.category,
        target: target.display_name.clone(),
        evaluation,
    }
}

/// Size descending, then path ascending.
pub fn rank_by_size(items: &mut [ScoredPreviewItem]) {
    items.sort_by(|a, b| {
        b.item
            .size_bytes
            .cmp(&a.item.size_bytes)
            .then_with(|| a.item.path.cmp(&b.item.path))
    });
}
