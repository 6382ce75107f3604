//! Confidence scoring: weighted signal rules over file and directory snapshots.
//!
//! Each rule inspects one fact and may contribute a signed weight plus a label.
//! Rules are evaluated in table order, summed, and clamped to `[0, 1]`. The
//! reference time is always an argument, so identical inputs give identical
//! results. Nothing here touches the filesystem.

#![allow(missing_docs)]

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::config::ScoringConfig;
use crate::core::units::format_bytes;
use crate::scanner::target::{DirectorySnapshot, FileContext, TargetDefinition, compile_glob};

/// Outcome of evaluating one file or directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub should_include: bool,
    /// Clamped to `[0, 1]`.
    pub confidence: f64,
    /// One label per contributing rule, in rule order.
    pub signals: Vec<String>,
}

/// A single rule's contribution.
#[derive(Debug, Clone, PartialEq)]
struct Contribution {
    weight: f64,
    label: String,
}

impl Contribution {
    fn new(weight: f64, label: impl Into<String>) -> Option<Self> {
        Some(Self {
            weight,
            label: label.into(),
        })
    }
}

/// Everything a rule may look at.
struct RuleInput<'a, T> {
    definition: &'a TargetDefinition,
    subject: &'a T,
    now: DateTime<Utc>,
    config: &'a ScoringConfig,
}

/// Named scoring rule. `apply` returns `None` when the rule does not fire.
struct Rule<T> {
    #[allow(dead_code)]
    name: &'static str,
    apply: fn(&RuleInput<'_, T>) -> Option<Contribution>,
}

// ──────────────────── file rules ────────────────────

const FILE_RULES: &[Rule<FileContext>] = &[
    Rule {
        name: "baseline",
        apply: |input| baseline(input.definition, input.config),
    },
    Rule {
        name: "temp-extension",
        apply: |input| {
            let ext = &input.subject.extension;
            contains_ext(&input.config.temp_extensions, ext).then(|| Contribution {
                weight: input.config.temp_extension_weight,
                label: format!("Temporary extension (.{ext})"),
            })
        },
    },
    Rule {
        name: "cache-extension",
        apply: |input| {
            let ext = &input.subject.extension;
            contains_ext(&input.config.cache_extensions, ext).then(|| Contribution {
                weight: input.config.cache_extension_weight,
                label: format!("Cache or log extension (.{ext})"),
            })
        },
    },
    Rule {
        name: "staleness",
        apply: |input| staleness(input.subject.last_modified, input.now, input.config),
    },
    Rule {
        name: "large-size",
        apply: |input| large_size(input.subject.size_bytes, input.config),
    },
    Rule {
        name: "hidden",
        apply: |input| {
            if input.subject.is_hidden {
                Contribution::new(input.config.hidden_weight, "Hidden attribute")
            } else {
                None
            }
        },
    },
    Rule {
        name: "system",
        apply: |input| {
            if input.subject.is_system {
                Contribution::new(input.config.system_weight, "System attribute")
            } else {
                None
            }
        },
    },
    Rule {
        name: "recently-modified",
        apply: |input| {
            if input.subject.is_recently_modified {
                Contribution::new(input.config.recent_weight, "Recently modified")
            } else {
                None
            }
        },
    },
    Rule {
        name: "crash-path-hint",
        apply: |input| crash_hint(&input.subject.full_path.to_string_lossy(), input.config),
    },
];

// ──────────────────── directory rules ────────────────────

const DIRECTORY_RULES: &[Rule<DirectorySnapshot>] = &[
    Rule {
        name: "baseline",
        apply: |input| baseline(input.definition, input.config),
    },
    Rule {
        name: "empty-directory",
        apply: |input| {
            if input.subject.is_empty() {
                Contribution::new(input.config.empty_directory_weight, "Empty directory")
            } else {
                None
            }
        },
    },
    Rule {
        name: "temp-ratio",
        apply: |input| {
            let ratio = ratio(input.subject.temp_file_count, input.subject.file_count)?;
            Contribution::new(
                input.config.temp_ratio_weight * ratio,
                format!("Temporary files make up {:.0}% of contents", ratio * 100.0),
            )
        },
    },
    Rule {
        name: "staleness",
        apply: |input| staleness(input.subject.last_modified, input.now, input.config),
    },
    Rule {
        name: "large-size",
        apply: |input| large_size(input.subject.total_size_bytes, input.config),
    },
    Rule {
        name: "hidden",
        apply: |input| {
            if input.subject.is_hidden {
                Contribution::new(input.config.hidden_weight, "Hidden attribute")
            } else {
                None
            }
        },
    },
    Rule {
        name: "system",
        apply: |input| {
            if input.subject.is_system {
                Contribution::new(input.config.system_weight, "System attribute")
            } else {
                None
            }
        },
    },
    Rule {
        name: "recent-ratio",
        apply: |input| {
            let ratio = ratio(input.subject.recent_file_count, input.subject.file_count)?;
            Contribution::new(
                input.config.recent_ratio_weight * ratio,
                format!("Recently modified files make up {:.0}% of contents", ratio * 100.0),
            )
        },
    },
    Rule {
        name: "protected-ratio",
        apply: |input| {
            let flagged = input.subject.hidden_file_count + input.subject.system_file_count;
            let ratio = ratio(flagged.min(input.subject.file_count), input.subject.file_count)?;
            Contribution::new(
                input.config.protected_ratio_weight * ratio,
                format!("Hidden or system files make up {:.0}% of contents", ratio * 100.0),
            )
        },
    },
    Rule {
        name: "crash-path-hint",
        apply: |input| crash_hint(&input.subject.full_path.to_string_lossy(), input.config),
    },
];

// ──────────────────── shared rule bodies ────────────────────

fn baseline(definition: &TargetDefinition, config: &ScoringConfig) -> Option<Contribution> {
    Contribution::new(
        config.base_confidence,
        format!("Cleanup target: {}", definition.display_name),
    )
}

fn contains_ext(list: &[String], ext: &str) -> bool {
    !ext.is_empty() && list.iter().any(|candidate| candidate.eq_ignore_ascii_case(ext))
}

#[allow(clippy::cast_precision_loss)]
fn staleness(modified: DateTime<Utc>, now: DateTime<Utc>, config: &ScoringConfig) -> Option<Contribution> {
    let age_secs = (now - modified).num_seconds();
    if age_secs <= 0 {
        return None;
    }
    let age_days = age_secs as f64 / 86_400.0;
    let after = config.stale_after_days as f64;
    if age_days <= after {
        return None;
    }
    let span = (config.stale_saturation_days as f64 - after).max(1.0);
    let fraction = ((age_days - after) / span).min(1.0);
    Contribution::new(
        config.stale_max_weight * fraction,
        format!("Stale: unmodified for {} days", age_days.floor()),
    )
}

fn large_size(size_bytes: u64, config: &ScoringConfig) -> Option<Contribution> {
    if size_bytes >= config.large_file_bytes && config.large_file_bytes > 0 {
        Contribution::new(
            config.large_file_weight,
            format!("Large size ({})", format_bytes(size_bytes)),
        )
    } else {
        None
    }
}

fn crash_hint(path: &str, config: &ScoringConfig) -> Option<Contribution> {
    let lowered = path.to_lowercase();
    let hint = config
        .crash_path_hints
        .iter()
        .find(|hint| !hint.is_empty() && lowered.contains(&hint.to_lowercase()))?;
    Contribution::new(config.crash_hint_weight, format!("Crash path hint ({hint})"))
}

#[allow(clippy::cast_precision_loss)]
fn ratio(part: usize, whole: usize) -> Option<f64> {
    if whole == 0 || part == 0 {
        None
    } else {
        Some(part as f64 / whole as f64)
    }
}

// ──────────────────── engine ────────────────────

/// Evaluates snapshots against a target definition using [`ScoringConfig`] weights.
#[derive(Debug)]
pub struct ScoringEngine {
    config: ScoringConfig,
    /// Compiled target filters keyed by glob. `None` marks an uncompilable glob.
    filters: RwLock<HashMap<String, Option<Regex>>>,
}

impl Clone for ScoringEngine {
    fn clone(&self) -> Self {
        Self::new(self.config.clone())
    }
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

impl ScoringEngine {
    #[must_use]
    pub fn new(config: ScoringConfig) -> Self {
        Self {
            config,
            filters: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// `EvaluateFile`.
    #[must_use]
    pub fn evaluate_file(
        &self,
        definition: &TargetDefinition,
        context: &FileContext,
        now: DateTime<Utc>,
    ) -> EvaluationResult {
        if let Some(glob) = &definition.filter {
            if !self.filter_matches(glob, &context.name) {
                return EvaluationResult {
                    should_include: false,
                    confidence: 0.0,
                    signals: vec![format!("Outside target filter ({glob})")],
                };
            }
        }
        self.run(FILE_RULES, definition, context, now)
    }

    /// `EvaluateDirectory`.
    #[must_use]
    pub fn evaluate_directory(
        &self,
        definition: &TargetDefinition,
        snapshot: &DirectorySnapshot,
        now: DateTime<Utc>,
    ) -> EvaluationResult {
        self.run(DIRECTORY_RULES, definition, snapshot, now)
    }

    fn run<T>(
        &self,
        rules: &[Rule<T>],
        definition: &TargetDefinition,
        subject: &T,
        now: DateTime<Utc>,
    ) -> EvaluationResult {
        let input = RuleInput {
            definition,
            subject,
            now,
            config: &self.config,
        };
        let mut total = 0.0_f64;
        let mut signals = Vec::new();
        for rule in rules {
            if let Some(contribution) = (rule.apply)(&input) {
                if !contribution.weight.is_finite() {
                    continue;
                }
                total += contribution.weight;
                signals.push(format!("{} [{:+.2}]", contribution.label, contribution.weight));
            }
        }
        let confidence = total.clamp(0.0, 1.0);
        EvaluationResult {
            should_include: confidence >= self.config.include_threshold,
            confidence,
            signals,
        }
    }

    fn filter_matches(&self, glob: &str, name: &str) -> bool {
        if let Some(cached) = self.filters.read().get(glob) {
            return cached.as_ref().is_some_and(|re| re.is_match(name));
        }
        let compiled = compile_glob(glob).ok();
        let matched = compiled.as_ref().is_some_and(|re| re.is_match(name));
        self.filters.write().insert(glob.to_string(), compiled);
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::target::TargetCategory;
    use chrono::{Duration, TimeZone};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).single().expect("valid")
    }

    fn temp_target() -> TargetDefinition {
        TargetDefinition::new(TargetCategory::Temp, "Temporary files", "/tmp")
    }

    fn file(name: &str, size: u64, age: Duration) -> FileContext {
        let modified = now() - age;
        FileContext {
            name: name.to_string(),
            full_path: PathBuf::from("/tmp").join(name),
            extension: crate::scanner::target::extension_of(name),
            size_bytes: size,
            last_modified: modified,
            last_accessed: modified,
            created: modified,
            is_hidden: false,
            is_system: false,
            is_recently_modified: age < Duration::hours(24),
        }
    }

    fn dir(file_count: usize, temp: usize, recent: usize, age: Duration) -> DirectorySnapshot {
        DirectorySnapshot {
            full_path: PathBuf::from("/tmp/session-42"),
            name: "session-42".to_string(),
            total_size_bytes: (file_count as u64) * 1024,
            last_modified: now() - age,
            is_hidden: false,
            is_system: false,
            file_count,
            hidden_file_count: 0,
            system_file_count: 0,
            recent_file_count: recent,
            temp_file_count: temp,
            extension_counts: BTreeMap::new(),
        }
    }

    #[test]
    fn stale_temp_file_is_included() {
        let engine = ScoringEngine::default();
        let result = engine.evaluate_file(
            &temp_target(),
            &file("setup.tmp", 150 * 1024 * 1024, Duration::days(90)),
            now(),
        );
        assert!(result.should_include);
        assert!(result.confidence >= 0.55, "confidence {}", result.confidence);
        assert!(result.signals.iter().any(|s| s.contains("Temporary extension")));
        assert!(result.signals.iter().any(|s| s.contains("Stale")));
    }

    #[test]
    fn fresh_system_file_is_excluded() {
        let engine = ScoringEngine::default();
        let mut ctx = file("driver.dll", 25 * 1024 * 1024, Duration::minutes(10));
        ctx.is_system = true;
        let result = engine.evaluate_file(&temp_target(), &ctx, now());
        assert!(!result.should_include);
        assert!(result.confidence <= 0.2);
        assert!(result.signals.iter().any(|s| s.contains("System attribute")));
        assert!(result.signals.iter().any(|s| s.contains("Recently modified")));
    }

    #[test]
    fn staleness_saturates() {
        let engine = ScoringEngine::default();
        let a = engine.evaluate_file(&temp_target(), &file("a.bin", 10, Duration::days(60)), now());
        let b = engine.evaluate_file(&temp_target(), &file("a.bin", 10, Duration::days(600)), now());
        assert!((a.confidence - b.confidence).abs() < 1e-12);
    }

    #[test]
    fn staleness_is_proportional_before_saturation() {
        let engine = ScoringEngine::default();
        let young = engine.evaluate_file(&temp_target(), &file("a.bin", 10, Duration::days(10)), now());
        let older = engine.evaluate_file(&temp_target(), &file("a.bin", 10, Duration::days(30)), now());
        assert!(older.confidence > young.confidence);
    }

    #[test]
    fn filter_mismatch_excludes_with_signal() {
        let engine = ScoringEngine::default();
        let target = temp_target().with_filter("*.dmp");
        let result = engine.evaluate_file(&target, &file("keep.txt", 10, Duration::days(90)), now());
        assert!(!result.should_include);
        assert!(result.confidence.abs() < f64::EPSILON);
        assert!(result.signals[0].contains("Outside target filter"));

        let hit = engine.evaluate_file(&target, &file("app.dmp", 10, Duration::days(90)), now());
        assert!(hit.should_include);
    }

    #[test]
    fn empty_directory_is_strongly_positive() {
        let engine = ScoringEngine::default();
        let result = engine.evaluate_directory(&temp_target(), &dir(0, 0, 0, Duration::hours(1)), now());
        assert!(result.should_include);
        assert!(result.signals.iter().any(|s| s.contains("Empty directory")));
    }

    #[test]
    fn temp_ratio_is_proportional() {
        let engine = ScoringEngine::default();
        let low = engine.evaluate_directory(&temp_target(), &dir(10, 2, 0, Duration::days(1)), now());
        let high = engine.evaluate_directory(&temp_target(), &dir(10, 9, 0, Duration::days(1)), now());
        assert!(high.confidence > low.confidence);
        assert!(high.signals.iter().any(|s| s.contains("90%")));
    }

    #[test]
    fn recent_contents_pull_directory_down() {
        let engine = ScoringEngine::default();
        let quiet = engine.evaluate_directory(&temp_target(), &dir(10, 5, 0, Duration::days(30)), now());
        let busy = engine.evaluate_directory(&temp_target(), &dir(10, 5, 10, Duration::days(30)), now());
        assert!(busy.confidence < quiet.confidence);
    }

    #[test]
    fn crash_hint_boosts_confidence() {
        let engine = ScoringEngine::default();
        let mut plain = file("report.bin", 10, Duration::days(10));
        let mut crash = plain.clone();
        crash.full_path = PathBuf::from("/home/u/AppData/Local/CrashDumps/report.bin");
        plain.full_path = PathBuf::from("/home/u/Documents/report.bin");
        let a = engine.evaluate_file(&temp_target(), &plain, now());
        let b = engine.evaluate_file(&temp_target(), &crash, now());
        assert!(b.confidence > a.confidence);
        assert!(b.signals.iter().any(|s| s.contains("Crash path hint")));
    }

    #[test]
    fn future_timestamps_do_not_count_as_stale() {
        let engine = ScoringEngine::default();
        let mut ctx = file("x.bin", 10, Duration::days(0));
        ctx.last_modified = now() + Duration::days(400);
        let result = engine.evaluate_file(&temp_target(), &ctx, now());
        assert!(!result.signals.iter().any(|s| s.contains("Stale")));
    }

    #[test]
    fn threshold_is_configurable() {
        let strict = ScoringEngine::new(ScoringConfig {
            include_threshold: 0.99,
            ..ScoringConfig::default()
        });
        let result = strict.evaluate_file(
            &temp_target(),
            &file("setup.tmp", 10, Duration::days(20)),
            now(),
        );
        assert!(!result.should_include);
    }
}
