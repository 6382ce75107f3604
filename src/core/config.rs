//! TOML configuration with defaults for every section.
//!
//! All scoring weights and thresholds are named, overridable values. Automation
//! settings are deliberately *not* part of this file: they are owned by a
//! [`SettingsStore`](crate::daemon::settings_store::SettingsStore) and mutated
//! only through the scheduler's apply operation.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{ReclaimError, Result};
use crate::scanner::target::{TargetCategory, TargetDefinition};

/// Environment variable that overrides the default config location.
pub const CONFIG_ENV_VAR: &str = "RECLAIM_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scoring: ScoringConfig,
    pub safety: SafetyConfig,
    pub retention: RetentionConfig,
    pub scanner: ScannerConfig,
    pub deletion: DeletionConfig,
    pub automation: AutomationConfig,
    pub logging: LoggingConfig,
    pub targets: Vec<TargetDefinition>,
}

/// Weights and thresholds of the confidence scoring rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Minimum confidence for `should_include`.
    pub include_threshold: f64,
    /// Prior granted to anything found under a cleanup target.
    pub base_confidence: f64,
    pub temp_extension_weight: f64,
    pub cache_extension_weight: f64,
    /// Age beyond which staleness starts to count.
    pub stale_after_days: u64,
    /// Age at which the staleness contribution saturates.
    pub stale_saturation_days: u64,
    pub stale_max_weight: f64,
    pub large_file_bytes: u64,
    pub large_file_weight: f64,
    pub hidden_weight: f64,
    pub system_weight: f64,
    pub recent_weight: f64,
    pub crash_hint_weight: f64,
    pub empty_directory_weight: f64,
    /// Multiplied by the temp-file ratio of a directory.
    pub temp_ratio_weight: f64,
    /// Multiplied by the recently-modified ratio of a directory (negative).
    pub recent_ratio_weight: f64,
    /// Multiplied by the hidden/system ratio of a directory (negative).
    pub protected_ratio_weight: f64,
    pub temp_extensions: Vec<String>,
    pub cache_extensions: Vec<String>,
    pub crash_path_hints: Vec<String>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            include_threshold: 0.55,
            base_confidence: 0.25,
            temp_extension_weight: 0.30,
            cache_extension_weight: 0.20,
            stale_after_days: 7,
            stale_saturation_days: 60,
            stale_max_weight: 0.30,
            large_file_bytes: 100 * 1024 * 1024,
            large_file_weight: 0.05,
            hidden_weight: -0.35,
            system_weight: -0.50,
            recent_weight: -0.45,
            crash_hint_weight: 0.15,
            empty_directory_weight: 0.50,
            temp_ratio_weight: 0.35,
            recent_ratio_weight: -0.40,
            protected_ratio_weight: -0.30,
            temp_extensions: [
                "tmp", "temp", "bak", "old", "chk", "gid", "crdownload", "part", "partial",
                "~tmp", "swp", "dmp", "mdmp", "hdmp",
            ]
            .map(String::from)
            .to_vec(),
            cache_extensions: ["cache", "log", "etl", "evtx", "wer", "blf", "trace"]
                .map(String::from)
                .to_vec(),
            crash_path_hints: [
                "crashdumps",
                "crashpad",
                "minidump",
                "livekernelreports",
                "reportqueue",
                "reportarchive",
                "crash",
                "coredump",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Extra roots the classifier treats as critical, on top of the built-in table.
    pub additional_critical_roots: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Most recent crash dumps kept per originating program.
    pub crash_dumps_to_keep: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            crash_dumps_to_keep: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub max_depth: usize,
    /// Items modified within this window are flagged "recently modified" at capture.
    pub recent_window_minutes: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_depth: 32,
            recent_window_minutes: 24 * 60,
        }
    }
}

impl ScannerConfig {
    #[must_use]
    pub const fn recent_window(&self) -> Duration {
        Duration::from_secs(self.recent_window_minutes * 60)
    }
}

/// Defaults for manual (CLI) deletion batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeletionConfig {
    pub skip_hidden: bool,
    pub skip_system: bool,
    pub skip_recent: bool,
    pub recent_threshold_minutes: u64,
    /// Where the pending-reboot queue lives.
    pub state_dir: PathBuf,
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self {
            skip_hidden: false,
            skip_system: true,
            skip_recent: true,
            recent_threshold_minutes: 24 * 60,
            state_dir: default_state_dir(),
        }
    }
}

impl DeletionConfig {
    #[must_use]
    pub const fn recent_threshold(&self) -> Duration {
        Duration::from_secs(self.recent_threshold_minutes * 60)
    }

    #[must_use]
    pub fn pending_reboot_path(&self) -> PathBuf {
        self.state_dir.join("pending-reboot.json")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    pub settings_path: PathBuf,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            settings_path: default_state_dir().join("automation.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub jsonl_path: PathBuf,
    /// SQLite audit database; `None` disables the SQLite half of the dual writer.
    pub sqlite_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let state = default_state_dir();
        Self {
            jsonl_path: state.join("audit.jsonl"),
            sqlite_path: Some(state.join("audit.sqlite3")),
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit path must exist. Otherwise `$RECLAIM_CONFIG` and then the
    /// per-user default location are tried; a missing default file yields
    /// [`Config::default`].
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ReclaimError::MissingConfig {
                    path: path.to_path_buf(),
                });
            }
            return Self::from_file(path);
        }

        if let Some(env_path) = std::env::var_os(CONFIG_ENV_VAR) {
            let path = PathBuf::from(env_path);
            if !path.exists() {
                return Err(ReclaimError::MissingConfig { path });
            }
            return Self::from_file(&path);
        }

        let default_path = Self::default_path();
        if default_path.exists() {
            Self::from_file(&default_path)
        } else {
            let config = Self::default();
            config.validate()?;
            Ok(config)
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ReclaimError::io(path, e))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// `~/.config/reclaim/config.toml`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        home_dir().join(".config").join("reclaim").join("config.toml")
    }

    /// Targets to scan; falls back to the system temp directory when none are configured.
    #[must_use]
    pub fn effective_targets(&self) -> Vec<TargetDefinition> {
        if self.targets.is_empty() {
            vec![TargetDefinition::new(
                TargetCategory::Temp,
                "Temporary files",
                std::env::temp_dir(),
            )]
        } else {
            self.targets.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.scoring;
        if !(0.0..=1.0).contains(&s.include_threshold) {
            return invalid(format!(
                "scoring.include_threshold must be within [0, 1], got {}",
                s.include_threshold
            ));
        }
        if !(0.0..=1.0).contains(&s.base_confidence) {
            return invalid(format!(
                "scoring.base_confidence must be within [0, 1], got {}",
                s.base_confidence
            ));
        }
        if s.stale_saturation_days <= s.stale_after_days {
            return invalid(format!(
                "scoring.stale_saturation_days ({}) must exceed stale_after_days ({})",
                s.stale_saturation_days, s.stale_after_days
            ));
        }
        for (name, weight) in [
            ("hidden_weight", s.hidden_weight),
            ("system_weight", s.system_weight),
            ("recent_weight", s.recent_weight),
            ("recent_ratio_weight", s.recent_ratio_weight),
            ("protected_ratio_weight", s.protected_ratio_weight),
        ] {
            if weight > 0.0 {
                return invalid(format!("scoring.{name} must not be positive, got {weight}"));
            }
        }
        if self.retention.crash_dumps_to_keep == 0 {
            return invalid("retention.crash_dumps_to_keep must be at least 1".to_string());
        }
        if self.scanner.max_depth == 0 {
            return invalid("scanner.max_depth must be at least 1".to_string());
        }
        for target in &self.targets {
            target.validate()?;
        }
        Ok(())
    }
}

fn invalid(details: String) -> Result<()> {
    Err(ReclaimError::InvalidConfig { details })
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map_or_else(|| PathBuf::from("."), PathBuf::from)
}

/// `~/.local/share/reclaim`.
#[must_use]
pub fn default_state_dir() -> PathBuf {
    home_dir().join(".local").join("share").join("reclaim")
}
