//! Cleanup targets and the point-in-time snapshots captured under them.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::errors::{ReclaimError, Result};

/// Category tag of a cleanup target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetCategory {
    Temp,
    Cache,
    Logs,
    CrashDumps,
    UpdateCache,
    Downloads,
    BrowserHistory,
    Other,
}

impl TargetCategory {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Temp => "temp",
            Self::Cache => "cache",
            Self::Logs => "logs",
            Self::CrashDumps => "crash-dumps",
            Self::UpdateCache => "update-cache",
            Self::Downloads => "downloads",
            Self::BrowserHistory => "browser-history",
            Self::Other => "other",
        }
    }
}

/// A named cleanup category rooted at one directory. Loaded from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDefinition {
    pub category: TargetCategory,
    pub display_name: String,
    pub root: PathBuf,
    /// Optional glob (`*`, `?`) matched case-insensitively against file names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl TargetDefinition {
    #[must_use]
    pub fn new(category: TargetCategory, display_name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            category,
            display_name: display_name.into(),
            root: root.into(),
            filter: None,
        }
    }

    #[must_use]
    pub fn with_filter(mut self, glob: impl Into<String>) -> Self {
        self.filter = Some(glob.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.display_name.trim().is_empty() {
            return Err(ReclaimError::InvalidConfig {
                details: format!("target rooted at {} has an empty display name", self.root.display()),
            });
        }
        if self.root.as_os_str().is_empty() {
            return Err(ReclaimError::InvalidConfig {
                details: format!("target {:?} has an empty root", self.display_name),
            });
        }
        if let Some(glob) = &self.filter {
            compile_glob(glob)?;
        }
        Ok(())
    }
}

/// Translate a `*`/`?` glob into an anchored, case-insensitive regex.
pub fn compile_glob(glob: &str) -> Result<Regex> {
    let mut pattern = String::with_capacity(glob.len() + 8);
    pattern.push_str("(?i)^");
    for ch in glob.chars() {
        match ch {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).map_err(|e| ReclaimError::InvalidConfig {
        details: format!("invalid target filter {glob:?}: {e}"),
    })
}

/// Snapshot of one file taken during a scan pass. Never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContext {
    pub name: String,
    pub full_path: PathBuf,
    /// Lowercased, without the leading dot. Empty when the name has none.
    pub extension: String,
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub created: DateTime<Utc>,
    pub is_hidden: bool,
    pub is_system: bool,
    /// Derived at capture time from the scanner's recent window.
    pub is_recently_modified: bool,
}

/// Aggregate metrics for one directory tree, computed once per scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    pub full_path: PathBuf,
    pub name: String,
    pub total_size_bytes: u64,
    pub last_modified: DateTime<Utc>,
    pub is_hidden: bool,
    pub is_system: bool,
    pub file_count: usize,
    pub hidden_file_count: usize,
    pub system_file_count: usize,
    pub recent_file_count: usize,
    pub temp_file_count: usize,
    pub extension_counts: BTreeMap<String, usize>,
}

impl DirectorySnapshot {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.file_count == 0 && self.total_size_bytes == 0
    }
}

/// Lowercased extension of `name`, without the dot.
#[must_use]
pub fn extension_of(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => String::new(),
    }
}
