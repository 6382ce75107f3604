//! RCL-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::deletion::model::DeletionResult;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, ReclaimError>;

/// Top-level error type for the reclamation engine.
#[derive(Debug, Error)]
pub enum ReclaimError {
    #[error("[RCL-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[RCL-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[RCL-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[RCL-1201] invalid path {path:?}: {details}")]
    InvalidPath { path: String, details: String },

    #[error("[RCL-2003] safety veto for {path}: {reason}")]
    SafetyVeto { path: PathBuf, reason: String },

    #[error("[RCL-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[RCL-2102] SQL failure in {context}: {details}")]
    Sql {
        context: &'static str,
        details: String,
    },

    #[error("[RCL-2201] settings store failure: {details}")]
    SettingsStore { details: String },

    #[error("[RCL-3001] permission denied for {path}")]
    PermissionDenied { path: PathBuf },

    #[error("[RCL-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[RCL-3003] operation cancelled: {operation}")]
    Cancelled { operation: &'static str },

    #[error(
        "[RCL-3004] deletion batch cancelled after {} of its items",
        .partial.entries.len()
    )]
    DeletionCancelled { partial: Box<DeletionResult> },

    #[error("[RCL-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl ReclaimError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "RCL-1001",
            Self::MissingConfig { .. } => "RCL-1002",
            Self::ConfigParse { .. } => "RCL-1003",
            Self::InvalidPath { .. } => "RCL-1201",
            Self::SafetyVeto { .. } => "RCL-2003",
            Self::Serialization { .. } => "RCL-2101",
            Self::Sql { .. } => "RCL-2102",
            Self::SettingsStore { .. } => "RCL-2201",
            Self::PermissionDenied { .. } => "RCL-3001",
            Self::Io { .. } => "RCL-3002",
            Self::Cancelled { .. } => "RCL-3003",
            Self::DeletionCancelled { .. } => "RCL-3004",
            Self::Runtime { .. } => "RCL-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::Sql { .. } | Self::SettingsStore { .. } | Self::Runtime { .. }
        )
    }

    /// True for both cancellation variants.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::DeletionCancelled { .. })
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for classifier precondition failures.
    #[must_use]
    pub fn invalid_path(path: impl Into<String>, details: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            details: details.into(),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for ReclaimError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for ReclaimError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for ReclaimError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<toml::ser::Error> for ReclaimError {
    fn from(value: toml::ser::Error) -> Self {
        Self::Serialization {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_embedded_in_messages() {
        let err = ReclaimError::invalid_path("", "empty path");
        assert_eq!(err.code(), "RCL-1201");
        assert!(err.to_string().starts_with("[RCL-1201]"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn cancellation_variants_are_recognized() {
        let err = ReclaimError::Cancelled {
            operation: "aggressive delete",
        };
        assert!(err.is_cancellation());
        let partial = ReclaimError::DeletionCancelled {
            partial: Box::new(DeletionResult::from_entries(Vec::new())),
        };
        assert!(partial.is_cancellation());
        assert!(partial.to_string().contains("after 0"));
    }

    #[test]
    fn io_errors_are_retryable() {
        let err = ReclaimError::io("/tmp/x", std::io::Error::other("boom"));
        assert!(err.is_retryable());
        assert_eq!(err.code(), "RCL-3002");
    }
}
