//! Reclamation engine: finds low-value files under known cleanup targets,
//! scores them, refuses to touch protected system paths, and deletes what is
//! selected with escalating strategies. An automation scheduler repeats the
//! preview → delete cycle unattended.
//!
//! Layout:
//! - [`scanner`]: targets, disk capture, path safety, confidence scoring,
//!   crash-dump retention, preview ranking
//! - [`deletion`]: the guarded deletion pipeline and its aggressive helper
//! - [`daemon`]: persisted automation settings and the scheduler
//! - [`platform`]: OS capabilities (attributes, ownership, recycle bin, locks)
//! - [`logger`]: structured audit events
//! - [`core`]: errors, configuration, paths, cancellation, time

#![forbid(unsafe_code)]

pub mod core;
pub mod daemon;
pub mod deletion;
pub mod logger;
pub mod platform;
pub mod scanner;

pub use crate::core::config::Config;
pub use crate::core::errors::{ReclaimError, Result};
pub use crate::deletion::model::{DeletionDisposition, DeletionEntry, DeletionOptions, DeletionResult};
pub use crate::deletion::pipeline::DeletionPipeline;
pub use crate::scanner::preview::PreviewItem;
pub use crate::scanner::protection::PathSafetyClassifier;
pub use crate::scanner::scoring::{EvaluationResult, ScoringEngine};
