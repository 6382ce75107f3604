//! Core building blocks: errors, configuration, paths, cancellation, clock.

pub mod cancel;
pub mod clock;
pub mod config;
pub mod errors;
pub mod paths;
pub mod units;
