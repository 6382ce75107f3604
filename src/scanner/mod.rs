//! Scanning: targets, disk capture, safety classification, confidence scoring,
//! crash-dump retention and preview ranking.

pub mod preview;
pub mod protection;
pub mod retention;
pub mod scoring;
pub mod target;
pub mod walker;
