//! Deletion: options and outcomes, the verified pipeline, the aggressive
//! fallback helper, progress throttling and the pending-reboot queue.

pub mod aggressive;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod reboot;
