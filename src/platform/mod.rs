//! Platform capabilities: filesystem abstraction, lock inspection, prompts.

pub mod locks;
pub mod pal;
pub mod prompt;
