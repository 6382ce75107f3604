//! Background automation: persisted settings, the settings store and the
//! single-flight scheduler.

pub mod automation;
pub mod scheduler;
pub mod settings_store;
