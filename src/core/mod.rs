pub mod capability;
pub mod config;
pub mod error;
pub mod handoff;
pub mod log;
pub mod queue;
