//! Long-running service pieces: cron trigger and signal handling.

pub mod scheduler;
pub mod shutdown;
