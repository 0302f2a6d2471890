//! Shared utilities for txbot.

pub mod logging;
pub mod stats;

pub use logging::{init_logging, LogFormat};
pub use stats::CallCounter;
