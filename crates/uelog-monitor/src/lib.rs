//! File tailing for uelog
//!
//! This crate watches one log file for growth on a background polling task
//! and delivers newly appended lines to a registered callback.

mod error;
mod monitor;

pub use error::{MonitorError, Result};
pub use monitor::{check_file_exists, FileMonitor, LineCallback, MonitorStats};

// Re-export types used in our public API
pub use uelog_types::MonitorStatus;
