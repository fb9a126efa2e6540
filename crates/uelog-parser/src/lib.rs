//! Log file parsing for uelog
//!
//! This crate turns raw log file bytes into structured entries. It owns the
//! memory-mapped file view and the line classification patterns.

mod error;
mod parser;

pub use error::{LoadError, Result};
pub use parser::LogParser;

// Re-export types used in our public API
pub use uelog_types::{EntryKind, LogEntry};
