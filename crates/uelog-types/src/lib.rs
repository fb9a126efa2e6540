//! Shared types for uelog
//!
//! This crate contains data structures used across multiple uelog crates.

// ============================================================================
// Log Entry Types
// ============================================================================

/// How much structure a log line carried
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// `[timestamp][frame]Logger: Level: message`
    Structured,
    /// `[timestamp][frame]Logger: message` (no level segment)
    SemiStructured,
    /// `Logger: Level: message` or anything less
    Unstructured,
}

impl EntryKind {
    /// Short display label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structured => "structured",
            Self::SemiStructured => "semi-structured",
            Self::Unstructured => "unstructured",
        }
    }
}

/// One parsed logical log record, possibly spanning multiple physical lines
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    /// Which line shape produced this entry
    pub kind: EntryKind,

    /// Timestamp segment, verbatim (e.g. "2024.01.15-10.30.00:123")
    pub timestamp: Option<String>,

    /// Frame counter from the second bracket group
    pub frame: Option<u64>,

    /// Logger category (e.g. "LogTemp")
    pub logger: String,

    /// Verbosity segment (e.g. "Warning"), absent for semi-structured lines
    pub level: Option<String>,

    /// Message body; continuation lines are joined with '\n'
    pub message: String,

    /// Original source text, all physical lines joined with '\n'
    pub raw_text: String,

    /// Index of the first physical line of this entry
    pub line_number: u64,
}

impl LogEntry {
    /// Create an unstructured entry with minimal fields
    pub fn unstructured(logger: String, message: String, raw_text: String, line_number: u64) -> Self {
        Self {
            kind: EntryKind::Unstructured,
            timestamp: None,
            frame: None,
            logger,
            level: None,
            message,
            raw_text,
            line_number,
        }
    }

    /// An entry is valid when logger, message and raw text are all present
    pub fn is_valid(&self) -> bool {
        !self.logger.is_empty() && !self.message.is_empty() && !self.raw_text.is_empty()
    }

    /// Merge a continuation line into this entry's message and raw text
    pub fn append_continuation(&mut self, line: &str) {
        self.message.push('\n');
        self.message.push_str(line);
        self.raw_text.push('\n');
        self.raw_text.push_str(line);
    }

    /// Check whether any populated field contains the given text
    pub fn any_field_contains(&self, needle: &str) -> bool {
        self.logger.contains(needle)
            || self.message.contains(needle)
            || self.raw_text.contains(needle)
            || self.timestamp.as_deref().is_some_and(|t| t.contains(needle))
            || self.level.as_deref().is_some_and(|l| l.contains(needle))
            || self
                .frame
                .is_some_and(|f| f.to_string().contains(needle))
    }
}

// ============================================================================
// Monitor Types
// ============================================================================

/// Lifecycle state of a file monitor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MonitorStatus {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

impl MonitorStatus {
    /// Display label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Error => "error",
        }
    }

    /// Encode for atomic storage
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::Starting => 1,
            Self::Running => 2,
            Self::Stopping => 3,
            Self::Error => 4,
        }
    }

    /// Decode from atomic storage; unknown values map to Error
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Stopped,
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Error,
        }
    }
}
