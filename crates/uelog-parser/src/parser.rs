use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use memmap2::{Mmap, MmapOptions};
use regex::Regex;

use crate::error::{LoadError, Result};
use uelog_types::{EntryKind, LogEntry};

/// `[timestamp][frame]Logger: Level: message`
static STRUCTURED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[([^\]]*)\]\[\s*(\d+)\s*\](\w+): (\w+): (.*)$").expect("structured pattern")
});

/// `[timestamp][frame]Logger: message` (no level segment)
static SEMI_STRUCTURED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[([^\]]*)\]\[\s*(\d+)\s*\](\w+): (.*)$").expect("semi-structured pattern")
});

/// `Logger: Level: message` with no bracketed prefix
static UNSTRUCTURED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+): (\w+): (.*)$").expect("unstructured pattern"));

/// Leading `[...][...]` shape that starts a new logical entry
static HEADER_SHAPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[[^\]]*\]\[[^\]]*\]").expect("header shape pattern"));

/// Parser for Unreal Engine-style log files
///
/// Owns a memory-mapped view of the loaded file plus the running list of
/// entries produced so far. Repeated `parse_entries` calls resume at the
/// line counter left by the previous call, so incremental re-parses of a
/// growing file keep line numbers stable.
pub struct LogParser {
    path: Option<PathBuf>,
    /// `None` either when nothing is loaded or when the loaded file is empty
    /// (zero-length files cannot be mapped).
    mmap: Option<Mmap>,
    entries: Vec<LogEntry>,
    next_line_number: u64,
}

impl LogParser {
    pub fn new() -> Self {
        Self {
            path: None,
            mmap: None,
            entries: Vec::new(),
            next_line_number: 0,
        }
    }

    /// Map the file at `path` and reset all parser state.
    ///
    /// On failure no prior mapping survives; the parser is left unloaded.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();

        // Release any previous mapping before touching the new file
        self.unload();

        let metadata = match std::fs::metadata(&path) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(LoadError::FileNotFound(path));
            }
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                return Err(LoadError::AccessDenied(path));
            }
            Err(e) => return Err(LoadError::Io(e)),
        };
        if !metadata.is_file() {
            return Err(LoadError::NotAFile(path));
        }

        // Zero-length files are valid input but cannot be mapped
        if metadata.len() > 0 {
            let file = match File::open(&path) {
                Ok(f) => f,
                Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                    return Err(LoadError::AccessDenied(path));
                }
                Err(e) => return Err(LoadError::Io(e)),
            };
            let mmap = unsafe {
                MmapOptions::new()
                    .map(&file)
                    .map_err(|e| LoadError::MemoryMap {
                        path: path.clone(),
                        source: e,
                    })?
            };
            self.mmap = Some(mmap);
        }

        tracing::debug!(file = %path.display(), size = metadata.len(), "log file mapped");
        self.path = Some(path);
        Ok(())
    }

    /// Release the mapped view and reset all counters.
    ///
    /// Safe to call when nothing is loaded.
    pub fn unload(&mut self) {
        self.mmap = None;
        self.path = None;
        self.entries.clear();
        self.next_line_number = 0;
    }

    pub fn is_loaded(&self) -> bool {
        self.path.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Entries accumulated by all `parse_entries` calls since the last load
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Parse the mapped region from `start_offset` (a byte offset) onward,
    /// grouping physical lines into logical entries.
    ///
    /// New entries are appended to the internal list and also returned, so
    /// callers can process just the increment. Returns an empty vector when
    /// no file is loaded.
    pub fn parse_entries(&mut self, start_offset: usize) -> Vec<LogEntry> {
        let data = self.data();
        if data.is_empty() || start_offset >= data.len() {
            return Vec::new();
        }

        let text = String::from_utf8_lossy(&data[start_offset..]).into_owned();
        let mut new_entries: Vec<LogEntry> = Vec::new();
        let mut current: Option<LogEntry> = None;

        // A trailing newline produces an empty final segment, not a line
        let mut segments: Vec<&str> = text.split('\n').collect();
        if segments.last() == Some(&"") {
            segments.pop();
        }

        for raw_line in segments {
            let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
            let line_number = self.next_line_number;
            self.next_line_number += 1;

            // Blank lines neither start nor extend an entry
            if line.trim().is_empty() {
                continue;
            }

            if Self::is_entry_header(line) {
                if let Some(entry) = current.take() {
                    new_entries.push(entry);
                }
                current = Some(classify_line(line, line_number));
                continue;
            }

            // Lines without a bracketed header merge into a header-started
            // entry even when they would parse as standalone unstructured
            // entries. Unstructured entries do not absorb later classifiable
            // lines, only genuine continuation text.
            let merge = match &current {
                Some(entry) => entry.kind != EntryKind::Unstructured || !is_classifiable(line),
                None => false,
            };
            if merge {
                if let Some(entry) = current.as_mut() {
                    entry.append_continuation(line);
                }
            } else {
                if let Some(entry) = current.take() {
                    new_entries.push(entry);
                }
                current = Some(classify_line(line, line_number));
            }
        }

        if let Some(entry) = current.take() {
            new_entries.push(entry);
        }

        tracing::debug!(count = new_entries.len(), start_offset, "parsed entries");
        self.entries.extend(new_entries.iter().cloned());
        new_entries
    }

    /// Whether a line carries the bracketed `[...][...]` prefix that starts
    /// a new logical entry. Tail callers use this to decide between parsing
    /// a delivered line standalone and merging it into their last entry.
    pub fn is_entry_header(line: &str) -> bool {
        HEADER_SHAPE_RE.is_match(line)
    }

    /// Classify and parse exactly one physical line in isolation.
    ///
    /// Used for live-tailed lines, which arrive as discrete new lines;
    /// continuation merging for tailed input is the caller's concern.
    pub fn parse_single_entry(line: &str, line_number: u64) -> LogEntry {
        let line = line.strip_suffix('\r').unwrap_or(line);
        classify_line(line, line_number)
    }

    /// Count physical lines in the mapped file: one per `\n`, plus one if
    /// the file ends with content not terminated by a newline.
    pub fn total_line_count(&self) -> u64 {
        let data = self.data();
        let newlines = data.iter().filter(|&&b| b == b'\n').count() as u64;
        match data.last() {
            Some(&b) if b != b'\n' => newlines + 1,
            _ => newlines,
        }
    }

    fn data(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }
}

impl Default for LogParser {
    fn default() -> Self {
        Self::new()
    }
}

/// A line is eligible for classification when it is non-empty, longer than
/// three characters and contains at least one colon.
fn is_classifiable(line: &str) -> bool {
    !line.is_empty() && line.len() > 3 && line.contains(':')
}

/// Run the classification cascade over one physical line.
///
/// Patterns are tried from most to least structured; a line that defeats
/// all three falls back to a first-colon split.
fn classify_line(line: &str, line_number: u64) -> LogEntry {
    if is_classifiable(line) {
        if let Some(caps) = STRUCTURED_RE.captures(line) {
            return LogEntry {
                kind: EntryKind::Structured,
                timestamp: Some(caps[1].to_string()),
                frame: caps[2].parse().ok(),
                logger: caps[3].to_string(),
                level: Some(caps[4].to_string()),
                message: caps[5].to_string(),
                raw_text: line.to_string(),
                line_number,
            };
        }
        if let Some(caps) = SEMI_STRUCTURED_RE.captures(line) {
            return LogEntry {
                kind: EntryKind::SemiStructured,
                timestamp: Some(caps[1].to_string()),
                frame: caps[2].parse().ok(),
                logger: caps[3].to_string(),
                level: None,
                message: caps[4].to_string(),
                raw_text: line.to_string(),
                line_number,
            };
        }
        if let Some(caps) = UNSTRUCTURED_RE.captures(line) {
            let mut entry = LogEntry::unstructured(
                caps[1].to_string(),
                caps[3].to_string(),
                line.to_string(),
                line_number,
            );
            entry.level = Some(caps[2].to_string());
            return entry;
        }
    }
    fallback_entry(line, line_number)
}

/// Split on the first colon; no colon means the logger is unknown.
fn fallback_entry(line: &str, line_number: u64) -> LogEntry {
    match line.split_once(':') {
        Some((logger, rest)) => LogEntry::unstructured(
            logger.to_string(),
            rest.trim_start().to_string(),
            line.to_string(),
            line_number,
        ),
        None => LogEntry::unstructured(
            "Unknown".to_string(),
            line.to_string(),
            line.to_string(),
            line_number,
        ),
    }
}
