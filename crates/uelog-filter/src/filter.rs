use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{FilterError, Result};
use uelog_types::LogEntry;

/// What an individual filter node matches against
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchKind {
    /// Raw substring match on the entry's source text, case-sensitive
    TextContains,
    /// Full equality against the entry's source text
    TextExact,
    /// Case-insensitive regex over the entry's source text
    TextRegex,
    /// Exact logger category match
    LoggerName,
    /// Exact verbosity match; entries without a level never match
    LogLevel,
    /// Substring containment on the timestamp string
    TimeRange,
    /// Single frame number or a `min-max` range
    FrameRange,
}

/// Three-state participation of a filter in matching
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FilterState {
    #[default]
    Include,
    Exclude,
    /// The filter and its entire subtree are skipped
    Disabled,
}

/// How a node combines its own result with its children's
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CombineLogic {
    #[default]
    And,
    Or,
}

/// A recursively composable three-state predicate over log entries
///
/// A filter strictly owns its children; dropping a filter drops the subtree.
#[derive(Clone, Debug)]
pub struct Filter {
    pub name: String,
    pub match_kind: MatchKind,
    pub criteria: String,
    pub state: FilterState,
    pub logic: CombineLogic,
    pub highlight_color: Option<String>,
    pub children: Vec<Filter>,
    pub match_count: u64,

    /// Lazily compiled regex for `TextRegex` criteria. A failed compile is
    /// cached as `None` and never retried.
    cached_regex: OnceLock<Option<Regex>>,
}

impl Filter {
    pub fn new(name: impl Into<String>, match_kind: MatchKind, criteria: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            match_kind,
            criteria: criteria.into(),
            state: FilterState::Include,
            logic: CombineLogic::And,
            highlight_color: None,
            children: Vec::new(),
            match_count: 0,
            cached_regex: OnceLock::new(),
        }
    }

    pub fn with_state(mut self, state: FilterState) -> Self {
        self.state = state;
        self
    }

    pub fn with_logic(mut self, logic: CombineLogic) -> Self {
        self.logic = logic;
        self
    }

    pub fn with_child(mut self, child: Filter) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_highlight_color(mut self, color: impl Into<String>) -> Self {
        self.highlight_color = Some(color.into());
        self
    }

    /// Whether this filter participates in matching
    pub fn enabled(&self) -> bool {
        self.state != FilterState::Disabled
    }

    /// Structural validation: non-empty name and criteria, and a criteria
    /// string that compiles when the kind is `TextRegex`.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(FilterError::EmptyName);
        }
        if self.criteria.is_empty() {
            return Err(FilterError::EmptyCriteria);
        }
        if self.match_kind == MatchKind::TextRegex {
            Regex::new(&format!("(?i){}", self.criteria)).map_err(|e| {
                FilterError::InvalidRegex {
                    pattern: self.criteria.clone(),
                    source: e,
                }
            })?;
        }
        Ok(())
    }

    /// Effective match result for an entry.
    ///
    /// Disabled filters never match. Otherwise the node's own leaf result is
    /// combined with the children's combined result using this node's logic
    /// (disabled children are skipped entirely), and an `Exclude` state
    /// inverts the final boolean.
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if !self.enabled() {
            return false;
        }

        let leaf = self.matches_internal(entry);
        let mut enabled_children = self.children.iter().filter(|c| c.enabled()).peekable();

        let combined = if enabled_children.peek().is_none() {
            leaf
        } else {
            match self.logic {
                CombineLogic::And => leaf && enabled_children.all(|c| c.matches(entry)),
                CombineLogic::Or => leaf || enabled_children.any(|c| c.matches(entry)),
            }
        };

        if self.state == FilterState::Exclude {
            !combined
        } else {
            combined
        }
    }

    /// Leaf match, ignoring state, children and exclude inversion
    pub fn matches_internal(&self, entry: &LogEntry) -> bool {
        match self.match_kind {
            MatchKind::TextContains => entry.raw_text.contains(&self.criteria),
            MatchKind::TextExact => entry.raw_text == self.criteria,
            MatchKind::TextRegex => self
                .cached_regex()
                .is_some_and(|re| re.is_match(&entry.raw_text)),
            MatchKind::LoggerName => entry.logger == self.criteria,
            MatchKind::LogLevel => entry.level.as_deref() == Some(self.criteria.as_str()),
            MatchKind::TimeRange => entry
                .timestamp
                .as_deref()
                .is_some_and(|t| t.contains(&self.criteria)),
            MatchKind::FrameRange => frame_in_range(entry.frame, &self.criteria),
        }
    }

    /// Reset match statistics for this node and its subtree
    pub fn reset_match_counts(&mut self) {
        self.match_count = 0;
        for child in &mut self.children {
            child.reset_match_counts();
        }
    }

    fn cached_regex(&self) -> Option<&Regex> {
        self.cached_regex
            .get_or_init(|| Regex::new(&format!("(?i){}", self.criteria)).ok())
            .as_ref()
    }
}

/// Match a frame number against a `N` or `min-max` criteria string.
/// Malformed criteria and absent frames never match.
fn frame_in_range(frame: Option<u64>, criteria: &str) -> bool {
    let Some(frame) = frame else {
        return false;
    };
    match criteria.split_once('-') {
        Some((min, max)) => match (min.trim().parse::<u64>(), max.trim().parse::<u64>()) {
            (Ok(min), Ok(max)) => frame >= min && frame <= max,
            _ => false,
        },
        None => criteria.trim().parse::<u64>().is_ok_and(|v| v == frame),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uelog_types::{EntryKind, LogEntry};

    fn entry() -> LogEntry {
        LogEntry {
            kind: EntryKind::Structured,
            timestamp: Some("2024.01.15-10.30.00:123".to_string()),
            frame: Some(150),
            logger: "LogNet".to_string(),
            level: Some("Error".to_string()),
            message: "connection reset".to_string(),
            raw_text: "[2024.01.15-10.30.00:123][150]LogNet: Error: connection reset".to_string(),
            line_number: 5,
        }
    }

    #[test]
    fn test_text_matchers() {
        let e = entry();
        assert!(Filter::new("c", MatchKind::TextContains, "connection").matches(&e));
        assert!(!Filter::new("c", MatchKind::TextContains, "CONNECTION").matches(&e));
        assert!(Filter::new("x", MatchKind::TextExact, e.raw_text.clone()).matches(&e));
        assert!(!Filter::new("x", MatchKind::TextExact, "connection reset").matches(&e));
    }

    #[test]
    fn test_regex_is_case_insensitive() {
        let e = entry();
        assert!(Filter::new("r", MatchKind::TextRegex, "CONNECTION\\s+RESET").matches(&e));
    }

    #[test]
    fn test_invalid_regex_never_matches() {
        let e = entry();
        let filter = Filter::new("bad", MatchKind::TextRegex, "[unclosed");
        assert!(!filter.matches(&e));
        // Cached failure, still no match on retry
        assert!(!filter.matches(&e));
    }

    #[test]
    fn test_logger_and_level_matchers() {
        let e = entry();
        assert!(Filter::new("l", MatchKind::LoggerName, "LogNet").matches(&e));
        assert!(!Filter::new("l", MatchKind::LoggerName, "LogTemp").matches(&e));
        assert!(Filter::new("v", MatchKind::LogLevel, "Error").matches(&e));

        let mut no_level = e.clone();
        no_level.level = None;
        assert!(!Filter::new("v", MatchKind::LogLevel, "Error").matches(&no_level));
    }

    #[test]
    fn test_time_range_is_substring() {
        let e = entry();
        assert!(Filter::new("t", MatchKind::TimeRange, "10.30").matches(&e));
        assert!(!Filter::new("t", MatchKind::TimeRange, "11.00").matches(&e));
    }

    #[test]
    fn test_frame_range() {
        let e = entry();
        assert!(Filter::new("f", MatchKind::FrameRange, "100-200").matches(&e));
        assert!(Filter::new("f", MatchKind::FrameRange, "150").matches(&e));
        assert!(!Filter::new("f", MatchKind::FrameRange, "0-99").matches(&e));
        assert!(!Filter::new("f", MatchKind::FrameRange, "201-300").matches(&e));
        assert!(!Filter::new("f", MatchKind::FrameRange, "abc").matches(&e));

        let mut no_frame = e.clone();
        no_frame.frame = None;
        assert!(!Filter::new("f", MatchKind::FrameRange, "100-200").matches(&no_frame));
    }

    #[test]
    fn test_exclude_inverts_leaf() {
        let e = entry();
        for criteria in ["connection", "absent"] {
            let include = Filter::new("i", MatchKind::TextContains, criteria);
            let exclude = include.clone().with_state(FilterState::Exclude);
            assert_eq!(exclude.matches(&e), !include.matches_internal(&e));
        }
    }

    #[test]
    fn test_disabled_never_matches() {
        let e = entry();
        let filter =
            Filter::new("d", MatchKind::TextContains, "connection").with_state(FilterState::Disabled);
        assert!(!filter.matches(&e));
    }

    #[test]
    fn test_children_combined_with_and() {
        let e = entry();
        let filter = Filter::new("parent", MatchKind::LoggerName, "LogNet")
            .with_child(Filter::new("child", MatchKind::LogLevel, "Error"));
        assert!(filter.matches(&e));

        let filter = Filter::new("parent", MatchKind::LoggerName, "LogNet")
            .with_child(Filter::new("child", MatchKind::LogLevel, "Warning"));
        assert!(!filter.matches(&e));
    }

    #[test]
    fn test_children_combined_with_or() {
        let e = entry();
        let filter = Filter::new("parent", MatchKind::LoggerName, "LogOther")
            .with_logic(CombineLogic::Or)
            .with_child(Filter::new("child", MatchKind::LogLevel, "Error"));
        assert!(filter.matches(&e));
    }

    #[test]
    fn test_disabled_child_skipped() {
        let e = entry();
        // The failing child would sink the AND, but it is disabled
        let filter = Filter::new("parent", MatchKind::LoggerName, "LogNet").with_child(
            Filter::new("child", MatchKind::LogLevel, "Warning").with_state(FilterState::Disabled),
        );
        assert!(filter.matches(&e));
    }

    #[test]
    fn test_validate() {
        assert!(matches!(
            Filter::new("", MatchKind::TextContains, "x").validate(),
            Err(FilterError::EmptyName)
        ));
        assert!(matches!(
            Filter::new("n", MatchKind::TextContains, "").validate(),
            Err(FilterError::EmptyCriteria)
        ));
        assert!(matches!(
            Filter::new("n", MatchKind::TextRegex, "[unclosed").validate(),
            Err(FilterError::InvalidRegex { .. })
        ));
        assert!(Filter::new("n", MatchKind::TextRegex, "ok.*").validate().is_ok());
    }
}
