use std::collections::HashMap;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{FilterError, Result};
use crate::filter::{CombineLogic, Filter, FilterState, MatchKind};
use uelog_types::LogEntry;

/// Version written into persisted filter documents
const FILTER_SET_VERSION: u32 = 1;

/// Owns the ordered list of top-level filters, evaluates them against entry
/// batches, caches compiled regexes and tracks match statistics.
#[derive(Default)]
pub struct FilterEngine {
    filters: Vec<Filter>,
    /// Engine-level cache keyed by pattern text, separate from the
    /// per-filter cached regex. Failed compiles are not cached.
    regex_cache: HashMap<String, Regex>,
    entries_processed: u64,
    matches_found: u64,
}

impl FilterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Add a top-level filter after validating it and checking its name
    /// against existing top-level filters (case-sensitive).
    pub fn add_filter(&mut self, filter: Filter) -> Result<()> {
        filter.validate()?;
        if self.filters.iter().any(|f| f.name == filter.name) {
            return Err(FilterError::DuplicateName(filter.name));
        }
        tracing::debug!(name = %filter.name, "filter added");
        self.filters.push(filter);
        Ok(())
    }

    pub fn remove_filter(&mut self, index: usize) -> Result<Filter> {
        if index >= self.filters.len() {
            return Err(FilterError::IndexOutOfRange {
                index,
                count: self.filters.len(),
            });
        }
        Ok(self.filters.remove(index))
    }

    pub fn set_filter_state(&mut self, index: usize, state: FilterState) -> Result<()> {
        let count = self.filters.len();
        let filter = self
            .filters
            .get_mut(index)
            .ok_or(FilterError::IndexOutOfRange { index, count })?;
        filter.state = state;
        Ok(())
    }

    pub fn clear_filters(&mut self) {
        self.filters.clear();
    }

    /// True when at least one top-level filter is not disabled
    pub fn has_enabled_filters(&self) -> bool {
        self.filters.iter().any(|f| f.enabled())
    }

    /// Evaluate all filters over a batch, returning passing entries in their
    /// original order. When no filter is enabled the input is returned
    /// unchanged. Updates engine counters and per-filter match counts.
    pub fn apply_filters(&mut self, entries: &[LogEntry]) -> Vec<LogEntry> {
        if !self.has_enabled_filters() {
            return entries.to_vec();
        }

        let mut matched = Vec::new();
        for entry in entries {
            self.entries_processed += 1;
            if self.passes_entry(entry) {
                self.matches_found += 1;
                matched.push(entry.clone());
            }
        }
        matched
    }

    /// Whether a single entry passes the current filter set.
    ///
    /// An entry passes when some enabled filter's effective match (which
    /// already accounts for exclude-state inversion) is true; with every
    /// filter disabled, all entries pass.
    pub fn passes_filters(&mut self, entry: &LogEntry) -> bool {
        if !self.has_enabled_filters() {
            return true;
        }
        self.passes_entry(entry)
    }

    /// Explicit exclusion query: true when some `Exclude`-state filter's
    /// underlying criteria (subtree included, inversion undone) matches the
    /// entry. Not consulted by `passes_filters`.
    pub fn should_exclude(&self, entry: &LogEntry) -> bool {
        self.filters
            .iter()
            .filter(|f| f.state == FilterState::Exclude)
            .any(|f| !f.matches(entry))
    }

    /// All enabled filters are evaluated, not just until the first hit, so
    /// per-filter match counts stay meaningful.
    fn passes_entry(&mut self, entry: &LogEntry) -> bool {
        let mut passes = false;
        for filter in &mut self.filters {
            if !filter.enabled() {
                continue;
            }
            if filter.matches(entry) {
                filter.match_count += 1;
                passes = true;
            }
        }
        passes
    }

    /// Look up a compiled case-insensitive regex, compiling and caching it
    /// on first use. Patterns that fail to compile are not cached, so later
    /// lookups retry.
    pub fn cached_regex(&mut self, pattern: &str) -> Option<&Regex> {
        if !self.regex_cache.contains_key(pattern) {
            match Regex::new(&format!("(?i){pattern}")) {
                Ok(re) => {
                    self.regex_cache.insert(pattern.to_string(), re);
                }
                Err(e) => {
                    tracing::warn!(pattern, error = %e, "regex failed to compile");
                    return None;
                }
            }
        }
        self.regex_cache.get(pattern)
    }

    pub fn entries_processed(&self) -> u64 {
        self.entries_processed
    }

    pub fn matches_found(&self) -> u64 {
        self.matches_found
    }

    /// Zero the engine counters and every filter's match count
    pub fn reset_statistics(&mut self) {
        self.entries_processed = 0;
        self.matches_found = 0;
        for filter in &mut self.filters {
            filter.reset_match_counts();
        }
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Serialize the filter set to a self-describing JSON document
    pub fn serialize_filters_to_json(&self) -> Result<String> {
        let doc = FilterSetDoc {
            version: FILTER_SET_VERSION,
            total_entries_processed: self.entries_processed,
            total_matches_found: self.matches_found,
            filters: self.filters.iter().map(FilterDoc::from_filter).collect(),
        };
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    /// Replace the filter set from a JSON document produced by
    /// [`serialize_filters_to_json`] (or an older `is_active`-style one).
    /// Unknown fields are ignored; missing fields take defaults.
    pub fn deserialize_filters_from_json(&mut self, json: &str) -> Result<()> {
        let doc: FilterSetDoc = serde_json::from_str(json)?;
        self.filters = doc.filters.into_iter().map(FilterDoc::into_filter).collect();
        self.entries_processed = doc.total_entries_processed;
        self.matches_found = doc.total_matches_found;
        tracing::debug!(count = self.filters.len(), version = doc.version, "filters loaded");
        Ok(())
    }

    pub fn save_filters(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.serialize_filters_to_json()?)?;
        Ok(())
    }

    pub fn load_filters(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let json = std::fs::read_to_string(path)?;
        self.deserialize_filters_from_json(&json)
    }
}

/// Persisted envelope: version, running statistics, filter trees
#[derive(Serialize, Deserialize)]
struct FilterSetDoc {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    total_entries_processed: u64,
    #[serde(default)]
    total_matches_found: u64,
    #[serde(default)]
    filters: Vec<FilterDoc>,
}

/// One persisted filter node.
///
/// `is_active` is derived from the state on write and only consulted on
/// read when `filter_state` is absent (older documents).
#[derive(Serialize, Deserialize)]
struct FilterDoc {
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    kind: Option<MatchKind>,
    #[serde(default)]
    criteria: String,
    #[serde(default)]
    filter_state: Option<FilterState>,
    #[serde(default)]
    is_active: Option<bool>,
    #[serde(default)]
    logic: Option<CombineLogic>,
    #[serde(default)]
    highlight_color: Option<String>,
    #[serde(default)]
    match_count: u64,
    #[serde(default)]
    sub_filters: Vec<FilterDoc>,
}

impl FilterDoc {
    fn from_filter(filter: &Filter) -> Self {
        Self {
            name: filter.name.clone(),
            kind: Some(filter.match_kind),
            criteria: filter.criteria.clone(),
            filter_state: Some(filter.state),
            is_active: Some(filter.enabled()),
            logic: Some(filter.logic),
            highlight_color: filter.highlight_color.clone(),
            match_count: filter.match_count,
            sub_filters: filter.children.iter().map(FilterDoc::from_filter).collect(),
        }
    }

    fn into_filter(self) -> Filter {
        let state = match (self.filter_state, self.is_active) {
            (Some(state), _) => state,
            (None, Some(true)) => FilterState::Include,
            (None, Some(false)) => FilterState::Disabled,
            (None, None) => FilterState::Include,
        };

        let mut filter = Filter::new(
            self.name,
            self.kind.unwrap_or(MatchKind::TextContains),
            self.criteria,
        )
        .with_state(state)
        .with_logic(self.logic.unwrap_or_default());
        filter.highlight_color = self.highlight_color;
        filter.match_count = self.match_count;
        filter.children = self.sub_filters.into_iter().map(FilterDoc::into_filter).collect();
        filter
    }
}
