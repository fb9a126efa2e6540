//! Filter engine for uelog
//!
//! Two predicate representations live here: the three-state recursive
//! [`Filter`] tree evaluated by the [`FilterEngine`], and the flatter
//! [`Condition`]/[`Expression`] AND/OR tree for ad hoc query building.

mod condition;
mod engine;
mod error;
mod filter;

pub use condition::{BoolOperator, Condition, ConditionKind, Expression};
pub use engine::FilterEngine;
pub use error::{FilterError, Result};
pub use filter::{CombineLogic, Filter, FilterState, MatchKind};

// Re-export types used in our public API
pub use uelog_types::{EntryKind, LogEntry};
