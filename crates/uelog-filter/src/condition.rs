use regex::Regex;

use uelog_types::LogEntry;

/// Field/operator pair for an ad hoc condition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConditionKind {
    MessageContains,
    MessageEquals,
    MessageRegex,
    LoggerEquals,
    LoggerContains,
    LevelEquals,
    /// Lexical string comparison, not calendar-aware
    TimestampBefore,
    TimestampAfter,
    TimestampEquals,
    FrameBefore,
    FrameAfter,
    FrameEquals,
    LineBefore,
    LineAfter,
    AnyFieldContains,
}

/// Leaf predicate of an [`Expression`]
#[derive(Clone, Debug)]
pub struct Condition {
    pub kind: ConditionKind,
    pub value: String,
    pub active: bool,
}

impl Condition {
    pub fn new(kind: ConditionKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            active: true,
        }
    }

    /// Evaluate against one entry. Inactive conditions match everything so
    /// they drop out of an AND combination; [`Expression::matches`] skips
    /// them entirely so they cannot satisfy an OR either.
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if !self.active {
            return true;
        }
        match self.kind {
            ConditionKind::MessageContains => entry.message.contains(&self.value),
            ConditionKind::MessageEquals => entry.message == self.value,
            ConditionKind::MessageRegex => Regex::new(&format!("(?i){}", self.value))
                .is_ok_and(|re| re.is_match(&entry.message)),
            ConditionKind::LoggerEquals => entry.logger == self.value,
            ConditionKind::LoggerContains => entry.logger.contains(&self.value),
            ConditionKind::LevelEquals => entry.level.as_deref() == Some(self.value.as_str()),
            ConditionKind::TimestampBefore => self.timestamp_cmp(entry, |t, v| t < v),
            ConditionKind::TimestampAfter => self.timestamp_cmp(entry, |t, v| t > v),
            ConditionKind::TimestampEquals => self.timestamp_cmp(entry, |t, v| t == v),
            ConditionKind::FrameBefore => self.frame_cmp(entry, |f, v| f < v),
            ConditionKind::FrameAfter => self.frame_cmp(entry, |f, v| f > v),
            ConditionKind::FrameEquals => self.frame_cmp(entry, |f, v| f == v),
            ConditionKind::LineBefore => self.line_cmp(entry, |l, v| l < v),
            ConditionKind::LineAfter => self.line_cmp(entry, |l, v| l > v),
            ConditionKind::AnyFieldContains => entry.any_field_contains(&self.value),
        }
    }

    fn timestamp_cmp(&self, entry: &LogEntry, cmp: fn(&str, &str) -> bool) -> bool {
        entry
            .timestamp
            .as_deref()
            .is_some_and(|t| cmp(t, &self.value))
    }

    /// Malformed integer values never match, nor do entries without a frame
    fn frame_cmp(&self, entry: &LogEntry, cmp: fn(u64, u64) -> bool) -> bool {
        match (entry.frame, self.value.trim().parse::<u64>()) {
            (Some(frame), Ok(value)) => cmp(frame, value),
            _ => false,
        }
    }

    fn line_cmp(&self, entry: &LogEntry, cmp: fn(u64, u64) -> bool) -> bool {
        self.value
            .trim()
            .parse::<u64>()
            .is_ok_and(|value| cmp(entry.line_number, value))
    }
}

/// Operator joining an expression's children
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BoolOperator {
    #[default]
    And,
    Or,
}

/// AND/OR tree over conditions and nested expressions.
///
/// Owns its children outright; there is no sharing between expressions.
#[derive(Clone, Debug)]
pub struct Expression {
    pub operator: BoolOperator,
    pub conditions: Vec<Condition>,
    pub sub_expressions: Vec<Expression>,
    pub active: bool,
}

impl Expression {
    pub fn new(operator: BoolOperator) -> Self {
        Self {
            operator,
            conditions: Vec::new(),
            sub_expressions: Vec::new(),
            active: true,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_sub_expression(mut self, expression: Expression) -> Self {
        self.sub_expressions.push(expression);
        self
    }

    /// Empty and inactive expressions match everything. Otherwise active
    /// conditions are evaluated before active sub-expressions, combined
    /// short-circuit under this expression's operator.
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if !self.active {
            return true;
        }

        let conditions = self.conditions.iter().filter(|c| c.active);
        let subs = self.sub_expressions.iter().filter(|s| s.active);

        if self.conditions.iter().all(|c| !c.active)
            && self.sub_expressions.iter().all(|s| !s.active)
        {
            return true;
        }

        match self.operator {
            BoolOperator::And => {
                conditions.map(|c| c.matches(entry)).all(|m| m)
                    && subs.map(|s| s.matches(entry)).all(|m| m)
            }
            BoolOperator::Or => {
                conditions.map(|c| c.matches(entry)).any(|m| m)
                    || subs.map(|s| s.matches(entry)).any(|m| m)
            }
        }
    }
}

impl Default for Expression {
    fn default() -> Self {
        Self::new(BoolOperator::And)
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
    fn test_message_conditions() {
        let e = entry();
        assert!(Condition::new(ConditionKind::MessageContains, "reset").matches(&e));
        assert!(Condition::new(ConditionKind::MessageEquals, "connection reset").matches(&e));
        assert!(Condition::new(ConditionKind::MessageRegex, "CONN.*RESET").matches(&e));
        assert!(!Condition::new(ConditionKind::MessageRegex, "[bad").matches(&e));
    }

    #[test]
    fn test_logger_and_level_conditions() {
        let e = entry();
        assert!(Condition::new(ConditionKind::LoggerEquals, "LogNet").matches(&e));
        assert!(Condition::new(ConditionKind::LoggerContains, "Net").matches(&e));
        assert!(Condition::new(ConditionKind::LevelEquals, "Error").matches(&e));
        assert!(!Condition::new(ConditionKind::LevelEquals, "error").matches(&e));
    }

    #[test]
    fn test_timestamp_conditions_are_lexical() {
        let e = entry();
        assert!(Condition::new(ConditionKind::TimestampBefore, "2025").matches(&e));
        assert!(Condition::new(ConditionKind::TimestampAfter, "2023").matches(&e));
        assert!(
            Condition::new(ConditionKind::TimestampEquals, "2024.01.15-10.30.00:123").matches(&e)
        );

        let mut no_ts = e.clone();
        no_ts.timestamp = None;
        assert!(!Condition::new(ConditionKind::TimestampBefore, "2025").matches(&no_ts));
    }

    #[test]
    fn test_numeric_conditions() {
        let e = entry();
        assert!(Condition::new(ConditionKind::FrameBefore, "200").matches(&e));
        assert!(Condition::new(ConditionKind::FrameAfter, "100").matches(&e));
        assert!(Condition::new(ConditionKind::FrameEquals, "150").matches(&e));
        assert!(!Condition::new(ConditionKind::FrameEquals, "abc").matches(&e));
        assert!(Condition::new(ConditionKind::LineBefore, "10").matches(&e));
        assert!(!Condition::new(ConditionKind::LineAfter, "10").matches(&e));
    }

    #[test]
    fn test_any_field_condition() {
        let e = entry();
        assert!(Condition::new(ConditionKind::AnyFieldContains, "150").matches(&e));
        assert!(!Condition::new(ConditionKind::AnyFieldContains, "nothing").matches(&e));
    }

    #[test]
    fn test_empty_expression_matches_everything() {
        let e = entry();
        assert!(Expression::new(BoolOperator::And).matches(&e));
        assert!(Expression::new(BoolOperator::Or).matches(&e));
    }

    #[test]
    fn test_inactive_expression_matches_everything() {
        let e = entry();
        let mut expr = Expression::new(BoolOperator::And)
            .with_condition(Condition::new(ConditionKind::LoggerEquals, "Nope"));
        expr.active = false;
        assert!(expr.matches(&e));
    }

    #[test]
    fn test_and_expression() {
        let e = entry();
        let expr = Expression::new(BoolOperator::And)
            .with_condition(Condition::new(ConditionKind::LoggerEquals, "LogNet"))
            .with_condition(Condition::new(ConditionKind::LevelEquals, "Error"));
        assert!(expr.matches(&e));

        let expr = expr.with_condition(Condition::new(ConditionKind::MessageContains, "absent"));
        assert!(!expr.matches(&e));
    }

    #[test]
    fn test_or_expression_with_sub_expression() {
        let e = entry();
        let sub = Expression::new(BoolOperator::And)
            .with_condition(Condition::new(ConditionKind::FrameEquals, "150"));
        let expr = Expression::new(BoolOperator::Or)
            .with_condition(Condition::new(ConditionKind::LoggerEquals, "Nope"))
            .with_sub_expression(sub);
        assert!(expr.matches(&e));
    }

    #[test]
    fn test_inactive_condition_skipped_in_or() {
        let e = entry();
        // The inactive condition would trivially be true, but it must not
        // satisfy the OR on its own
        let mut always = Condition::new(ConditionKind::LoggerEquals, "Nope");
        always.active = false;
        let expr = Expression::new(BoolOperator::Or)
            .with_condition(always)
            .with_condition(Condition::new(ConditionKind::LoggerEquals, "AlsoNope"));
        assert!(!expr.matches(&e));
    }
}
