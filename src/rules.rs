//! Activation rules: time windows and externally-evaluated conditions.
//!
//! The activation gate decides whether a region is currently eligible for
//! event purposes. Time rules are evaluated here from the fix timestamp;
//! conditional rules carry a closed kind/operator/value shape but their
//! truth is delegated to an injected [`ConditionEvaluator`] — the core only
//! enforces the AND-combination across active rules.

use crate::error::{PerimeterError, Result};
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

pub const MINUTES_PER_DAY: u16 = 1_440;

/// Set of weekdays as a 7-bit mask; bit 0 is Monday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DaySet(u8);

impl DaySet {
    pub const MONDAY: u8 = 0;
    pub const TUESDAY: u8 = 1;
    pub const WEDNESDAY: u8 = 2;
    pub const THURSDAY: u8 = 3;
    pub const FRIDAY: u8 = 4;
    pub const SATURDAY: u8 = 5;
    pub const SUNDAY: u8 = 6;

    /// Every day of the week.
    pub fn all() -> Self {
        Self(0b0111_1111)
    }

    /// Monday through Friday.
    pub fn weekdays() -> Self {
        Self(0b0001_1111)
    }

    /// A set from day indexes 0-6 (0 = Monday). Out-of-range days are
    /// ignored.
    pub fn of(days: &[u8]) -> Self {
        let mut mask = 0u8;
        for &day in days {
            if day < 7 {
                mask |= 1 << day;
            }
        }
        Self(mask)
    }

    pub fn contains(&self, day: u8) -> bool {
        day < 7 && self.0 & (1 << day) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl Default for DaySet {
    fn default() -> Self {
        Self::all()
    }
}

/// A time-window activation rule.
///
/// The window is half-open in minutes of the day: `[start, end)`. When
/// `start > end` the window wraps past midnight; the day check applies to
/// the current day of the timestamp, not the day the window opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRule {
    pub start_minute: u16,
    pub end_minute: u16,
    #[serde(default)]
    pub days: DaySet,
    #[serde(default = "TimeRule::default_active")]
    pub active: bool,
}

impl TimeRule {
    const fn default_active() -> bool {
        true
    }

    /// Create a rule for `[start, end)` minutes of the day, every day.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if either bound is 1440 or more.
    pub fn window(start_minute: u16, end_minute: u16) -> Result<Self> {
        if start_minute >= MINUTES_PER_DAY || end_minute >= MINUTES_PER_DAY {
            return Err(PerimeterError::InvalidInput(format!(
                "time rule minutes must be < {MINUTES_PER_DAY}: [{start_minute}, {end_minute})"
            )));
        }
        Ok(Self {
            start_minute,
            end_minute,
            days: DaySet::all(),
            active: true,
        })
    }

    /// Restrict the rule to specific days.
    pub fn on_days(mut self, days: DaySet) -> Self {
        self.days = days;
        self
    }

    /// Enable or disable the rule without removing it.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Whether this rule matches the given timestamp.
    pub fn matches(&self, at: SystemTime) -> bool {
        if !self.active {
            return false;
        }

        let dt: DateTime<Utc> = at.into();
        let day = dt.weekday().num_days_from_monday() as u8;
        if !self.days.contains(day) {
            return false;
        }

        let minute = (dt.hour() * 60 + dt.minute()) as u16;
        if self.start_minute <= self.end_minute {
            minute >= self.start_minute && minute < self.end_minute
        } else {
            // Overnight window, e.g. 23:00-02:00.
            minute >= self.start_minute || minute < self.end_minute
        }
    }
}

/// Kind of external condition a rule refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    Weather,
    Traffic,
    Custom,
}

/// Comparison operator for a conditional rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOperator {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Typed comparison value for a conditional rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleValue {
    Number(f64),
    Text(String),
    Flag(bool),
}

/// A conditional activation rule, evaluated externally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalRule {
    pub kind: ConditionKind,
    pub operator: RuleOperator,
    pub value: RuleValue,
    #[serde(default = "ConditionalRule::default_active")]
    pub active: bool,
}

impl ConditionalRule {
    const fn default_active() -> bool {
        true
    }

    pub fn new(kind: ConditionKind, operator: RuleOperator, value: RuleValue) -> Self {
        Self {
            kind,
            operator,
            value,
            active: true,
        }
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// Supplies the truth of conditional rules at evaluation time.
///
/// The engine never interprets rule kinds or values itself; weather,
/// traffic, and custom conditions live with the host application.
pub trait ConditionEvaluator: Send + Sync {
    fn holds(&self, region_id: &str, rule: &ConditionalRule) -> bool;
}

/// Default evaluator: every conditional rule holds.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysHolds;

impl ConditionEvaluator for AlwaysHolds {
    fn holds(&self, _region_id: &str, _rule: &ConditionalRule) -> bool {
        true
    }
}

/// Time eligibility: ANY active rule matching, or no active rules at all.
pub fn is_time_eligible(rules: &[TimeRule], at: SystemTime) -> bool {
    if !rules.iter().any(|r| r.active) {
        return true;
    }
    rules.iter().any(|r| r.matches(at))
}

/// Full activation gate: time-eligible AND all active conditional rules
/// hold per the evaluator.
pub fn gate_eligible(
    region_id: &str,
    time_rules: &[TimeRule],
    conditional_rules: &[ConditionalRule],
    at: SystemTime,
    evaluator: &dyn ConditionEvaluator,
) -> bool {
    if !is_time_eligible(time_rules, at) {
        return false;
    }

    conditional_rules
        .iter()
        .filter(|r| r.active)
        .all(|r| evaluator.holds(region_id, r))
}
