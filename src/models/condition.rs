// Data conditions - the single predicates that make up condition groups

//! # Data Conditions
//!
//! A [`DataCondition`] is one typed predicate. Its [`ConditionType`] picks the
//! handler that evaluates it (and whether that handler is fast or slow), its
//! `comparison` carries the handler-specific configuration, and its
//! `condition_result` is the value surfaced when the condition passes.
//!
//! ## Examples
//!
//! A plain threshold: `{"type": "gt", "comparison": 5, "condition_result": true}`
//!
//! A priority-producing threshold used by detectors:
//! `{"type": "gte", "comparison": 100, "condition_result": "high"}`
//!
//! A slow aggregate condition:
//! `{"type": "event_frequency_count", "comparison": {"interval": "1h", "value": 100}}`
//!
//! ## Rust Learning Notes:
//!
//! ### Untagged Enums
//! [`ConditionResult`] uses `#[serde(untagged)]`, so serde tries each variant
//! in order: `true` deserializes as `Bool`, `"high"` as `Priority`. No wrapper
//! object is needed in the JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{DataConditionGroupId, DataConditionId};
use crate::engine::registry::{ConditionHandlerRegistry, ConditionInput};
use crate::Result;

/// Every condition type the engine knows how to evaluate
///
/// The operator variants (`eq`, `gt`, ...) compare a scalar input against a
/// scalar comparison. The issue variants inspect the event and its group.
/// The frequency/session variants are *slow*: they need an aggregate query
/// and are only ever evaluated by the batch processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    // Operators
    #[serde(rename = "eq")]
    Equal,
    #[serde(rename = "ne")]
    NotEqual,
    #[serde(rename = "gt")]
    Greater,
    #[serde(rename = "gte")]
    GreaterOrEqual,
    #[serde(rename = "lt")]
    Less,
    #[serde(rename = "lte")]
    LessOrEqual,

    // Issue attribute conditions
    EveryEvent,
    FirstSeenEvent,
    RegressionEvent,
    ReappearedEvent,
    IssuePriorityEquals,
    IssuePriorityGreaterOrEqual,
    AssignedTo,
    Level,
    TaggedEvent,
    AgeComparison,
    IssueOccurrences,

    // Aggregate conditions
    EventFrequencyCount,
    EventFrequencyPercent,
    EventUniqueUserFrequencyCount,
    EventUniqueUserFrequencyPercent,
    PercentSessionsCount,
    PercentSessionsPercent,
}

impl ConditionType {
    /// Every variant, in declaration order
    pub const ALL: [ConditionType; 23] = [
        ConditionType::Equal,
        ConditionType::NotEqual,
        ConditionType::Greater,
        ConditionType::GreaterOrEqual,
        ConditionType::Less,
        ConditionType::LessOrEqual,
        ConditionType::EveryEvent,
        ConditionType::FirstSeenEvent,
        ConditionType::RegressionEvent,
        ConditionType::ReappearedEvent,
        ConditionType::IssuePriorityEquals,
        ConditionType::IssuePriorityGreaterOrEqual,
        ConditionType::AssignedTo,
        ConditionType::Level,
        ConditionType::TaggedEvent,
        ConditionType::AgeComparison,
        ConditionType::IssueOccurrences,
        ConditionType::EventFrequencyCount,
        ConditionType::EventFrequencyPercent,
        ConditionType::EventUniqueUserFrequencyCount,
        ConditionType::EventUniqueUserFrequencyPercent,
        ConditionType::PercentSessionsCount,
        ConditionType::PercentSessionsPercent,
    ];

    /// The wire name of this type, as stored in configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionType::Equal => "eq",
            ConditionType::NotEqual => "ne",
            ConditionType::Greater => "gt",
            ConditionType::GreaterOrEqual => "gte",
            ConditionType::Less => "lt",
            ConditionType::LessOrEqual => "lte",
            ConditionType::EveryEvent => "every_event",
            ConditionType::FirstSeenEvent => "first_seen_event",
            ConditionType::RegressionEvent => "regression_event",
            ConditionType::ReappearedEvent => "reappeared_event",
            ConditionType::IssuePriorityEquals => "issue_priority_equals",
            ConditionType::IssuePriorityGreaterOrEqual => "issue_priority_greater_or_equal",
            ConditionType::AssignedTo => "assigned_to",
            ConditionType::Level => "level",
            ConditionType::TaggedEvent => "tagged_event",
            ConditionType::AgeComparison => "age_comparison",
            ConditionType::IssueOccurrences => "issue_occurrences",
            ConditionType::EventFrequencyCount => "event_frequency_count",
            ConditionType::EventFrequencyPercent => "event_frequency_percent",
            ConditionType::EventUniqueUserFrequencyCount => "event_unique_user_frequency_count",
            ConditionType::EventUniqueUserFrequencyPercent => {
                "event_unique_user_frequency_percent"
            }
            ConditionType::PercentSessionsCount => "percent_sessions_count",
            ConditionType::PercentSessionsPercent => "percent_sessions_percent",
        }
    }
}

impl std::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issue/detector priority levels
///
/// The numeric values match what is persisted for issue priority
/// (25 / 50 / 75), which is also what priority comparisons are configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityLevel {
    Low,
    Medium,
    High,
}

impl PriorityLevel {
    pub fn as_i64(&self) -> i64 {
        match self {
            PriorityLevel::Low => 25,
            PriorityLevel::Medium => 50,
            PriorityLevel::High => 75,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            25 => Some(PriorityLevel::Low),
            50 => Some(PriorityLevel::Medium),
            75 => Some(PriorityLevel::High),
            _ => None,
        }
    }
}

/// The value a condition produces when it passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionResult {
    Bool(bool),
    Priority(PriorityLevel),
}

impl Default for ConditionResult {
    fn default() -> Self {
        ConditionResult::Bool(true)
    }
}

impl From<bool> for ConditionResult {
    fn from(value: bool) -> Self {
        ConditionResult::Bool(value)
    }
}

impl From<PriorityLevel> for ConditionResult {
    fn from(value: PriorityLevel) -> Self {
        ConditionResult::Priority(value)
    }
}

/// A single configured predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataCondition {
    pub id: DataConditionId,

    #[serde(rename = "type")]
    pub condition_type: ConditionType,

    /// Handler-specific configuration: a scalar for operators, a mapping for
    /// most issue and aggregate conditions
    #[serde(default)]
    pub comparison: Value,

    #[serde(default)]
    pub condition_result: ConditionResult,

    /// The group that owns this condition
    pub condition_group_id: DataConditionGroupId,
}

/// Outcome of evaluating one condition
///
/// `result` is `Some(condition_result)` exactly when `passed` is true.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionOutcome {
    pub passed: bool,
    pub result: Option<ConditionResult>,
}

impl ConditionOutcome {
    pub fn passed(result: ConditionResult) -> Self {
        Self {
            passed: true,
            result: Some(result),
        }
    }

    pub fn failed() -> Self {
        Self {
            passed: false,
            result: None,
        }
    }
}

impl DataCondition {
    pub fn new(
        id: impl Into<DataConditionId>,
        condition_group_id: impl Into<DataConditionGroupId>,
        condition_type: ConditionType,
        comparison: Value,
    ) -> Self {
        Self {
            id: id.into(),
            condition_type,
            comparison,
            condition_result: ConditionResult::default(),
            condition_group_id: condition_group_id.into(),
        }
    }

    /// Builder-style setter for the value produced on a pass
    pub fn with_result(mut self, result: impl Into<ConditionResult>) -> Self {
        self.condition_result = result.into();
        self
    }

    /// Evaluate this condition through the handler registered for its type
    ///
    /// ## Errors
    /// - `UnregisteredConditionType` if no handler exists for the type
    /// - whatever the handler reports for a malformed comparison or input
    pub fn evaluate_value(
        &self,
        registry: &ConditionHandlerRegistry,
        input: ConditionInput<'_>,
    ) -> Result<ConditionOutcome> {
        registry.evaluate(self, input)
    }
}
