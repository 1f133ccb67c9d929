// Data condition groups - ordered conditions combined under one logic type

//! # Data Condition Groups
//!
//! A [`DataConditionGroup`] is an ordered list of [`DataCondition`]s combined
//! under a [`LogicType`]. Workflows use one as their trigger
//! (`when_condition_group`) and actions are gated by action-filter groups.
//!
//! Order is load-bearing: `any-short` stops at the first pass and `all` stops
//! at the first failure, so the configured order decides which condition
//! results are reported.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::condition::{ConditionResult, DataCondition};
use super::ids::DataConditionGroupId;

/// How the conditions of a group combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicType {
    /// Every condition must pass
    #[serde(rename = "all")]
    All,
    /// At least one condition must pass; every condition is evaluated
    #[serde(rename = "any")]
    Any,
    /// At least one condition must pass; evaluation stops at the first pass
    #[serde(rename = "any-short")]
    AnyShortCircuit,
    /// No condition may pass
    #[serde(rename = "none")]
    None,
}

impl std::fmt::Display for LogicType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogicType::All => "all",
            LogicType::Any => "any",
            LogicType::AnyShortCircuit => "any-short",
            LogicType::None => "none",
        };
        f.write_str(name)
    }
}

/// An ordered collection of conditions under one logic type
///
/// Equality and hashing use the primary key only, the same way a persisted
/// row is identified. This lets passed groups be collected into sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConditionGroup {
    pub id: DataConditionGroupId,
    pub logic_type: LogicType,
    #[serde(default)]
    pub conditions: Vec<DataCondition>,
}

impl DataConditionGroup {
    pub fn new(id: impl Into<DataConditionGroupId>, logic_type: LogicType) -> Self {
        Self {
            id: id.into(),
            logic_type,
            conditions: Vec::new(),
        }
    }

    /// Append a condition, re-homing it into this group
    pub fn with_condition(mut self, mut condition: DataCondition) -> Self {
        condition.condition_group_id = self.id;
        self.conditions.push(condition);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

impl PartialEq for DataConditionGroup {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DataConditionGroup {}

impl Hash for DataConditionGroup {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// One passing condition and the value it produced
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionMatch {
    pub condition: DataCondition,
    pub result: ConditionResult,
}

/// Result of combining condition outcomes under a logic type
#[derive(Debug, Clone, PartialEq)]
pub struct LogicEvaluation {
    pub logic_result: bool,
    pub condition_results: Vec<ConditionMatch>,
}

impl LogicEvaluation {
    pub fn new(logic_result: bool, condition_results: Vec<ConditionMatch>) -> Self {
        Self {
            logic_result,
            condition_results,
        }
    }

    /// The produced values only, in evaluation order
    pub fn results(&self) -> Vec<ConditionResult> {
        self.condition_results.iter().map(|m| m.result).collect()
    }
}

/// A group after its evaluable conditions have been processed
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedDataConditionGroup {
    pub group_id: DataConditionGroupId,
    pub logic_type: LogicType,
    pub logic_result: bool,
    pub condition_results: Vec<ConditionMatch>,
}

impl ProcessedDataConditionGroup {
    pub fn from_evaluation(group: &DataConditionGroup, evaluation: LogicEvaluation) -> Self {
        Self {
            group_id: group.id,
            logic_type: group.logic_type,
            logic_result: evaluation.logic_result,
            condition_results: evaluation.condition_results,
        }
    }

    pub fn results(&self) -> Vec<ConditionResult> {
        self.condition_results.iter().map(|m| m.result).collect()
    }
}
