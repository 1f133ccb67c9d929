// Issue attribute conditions - evaluated against the event and its group

//! Handlers in this module need an event context. Handed a raw value they
//! report [`HandlerError::RequiresEvent`].
//!
//! Conditions on per-event data (state transitions, level, tags) never pass
//! for an activity. Conditions on the issue group itself (priority, assignee,
//! age, occurrence count) apply to both kinds of input.

use chrono::Duration;
use serde::Deserialize;
use serde_json::Value;

use super::{expect_bool, parse_comparison};
use crate::engine::registry::{ConditionHandler, ConditionInput, HandlerError, HandlerResult};
use crate::models::{Assignee, GroupEvent, PriorityLevel, WorkflowEventContext};

fn event_context<'a>(input: &ConditionInput<'a>) -> HandlerResult<WorkflowEventContext<'a>> {
    input.event().ok_or(HandlerError::RequiresEvent)
}

fn group_event<'a>(input: &ConditionInput<'a>) -> HandlerResult<Option<&'a GroupEvent>> {
    Ok(event_context(input)?.event.as_group_event())
}

/// Passes for every event
#[derive(Debug, Clone, Copy)]
pub struct EveryEventHandler;

impl ConditionHandler for EveryEventHandler {
    fn validate_comparison(&self, comparison: &Value) -> HandlerResult<()> {
        expect_bool(comparison).map(|_| ())
    }

    fn evaluate(&self, input: ConditionInput<'_>, _comparison: &Value) -> HandlerResult<bool> {
        event_context(&input).map(|_| true)
    }
}

/// Whether the group was just created
///
/// When the workflow is scoped to an environment, "new" means the first event
/// of the group in that environment.
#[derive(Debug, Clone, Copy)]
pub struct FirstSeenEventHandler;

impl ConditionHandler for FirstSeenEventHandler {
    fn validate_comparison(&self, comparison: &Value) -> HandlerResult<()> {
        expect_bool(comparison).map(|_| ())
    }

    fn evaluate(&self, input: ConditionInput<'_>, comparison: &Value) -> HandlerResult<bool> {
        let expected = expect_bool(comparison)?;
        let ctx = event_context(&input)?;
        let Some(event) = ctx.event.as_group_event() else {
            return Ok(false);
        };

        let is_new = if ctx.workflow_env.is_some() {
            event.group_state.is_new_group_environment
        } else {
            event.group_state.is_new
        };
        Ok(is_new == expected)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RegressionEventHandler;

impl ConditionHandler for RegressionEventHandler {
    fn validate_comparison(&self, comparison: &Value) -> HandlerResult<()> {
        expect_bool(comparison).map(|_| ())
    }

    fn evaluate(&self, input: ConditionInput<'_>, comparison: &Value) -> HandlerResult<bool> {
        let expected = expect_bool(comparison)?;
        Ok(group_event(&input)?
            .map(|event| event.group_state.is_regression == expected)
            .unwrap_or(false))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReappearedEventHandler;

impl ConditionHandler for ReappearedEventHandler {
    fn validate_comparison(&self, comparison: &Value) -> HandlerResult<()> {
        expect_bool(comparison).map(|_| ())
    }

    fn evaluate(&self, input: ConditionInput<'_>, comparison: &Value) -> HandlerResult<bool> {
        let expected = expect_bool(comparison)?;
        Ok(group_event(&input)?
            .map(|event| event.has_reappeared == expected)
            .unwrap_or(false))
    }
}

/// Compares the group's priority with a stored priority value (25/50/75)
#[derive(Debug, Clone, Copy)]
pub struct IssuePriorityHandler {
    at_least: bool,
}

impl IssuePriorityHandler {
    pub fn equals() -> Self {
        Self { at_least: false }
    }

    pub fn at_least() -> Self {
        Self { at_least: true }
    }

    fn expected(comparison: &Value) -> HandlerResult<PriorityLevel> {
        comparison
            .as_i64()
            .and_then(PriorityLevel::from_i64)
            .ok_or_else(|| {
                HandlerError::InvalidComparison(format!(
                    "expected a priority of 25, 50 or 75, got {comparison}"
                ))
            })
    }
}

impl ConditionHandler for IssuePriorityHandler {
    fn validate_comparison(&self, comparison: &Value) -> HandlerResult<()> {
        Self::expected(comparison).map(|_| ())
    }

    fn evaluate(&self, input: ConditionInput<'_>, comparison: &Value) -> HandlerResult<bool> {
        let expected = Self::expected(comparison)?;
        let ctx = event_context(&input)?;
        let Some(priority) = ctx.event.group().priority else {
            return Ok(false);
        };

        Ok(if self.at_least {
            priority >= expected
        } else {
            priority == expected
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum AssigneeTarget {
    Unassigned,
    Member,
    Team,
}

#[derive(Debug, Clone, Deserialize)]
struct AssignedToComparison {
    target_type: AssigneeTarget,
    #[serde(default)]
    target_identifier: Option<i64>,
}

impl AssignedToComparison {
    fn parse(comparison: &Value) -> HandlerResult<Self> {
        let parsed: Self = parse_comparison(comparison)?;
        if parsed.target_type != AssigneeTarget::Unassigned && parsed.target_identifier.is_none() {
            return Err(HandlerError::InvalidComparison(format!(
                "target_identifier is required for {:?}",
                parsed.target_type
            )));
        }
        Ok(parsed)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AssignedToHandler;

impl ConditionHandler for AssignedToHandler {
    fn validate_comparison(&self, comparison: &Value) -> HandlerResult<()> {
        AssignedToComparison::parse(comparison).map(|_| ())
    }

    fn evaluate(&self, input: ConditionInput<'_>, comparison: &Value) -> HandlerResult<bool> {
        let target = AssignedToComparison::parse(comparison)?;
        let assignee = event_context(&input)?.event.group().assignee;

        Ok(match (target.target_type, assignee) {
            (AssigneeTarget::Unassigned, assignee) => assignee.is_none(),
            (AssigneeTarget::Member, Some(Assignee::User(id))) => Some(id) == target.target_identifier,
            (AssigneeTarget::Team, Some(Assignee::Team(id))) => Some(id) == target.target_identifier,
            _ => false,
        })
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LevelMatch {
    Eq,
    Gte,
    Lte,
}

#[derive(Debug, Clone, Deserialize)]
struct LevelComparison {
    #[serde(rename = "match")]
    match_type: LevelMatch,
    level: i64,
}

/// Compares the event's level against a numeric log level
#[derive(Debug, Clone, Copy)]
pub struct LevelHandler;

impl ConditionHandler for LevelHandler {
    fn validate_comparison(&self, comparison: &Value) -> HandlerResult<()> {
        parse_comparison::<LevelComparison>(comparison).map(|_| ())
    }

    fn evaluate(&self, input: ConditionInput<'_>, comparison: &Value) -> HandlerResult<bool> {
        let expected: LevelComparison = parse_comparison(comparison)?;
        let Some(level) = group_event(&input)?.and_then(|event| event.level) else {
            return Ok(false);
        };

        let level = level.as_i64();
        Ok(match expected.match_type {
            LevelMatch::Eq => level == expected.level,
            LevelMatch::Gte => level >= expected.level,
            LevelMatch::Lte => level <= expected.level,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
enum TagMatch {
    #[serde(rename = "eq")]
    Equals,
    #[serde(rename = "ne")]
    NotEquals,
    #[serde(rename = "sw")]
    StartsWith,
    #[serde(rename = "ew")]
    EndsWith,
    #[serde(rename = "co")]
    Contains,
    #[serde(rename = "nc")]
    NotContains,
    #[serde(rename = "is")]
    IsSet,
    #[serde(rename = "ns")]
    NotSet,
}

impl TagMatch {
    fn needs_value(&self) -> bool {
        !matches!(self, TagMatch::IsSet | TagMatch::NotSet)
    }

    /// Negated matches pass when the tag is absent
    fn is_negated(&self) -> bool {
        matches!(self, TagMatch::NotEquals | TagMatch::NotContains | TagMatch::NotSet)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TaggedEventComparison {
    key: String,
    #[serde(rename = "match")]
    match_type: TagMatch,
    #[serde(default)]
    value: Option<String>,
}

impl TaggedEventComparison {
    fn parse(comparison: &Value) -> HandlerResult<Self> {
        let parsed: Self = parse_comparison(comparison)?;
        if parsed.key.is_empty() {
            return Err(HandlerError::InvalidComparison("tag key must not be empty".into()));
        }
        if parsed.match_type.needs_value() && parsed.value.is_none() {
            return Err(HandlerError::InvalidComparison(format!(
                "{:?} requires a value",
                parsed.match_type
            )));
        }
        Ok(parsed)
    }
}

/// Matches an event tag by key; keys and values compare case-insensitively
#[derive(Debug, Clone, Copy)]
pub struct TaggedEventHandler;

impl ConditionHandler for TaggedEventHandler {
    fn validate_comparison(&self, comparison: &Value) -> HandlerResult<()> {
        TaggedEventComparison::parse(comparison).map(|_| ())
    }

    fn evaluate(&self, input: ConditionInput<'_>, comparison: &Value) -> HandlerResult<bool> {
        let expected = TaggedEventComparison::parse(comparison)?;
        let Some(event) = group_event(&input)? else {
            return Ok(false);
        };

        let key = expected.key.to_lowercase();
        let tag_value = event
            .tags
            .iter()
            .find(|(k, _)| k.to_lowercase() == key)
            .map(|(_, v)| v.to_lowercase());

        let Some(tag_value) = tag_value else {
            return Ok(expected.match_type.is_negated());
        };
        let value = expected.value.unwrap_or_default().to_lowercase();

        Ok(match expected.match_type {
            TagMatch::Equals => tag_value == value,
            TagMatch::NotEquals => tag_value != value,
            TagMatch::StartsWith => tag_value.starts_with(&value),
            TagMatch::EndsWith => tag_value.ends_with(&value),
            TagMatch::Contains => tag_value.contains(&value),
            TagMatch::NotContains => !tag_value.contains(&value),
            TagMatch::IsSet => true,
            TagMatch::NotSet => false,
        })
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum AgeDirection {
    Older,
    Newer,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum AgeUnit {
    Minute,
    Hour,
    Day,
    Week,
}

#[derive(Debug, Clone, Deserialize)]
struct AgeComparison {
    comparison_type: AgeDirection,
    value: i64,
    time: AgeUnit,
}

impl AgeComparison {
    fn parse(comparison: &Value) -> HandlerResult<Self> {
        let parsed: Self = parse_comparison(comparison)?;
        if parsed.value <= 0 {
            return Err(HandlerError::InvalidComparison(format!(
                "age value must be positive, got {}",
                parsed.value
            )));
        }
        Ok(parsed)
    }

    fn window(&self) -> Duration {
        match self.time {
            AgeUnit::Minute => Duration::minutes(self.value),
            AgeUnit::Hour => Duration::hours(self.value),
            AgeUnit::Day => Duration::days(self.value),
            AgeUnit::Week => Duration::weeks(self.value),
        }
    }
}

/// Compares the group's age, measured at the event's time
#[derive(Debug, Clone, Copy)]
pub struct AgeComparisonHandler;

impl ConditionHandler for AgeComparisonHandler {
    fn validate_comparison(&self, comparison: &Value) -> HandlerResult<()> {
        AgeComparison::parse(comparison).map(|_| ())
    }

    fn evaluate(&self, input: ConditionInput<'_>, comparison: &Value) -> HandlerResult<bool> {
        let expected = AgeComparison::parse(comparison)?;
        let ctx = event_context(&input)?;
        let cutoff = ctx.event.datetime() - expected.window();
        let first_seen = ctx.event.group().first_seen;

        Ok(match expected.comparison_type {
            AgeDirection::Older => first_seen < cutoff,
            AgeDirection::Newer => first_seen > cutoff,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct OccurrencesComparison {
    value: u64,
}

/// Passes once the group has been seen at least `value` times
#[derive(Debug, Clone, Copy)]
pub struct IssueOccurrencesHandler;

impl ConditionHandler for IssueOccurrencesHandler {
    fn validate_comparison(&self, comparison: &Value) -> HandlerResult<()> {
        parse_comparison::<OccurrencesComparison>(comparison).map(|_| ())
    }

    fn evaluate(&self, input: ConditionInput<'_>, comparison: &Value) -> HandlerResult<bool> {
        let expected: OccurrencesComparison = parse_comparison(comparison)?;
        Ok(event_context(&input)?.event.group().times_seen >= expected.value)
    }
}
