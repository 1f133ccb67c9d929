// Built-in condition handlers

//! # Condition Handlers
//!
//! One handler per [`ConditionType`], grouped by what they inspect:
//!
//! - [`operators`]: scalar comparisons (`eq`, `ne`, `gt`, `gte`, `lt`, `lte`)
//! - [`issue`]: attributes of the event and its issue group
//! - [`aggregate`]: slow frequency/session conditions, evaluated only against
//!   an aggregate value supplied by the batch processor

pub mod aggregate;
pub mod issue;
pub mod operators;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::registry::{ConditionHandlerRegistry, HandlerError, HandlerResult};
use crate::models::ConditionType;

use aggregate::AggregateHandler;
use issue::{
    AgeComparisonHandler, AssignedToHandler, EveryEventHandler, FirstSeenEventHandler,
    IssueOccurrencesHandler, IssuePriorityHandler, LevelHandler, ReappearedEventHandler,
    RegressionEventHandler, TaggedEventHandler,
};
use operators::{Operator, OperatorHandler};

/// Register a handler for every built-in condition type
pub fn register_defaults(registry: &mut ConditionHandlerRegistry) {
    let operators = [
        (ConditionType::Equal, Operator::Eq),
        (ConditionType::NotEqual, Operator::Ne),
        (ConditionType::Greater, Operator::Gt),
        (ConditionType::GreaterOrEqual, Operator::Gte),
        (ConditionType::Less, Operator::Lt),
        (ConditionType::LessOrEqual, Operator::Lte),
    ];
    for (condition_type, operator) in operators {
        registry.register(condition_type, Arc::new(OperatorHandler::new(operator)));
    }

    registry.register(ConditionType::EveryEvent, Arc::new(EveryEventHandler));
    registry.register(ConditionType::FirstSeenEvent, Arc::new(FirstSeenEventHandler));
    registry.register(ConditionType::RegressionEvent, Arc::new(RegressionEventHandler));
    registry.register(ConditionType::ReappearedEvent, Arc::new(ReappearedEventHandler));
    registry.register(
        ConditionType::IssuePriorityEquals,
        Arc::new(IssuePriorityHandler::equals()),
    );
    registry.register(
        ConditionType::IssuePriorityGreaterOrEqual,
        Arc::new(IssuePriorityHandler::at_least()),
    );
    registry.register(ConditionType::AssignedTo, Arc::new(AssignedToHandler));
    registry.register(ConditionType::Level, Arc::new(LevelHandler));
    registry.register(ConditionType::TaggedEvent, Arc::new(TaggedEventHandler));
    registry.register(ConditionType::AgeComparison, Arc::new(AgeComparisonHandler));
    registry.register(ConditionType::IssueOccurrences, Arc::new(IssueOccurrencesHandler));

    registry.register(ConditionType::EventFrequencyCount, Arc::new(AggregateHandler::count()));
    registry.register(ConditionType::EventFrequencyPercent, Arc::new(AggregateHandler::percent_change()));
    registry.register(
        ConditionType::EventUniqueUserFrequencyCount,
        Arc::new(AggregateHandler::count()),
    );
    registry.register(
        ConditionType::EventUniqueUserFrequencyPercent,
        Arc::new(AggregateHandler::percent_change()),
    );
    registry.register(ConditionType::PercentSessionsCount, Arc::new(AggregateHandler::count()));
    registry.register(ConditionType::PercentSessionsPercent, Arc::new(AggregateHandler::count()));
}

/// Deserialize a structured comparison, reporting shape errors as invalid
/// comparisons
pub(crate) fn parse_comparison<T: DeserializeOwned>(comparison: &Value) -> HandlerResult<T> {
    serde_json::from_value(comparison.clone())
        .map_err(|e| HandlerError::InvalidComparison(e.to_string()))
}

pub(crate) fn expect_bool(comparison: &Value) -> HandlerResult<bool> {
    comparison.as_bool().ok_or_else(|| {
        HandlerError::InvalidComparison(format!("expected a boolean, got {comparison}"))
    })
}
