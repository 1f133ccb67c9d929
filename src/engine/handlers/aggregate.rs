// Slow aggregate conditions - frequency and session thresholds

//! These conditions compare an aggregate (event count, unique users, crash
//! free sessions) over an interval. Computing the aggregate is the batch
//! processor's job: inline evaluation only classifies them as slow, and the
//! scheduler defers them to the buffer. Handed the computed aggregate as a
//! [`ConditionInput::Value`], they pass when it exceeds the configured value.

use serde::Deserialize;
use serde_json::Value;

use super::parse_comparison;
use crate::engine::registry::{ConditionHandler, ConditionInput, HandlerError, HandlerResult};

/// Intervals an aggregate can be computed over
pub const INTERVALS: [&str; 7] = ["1m", "5m", "15m", "1h", "1d", "1w", "30d"];

#[derive(Debug, Clone, Deserialize)]
struct AggregateComparison {
    interval: String,
    value: f64,
    #[serde(default)]
    comparison_interval: Option<String>,
}

/// Handler for every slow aggregate type
///
/// Percent-change variants compare against an earlier window and need a
/// `comparison_interval`.
#[derive(Debug, Clone, Copy)]
pub struct AggregateHandler {
    requires_comparison_interval: bool,
}

impl AggregateHandler {
    pub fn count() -> Self {
        Self {
            requires_comparison_interval: false,
        }
    }

    pub fn percent_change() -> Self {
        Self {
            requires_comparison_interval: true,
        }
    }

    fn parse(&self, comparison: &Value) -> HandlerResult<AggregateComparison> {
        let parsed: AggregateComparison = parse_comparison(comparison)?;

        if !INTERVALS.contains(&parsed.interval.as_str()) {
            return Err(HandlerError::InvalidComparison(format!(
                "unsupported interval '{}'",
                parsed.interval
            )));
        }
        if parsed.value < 0.0 {
            return Err(HandlerError::InvalidComparison(format!(
                "value must not be negative, got {}",
                parsed.value
            )));
        }
        match (&parsed.comparison_interval, self.requires_comparison_interval) {
            (None, true) => {
                return Err(HandlerError::InvalidComparison(
                    "comparison_interval is required".to_string(),
                ))
            }
            (Some(interval), _) if !INTERVALS.contains(&interval.as_str()) => {
                return Err(HandlerError::InvalidComparison(format!(
                    "unsupported comparison_interval '{interval}'"
                )))
            }
            _ => {}
        }
        Ok(parsed)
    }
}

impl ConditionHandler for AggregateHandler {
    fn is_slow(&self) -> bool {
        true
    }

    fn validate_comparison(&self, comparison: &Value) -> HandlerResult<()> {
        self.parse(comparison).map(|_| ())
    }

    fn evaluate(&self, input: ConditionInput<'_>, comparison: &Value) -> HandlerResult<bool> {
        let expected = self.parse(comparison)?;
        match input {
            ConditionInput::Value(aggregate) => Ok(aggregate
                .as_f64()
                .map(|aggregate| aggregate > expected.value)
                .unwrap_or(false)),
            ConditionInput::Event(_) => Err(HandlerError::RequiresAggregate),
        }
    }
}
