// Group evaluator - combines condition outcomes under a logic type

//! # Group Evaluator
//!
//! [`evaluate_data_conditions`] is a pure function: given the same conditions,
//! inputs and logic type it always produces the same [`LogicEvaluation`].
//! It performs no I/O and holds no state.
//!
//! | Logic type  | Evaluates            | `logic_result`  | Results reported       |
//! |-------------|----------------------|-----------------|------------------------|
//! | `all`       | until first failure  | every pass      | all, or none on a fail |
//! | `any`       | everything           | at least one    | the passing subset     |
//! | `any-short` | until first pass     | at least one    | the first pass only    |
//! | `none`      | everything           | no pass         | never any              |
//!
//! An empty condition list evaluates to `true` for every logic type,
//! including `none`.

use crate::engine::registry::{ConditionHandlerRegistry, ConditionInput};
use crate::models::{ConditionMatch, DataCondition, LogicEvaluation, LogicType};
use crate::Result;

/// Evaluate `(condition, input)` pairs in order under `logic_type`
///
/// ## Errors
/// Any handler error (including an unregistered condition type) aborts the
/// evaluation. Nothing is skipped silently.
pub fn evaluate_data_conditions<'c, 'i, I>(
    registry: &ConditionHandlerRegistry,
    conditions: I,
    logic_type: LogicType,
) -> Result<LogicEvaluation>
where
    I: IntoIterator<Item = (&'c DataCondition, ConditionInput<'i>)>,
{
    let mut passed = Vec::new();
    let mut evaluated_any = false;

    for (condition, input) in conditions {
        evaluated_any = true;
        let outcome = condition.evaluate_value(registry, input)?;

        match outcome.result {
            Some(result) if outcome.passed => {
                let matched = ConditionMatch {
                    condition: condition.clone(),
                    result,
                };
                match logic_type {
                    LogicType::AnyShortCircuit => {
                        return Ok(LogicEvaluation::new(true, vec![matched]));
                    }
                    LogicType::All | LogicType::Any | LogicType::None => passed.push(matched),
                }
            }
            _ => {
                if logic_type == LogicType::All {
                    return Ok(LogicEvaluation::new(false, Vec::new()));
                }
            }
        }
    }

    if !evaluated_any {
        return Ok(LogicEvaluation::new(true, Vec::new()));
    }

    Ok(match logic_type {
        LogicType::All => LogicEvaluation::new(true, passed),
        LogicType::Any => LogicEvaluation::new(!passed.is_empty(), passed),
        LogicType::AnyShortCircuit => LogicEvaluation::new(false, Vec::new()),
        LogicType::None => LogicEvaluation::new(passed.is_empty(), Vec::new()),
    })
}

/// Evaluate every condition against the same input
pub fn evaluate_with_input<'c, 'i>(
    registry: &ConditionHandlerRegistry,
    conditions: impl IntoIterator<Item = &'c DataCondition>,
    input: ConditionInput<'i>,
    logic_type: LogicType,
) -> Result<LogicEvaluation> {
    evaluate_data_conditions(
        registry,
        conditions.into_iter().map(|condition| (condition, input)),
        logic_type,
    )
}
