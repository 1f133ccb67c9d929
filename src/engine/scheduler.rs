// Deferred evaluation scheduler - fast conditions now, slow conditions later

//! # Deferred Evaluation Scheduler
//!
//! [`process_data_condition_group`] evaluates the fast conditions of a group
//! and decides whether the slow ones still matter:
//!
//! ```text
//! only slow conditions            -> (false, [])  remaining = all slow
//! all   + a fast condition failed -> (false, [])  remaining = []
//! none  + a fast condition passed -> (false, [])  remaining = []
//! any   + a fast condition passed -> (true, ..)   remaining = []
//! otherwise                       -> partial      remaining = slow
//! ```
//!
//! Callers that get remaining conditions back turn them into
//! [`DelayedWorkflowItem`]s and hand them to [`enqueue_delayed_items`].

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::buffer::DelayedWorkflowBuffer;
use super::group_evaluator::evaluate_with_input;
use super::registry::{ConditionHandlerRegistry, ConditionInput};
use crate::models::{
    DataCondition, DataConditionGroup, DelayedWorkflowItem, LogicEvaluation, LogicType,
    ProcessedDataConditionGroup, ProjectId,
};
use crate::Result;

/// Outcome of processing a group's fast conditions
#[derive(Debug, Clone, PartialEq)]
pub struct DataConditionGroupResult {
    pub processed: ProcessedDataConditionGroup,
    /// Slow conditions that still have to be evaluated by the batch pass
    pub remaining_conditions: Vec<DataCondition>,
}

impl DataConditionGroupResult {
    pub fn logic_result(&self) -> bool {
        self.processed.logic_result
    }

    pub fn has_remaining(&self) -> bool {
        !self.remaining_conditions.is_empty()
    }
}

/// Whether the fast result settles the group regardless of the slow conditions
fn is_definitive(logic_type: LogicType, fast: &LogicEvaluation) -> bool {
    match logic_type {
        LogicType::All | LogicType::None => !fast.logic_result,
        LogicType::Any | LogicType::AnyShortCircuit => fast.logic_result,
    }
}

/// Evaluate the fast conditions of `group`, returning the slow ones that remain
pub fn process_data_condition_group(
    registry: &ConditionHandlerRegistry,
    group: &DataConditionGroup,
    input: ConditionInput<'_>,
) -> Result<DataConditionGroupResult> {
    let (fast, slow) = registry.split_conditions_by_speed(&group.conditions)?;

    if fast.is_empty() && !slow.is_empty() {
        return Ok(DataConditionGroupResult {
            processed: ProcessedDataConditionGroup::from_evaluation(
                group,
                LogicEvaluation::new(false, Vec::new()),
            ),
            remaining_conditions: slow.into_iter().cloned().collect(),
        });
    }

    let evaluation = evaluate_with_input(registry, fast, input, group.logic_type)?;

    let remaining_conditions = if slow.is_empty() || is_definitive(group.logic_type, &evaluation) {
        Vec::new()
    } else {
        slow.into_iter().cloned().collect()
    };

    debug!(
        group_id = %group.id,
        logic_type = %group.logic_type,
        logic_result = evaluation.logic_result,
        remaining = remaining_conditions.len(),
        "Processed condition group"
    );

    Ok(DataConditionGroupResult {
        processed: ProcessedDataConditionGroup::from_evaluation(group, evaluation),
        remaining_conditions,
    })
}

/// Write deferred items to the buffer
///
/// Items are written to one hash per project, then every touched project is
/// added to the sorted set `list_key` with score `now`. Items with the same
/// buffer key merge: the last one in `items` wins.
pub async fn enqueue_delayed_items(
    buffer: &dyn DelayedWorkflowBuffer,
    items: &[DelayedWorkflowItem],
    list_key: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    if items.is_empty() {
        return Ok(());
    }

    let mut by_project: BTreeMap<ProjectId, HashMap<String, String>> = BTreeMap::new();
    for item in items {
        by_project
            .entry(item.project_id)
            .or_default()
            .insert(item.buffer_key(), item.buffer_value()?);
    }

    let project_ids: Vec<ProjectId> = by_project.keys().copied().collect();
    for (project_id, data) in by_project {
        debug!(project_id = %project_id, entries = data.len(), "Buffering delayed workflow items");
        buffer.push_to_hash_bulk(project_id, data).await?;
    }
    buffer.push_to_sorted_set(list_key, &project_ids, now).await?;

    Ok(())
}
