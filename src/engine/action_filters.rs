// Action filter evaluation - which action-filter groups of triggered workflows pass

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::metrics;
use super::processor::WorkflowProcessor;
use super::registry::ConditionInput;
use super::scheduler::process_data_condition_group;
use crate::models::{
    DataConditionGroup, DelayedWorkflowItem, DelayedWorkflowSource, Environment, Workflow,
    WorkflowEventContext, WorkflowId,
};
use crate::Result;

/// An action-filter group that passed, tagged with its workflow
#[derive(Debug, Clone, PartialEq)]
pub struct PassedActionFilter {
    pub group: DataConditionGroup,
    pub workflow: Workflow,
}

impl PassedActionFilter {
    pub fn workflow_id(&self) -> WorkflowId {
        self.workflow.id
    }
}

impl WorkflowProcessor {
    /// Evaluate the action-filter groups of every triggered workflow
    ///
    /// Each workflow's filters are evaluated with that workflow's environment
    /// bound in the context. A workflow whose environment no longer exists is
    /// skipped with a warning. Slow filter conditions are deferred for grouped
    /// events and assumed to pass for activities.
    ///
    /// Passed filters are returned ordered by group id.
    pub async fn evaluate_workflows_action_filters(
        &self,
        triggered: &HashSet<Workflow>,
        ctx: WorkflowEventContext<'_>,
        now: DateTime<Utc>,
    ) -> Result<Vec<PassedActionFilter>> {
        let workflows: BTreeMap<WorkflowId, &Workflow> =
            triggered.iter().map(|workflow| (workflow.id, workflow)).collect();
        let workflow_ids: Vec<WorkflowId> = workflows.keys().copied().collect();

        let mut environments: HashMap<WorkflowId, Environment> = HashMap::new();
        let mut skipped: HashSet<WorkflowId> = HashSet::new();
        for workflow in workflows.values() {
            let Some(environment_id) = workflow.environment_id else {
                continue;
            };
            match self.storage.get_environment_by_id(environment_id).await? {
                Some(environment) => {
                    environments.insert(workflow.id, environment);
                }
                None => {
                    warn!(
                        workflow_id = %workflow.id,
                        environment_id = %environment_id,
                        "Workflow environment not found, skipping its action filters"
                    );
                    self.metrics.incr(metrics::ACTION_FILTER_ENVIRONMENT_MISSING);
                    skipped.insert(workflow.id);
                }
            }
        }

        let filters = self.storage.get_action_filter_groups(&workflow_ids).await?;

        let mut passed: BTreeMap<_, PassedActionFilter> = BTreeMap::new();
        let mut deferred = Vec::new();

        for (workflow_id, group) in filters {
            if skipped.contains(&workflow_id) {
                continue;
            }
            let Some(workflow) = workflows.get(&workflow_id) else {
                continue;
            };

            let workflow_ctx = ctx.with_workflow_env(environments.get(&workflow_id));
            let result = process_data_condition_group(
                &self.registry,
                &group,
                ConditionInput::Event(workflow_ctx),
            )?;

            let passes = if result.has_remaining() {
                match ctx.event.as_group_event() {
                    Some(event) => {
                        debug!(
                            workflow_id = %workflow_id,
                            group_id = %group.id,
                            remaining = result.remaining_conditions.len(),
                            "Deferring action filter"
                        );
                        self.metrics.incr(metrics::ACTION_FILTER_DEFERRED);
                        deferred.push(DelayedWorkflowItem::for_event(
                            workflow_id,
                            event,
                            result.remaining_conditions,
                            DelayedWorkflowSource::ActionFilter,
                            now,
                        ));
                        false
                    }
                    None => {
                        debug!(
                            workflow_id = %workflow_id,
                            group_id = %group.id,
                            "Assuming slow action filter passes for activity"
                        );
                        self.metrics.incr(metrics::ACTION_FILTER_ACTIVITY_ASSUMED_TRUE);
                        true
                    }
                }
            } else {
                result.logic_result()
            };

            if passes {
                passed.insert(
                    group.id,
                    PassedActionFilter {
                        group,
                        workflow: (*workflow).clone(),
                    },
                );
            }
        }

        self.enqueue(&deferred, now).await?;
        Ok(passed.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::DelayedWorkflowBuffer;
    use crate::engine::processor::tests::harness;
    use crate::engine::storage::WorkflowStorage;
    use crate::models::{ConditionType, DataCondition, LogicType, WorkflowEventData};
    use crate::testing;
    use serde_json::json;

    fn filter(id: i64, conditions: Vec<DataCondition>) -> DataConditionGroup {
        conditions
            .into_iter()
            .fold(DataConditionGroup::new(id, LogicType::All), |group, condition| {
                group.with_condition(condition)
            })
    }

    fn slow(id: i64) -> DataCondition {
        DataCondition::new(
            id,
            0,
            ConditionType::EventFrequencyCount,
            json!({"interval": "1h", "value": 100}),
        )
    }

    fn regression(id: i64, expected: bool) -> DataCondition {
        DataCondition::new(id, 0, ConditionType::RegressionEvent, json!(expected))
    }

    #[tokio::test]
    async fn test_filters_pass_defer_and_fail() {
        let h = harness().await;
        h.storage.insert_workflow(Workflow::new(1, 1)).await.unwrap();
        h.storage
            .add_action_filter(1.into(), filter(20, vec![regression(1, false)]))
            .await
            .unwrap();
        h.storage
            .add_action_filter(1.into(), filter(21, vec![regression(2, true)]))
            .await
            .unwrap();
        h.storage
            .add_action_filter(1.into(), filter(22, vec![regression(3, false), slow(4)]))
            .await
            .unwrap();

        let event = testing::event_data(testing::group_event(testing::group(5)));
        let detector = testing::error_detector();
        let ctx = WorkflowEventContext::new(&event, &detector, None);
        let triggered = HashSet::from([Workflow::new(1, 1)]);

        let passed = h
            .processor
            .evaluate_workflows_action_filters(&triggered, ctx, testing::event_time())
            .await
            .unwrap();

        let ids: Vec<i64> = passed.iter().map(|p| p.group.id.get()).collect();
        assert_eq!(ids, vec![20]);
        let hash = h.buffer.get_hash(1.into()).await.unwrap();
        assert!(hash.contains_key("1:5:22:action_filter"));
    }

    #[tokio::test]
    async fn test_slow_filters_assumed_true_for_activities() {
        let h = harness().await;
        h.storage.insert_workflow(Workflow::new(1, 1)).await.unwrap();
        h.storage
            .add_action_filter(1.into(), filter(22, vec![slow(4)]))
            .await
            .unwrap();

        let activity = WorkflowEventData::Activity(testing::activity(testing::group(5)));
        let detector = testing::error_detector();
        let ctx = WorkflowEventContext::new(&activity, &detector, None);
        let triggered = HashSet::from([Workflow::new(1, 1)]);

        let passed = h
            .processor
            .evaluate_workflows_action_filters(&triggered, ctx, testing::event_time())
            .await
            .unwrap();

        assert_eq!(passed.len(), 1);
        assert_eq!(passed[0].workflow_id(), WorkflowId(1));
        assert_eq!(h.buffer.pending_entries(), 0);
        assert_eq!(h.metrics.get(metrics::ACTION_FILTER_ACTIVITY_ASSUMED_TRUE), 1);
    }

    #[tokio::test]
    async fn test_missing_workflow_environment_skips_filters() {
        let h = harness().await;
        h.storage.insert_workflow(Workflow::new(1, 1)).await.unwrap();
        h.storage
            .add_action_filter(1.into(), filter(20, vec![]))
            .await
            .unwrap();

        let event = testing::event_data(testing::group_event(testing::group(5)));
        let detector = testing::error_detector();
        let ctx = WorkflowEventContext::new(&event, &detector, None);
        // The triggered copy points at an environment that was since deleted
        let triggered = HashSet::from([Workflow::new(1, 1).with_environment(99)]);

        let passed = h
            .processor
            .evaluate_workflows_action_filters(&triggered, ctx, testing::event_time())
            .await
            .unwrap();

        assert!(passed.is_empty());
        assert_eq!(h.metrics.get(metrics::ACTION_FILTER_ENVIRONMENT_MISSING), 1);
    }
}
