// Workflow trigger evaluation

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::metrics;
use super::processor::WorkflowProcessor;
use super::registry::ConditionInput;
use super::scheduler::process_data_condition_group;
use crate::models::{DelayedWorkflowItem, DelayedWorkflowSource, Workflow, WorkflowEventContext};
use crate::Result;

impl WorkflowProcessor {
    /// Decide which of `workflows` are triggered by the event in `ctx`
    ///
    /// A workflow without a trigger group always triggers. When slow trigger
    /// conditions remain, a grouped event is deferred to the buffer and the
    /// workflow is not triggered now. An activity cannot be deferred, so the
    /// workflow is simply not triggered.
    pub async fn evaluate_workflow_triggers(
        &self,
        workflows: &[Workflow],
        ctx: WorkflowEventContext<'_>,
        now: DateTime<Utc>,
    ) -> Result<HashSet<Workflow>> {
        let mut triggered = HashSet::new();
        let mut deferred = Vec::new();

        for workflow in workflows {
            let Some(group) = &workflow.when_condition_group else {
                triggered.insert(workflow.clone());
                continue;
            };

            // Environment-scoped workflows only run for their own environment
            let workflow_env = workflow.environment_id.and(ctx.environment);
            let input = ConditionInput::Event(ctx.with_workflow_env(workflow_env));
            let result = process_data_condition_group(&self.registry, group, input)?;

            if result.has_remaining() {
                match ctx.event.as_group_event() {
                    Some(event) => {
                        debug!(
                            workflow_id = %workflow.id,
                            remaining = result.remaining_conditions.len(),
                            "Deferring workflow trigger"
                        );
                        self.metrics.incr(metrics::TRIGGER_DEFERRED);
                        deferred.push(DelayedWorkflowItem::for_event(
                            workflow.id,
                            event,
                            result.remaining_conditions,
                            DelayedWorkflowSource::WorkflowTrigger,
                            now,
                        ));
                    }
                    None => {
                        info!(
                            workflow_id = %workflow.id,
                            activity_id = ?ctx.event.activity_id(),
                            "Slow trigger conditions cannot be deferred for an activity"
                        );
                        self.metrics.incr(metrics::TRIGGER_ACTIVITY_SKIPPED);
                    }
                }
            } else if result.logic_result() {
                triggered.insert(workflow.clone());
            }
        }

        self.enqueue(&deferred, now).await?;
        Ok(triggered)
    }
}
