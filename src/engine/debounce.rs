// Fire debouncer - drops actions that fired recently for the same issue

//! An action linked to several passed filters is considered once per event,
//! under the filter with the lowest group id. Whether it fires is decided by
//! the fire-history store's atomic
//! [`try_acquire`](super::fire_history::FireHistoryStore::try_acquire), using
//! the owning workflow's frequency as the window.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::action_filters::PassedActionFilter;
use super::metrics;
use super::processor::WorkflowProcessor;
use crate::models::{
    Action, ActionId, DataConditionGroupId, EnvironmentId, WorkflowEventContext, WorkflowId,
};
use crate::Result;

/// An action cleared to fire for this event
#[derive(Debug, Clone, PartialEq)]
pub struct ActionToFire {
    pub action: Action,
    pub workflow_id: WorkflowId,
    /// Action-filter group the action was reached through
    pub group_id: DataConditionGroupId,
    pub workflow_environment_id: Option<EnvironmentId>,
}

impl WorkflowProcessor {
    pub async fn filter_recently_fired_actions(
        &self,
        passed: &[PassedActionFilter],
        ctx: WorkflowEventContext<'_>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ActionToFire>> {
        let filters: BTreeMap<DataConditionGroupId, &PassedActionFilter> =
            passed.iter().map(|filter| (filter.group.id, filter)).collect();
        let group_ids: Vec<DataConditionGroupId> = filters.keys().copied().collect();

        let issue_group_id = ctx.event.group().id;
        let mut seen: HashSet<ActionId> = HashSet::new();
        let mut to_fire = Vec::new();

        let mut linked = self.storage.get_actions_for_groups(&group_ids).await?;
        linked.sort_by_key(|(group_id, action)| (*group_id, action.id));

        for (group_id, action) in linked {
            let Some(filter) = filters.get(&group_id) else {
                continue;
            };
            if !seen.insert(action.id) {
                continue;
            }

            let window = filter.workflow.frequency(self.config.default_frequency_minutes);
            let acquired = self
                .fire_history
                .try_acquire(action.id, issue_group_id, now, window)
                .await?;

            if acquired {
                to_fire.push(ActionToFire {
                    workflow_id: filter.workflow.id,
                    group_id,
                    workflow_environment_id: filter.workflow.environment_id,
                    action,
                });
            } else {
                debug!(
                    action_id = %action.id,
                    group_id = %issue_group_id,
                    window_minutes = window.num_minutes(),
                    "Action fired recently, skipping"
                );
                self.metrics.incr(metrics::ACTIONS_DEBOUNCED);
            }
        }

        Ok(to_fire)
    }
}
