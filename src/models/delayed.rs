// Deferred work items - slow conditions handed to the batch processor

//! # Delayed Workflow Items
//!
//! When a trigger or action-filter group still has slow conditions left after
//! its fast conditions were evaluated, the remaining work is packaged as a
//! [`DelayedWorkflowItem`] and written to the delayed-processing buffer. The
//! batch processor later runs the aggregate queries and finishes evaluation.
//!
//! ## Buffer layout
//!
//! Items are stored per project as `buffer_key -> buffer_value`:
//!
//! ```text
//! {workflow_id}:{group_id}:{condition_group_ids}:{source} -> {"event_id": .., "occurrence_id": .., "timestamp": ..}
//! ```
//!
//! The key identifies the (workflow, issue group, condition groups, source)
//! tuple, so repeated deferrals of the same work merge into one entry whose
//! value points at the most recent event.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::condition::DataCondition;
use super::event::GroupEvent;
use super::ids::{GroupId, ProjectId, WorkflowId};
use crate::Result;

/// Which stage of the pipeline deferred the work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayedWorkflowSource {
    WorkflowTrigger,
    ActionFilter,
}

impl DelayedWorkflowSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DelayedWorkflowSource::WorkflowTrigger => "workflow_trigger",
            DelayedWorkflowSource::ActionFilter => "action_filter",
        }
    }
}

impl std::fmt::Display for DelayedWorkflowSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialized payload stored under a buffer key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferValue {
    pub event_id: Uuid,
    pub occurrence_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// One unit of deferred evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct DelayedWorkflowItem {
    pub workflow_id: WorkflowId,
    /// Issue group of the triggering event
    pub group_id: GroupId,
    pub project_id: ProjectId,
    pub delayed_conditions: Vec<DataCondition>,
    pub event_id: Uuid,
    pub occurrence_id: Option<String>,
    pub source: DelayedWorkflowSource,
    pub timestamp: DateTime<Utc>,
}

impl DelayedWorkflowItem {
    /// Defer `delayed_conditions` of `workflow_id` for a grouped event
    pub fn for_event(
        workflow_id: WorkflowId,
        event: &GroupEvent,
        delayed_conditions: Vec<DataCondition>,
        source: DelayedWorkflowSource,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            workflow_id,
            group_id: event.group.id,
            project_id: event.group.project_id,
            delayed_conditions,
            event_id: event.event_id,
            occurrence_id: event.occurrence.as_ref().map(|occurrence| occurrence.id.clone()),
            source,
            timestamp,
        }
    }

    /// Deterministic key for merging buffered entries
    ///
    /// Condition group ids are de-duplicated and sorted so that the key does
    /// not depend on condition order.
    pub fn buffer_key(&self) -> String {
        let condition_group_ids: BTreeSet<i64> = self
            .delayed_conditions
            .iter()
            .map(|condition| condition.condition_group_id.get())
            .collect();
        let condition_group_ids = condition_group_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");

        format!(
            "{}:{}:{}:{}",
            self.workflow_id, self.group_id, condition_group_ids, self.source
        )
    }

    pub fn buffer_value(&self) -> Result<String> {
        let value = BufferValue {
            event_id: self.event_id,
            occurrence_id: self.occurrence_id.clone(),
            timestamp: self.timestamp,
        };
        Ok(serde_json::to_string(&value)?)
    }
}
