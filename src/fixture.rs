// JSON fixtures - a whole configuration plus events in one document

//! # Fixtures
//!
//! A [`Fixture`] describes detectors, environments, actions and workflows
//! (with their detector links and action-filter groups) together with the
//! events to replay against them. The `replay` binary loads one from disk.
//!
//! ```json
//! {
//!   "detectors": [{"id": 1, "project_id": 1, "detector_type": "error"}],
//!   "actions": [{"id": 7, "type": "slack", "config": {"channel": "#alerts"}}],
//!   "workflows": [{
//!     "id": 1, "organization_id": 1, "detector_ids": [1],
//!     "when_condition_group": {"id": 10, "logic_type": "all", "conditions": [...]},
//!     "action_filters": [{"id": 20, "logic_type": "any", "action_ids": [7]}]
//!   }],
//!   "events": [{"kind": "group", ...}]
//! }
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::storage::WorkflowStorage;
use crate::models::{
    Action, ActionId, DataConditionGroup, Detector, DetectorId, Environment, Workflow,
    WorkflowEventData,
};
use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionFilterFixture {
    #[serde(flatten)]
    pub group: DataConditionGroup,
    #[serde(default)]
    pub action_ids: Vec<ActionId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowFixture {
    #[serde(flatten)]
    pub workflow: Workflow,
    #[serde(default)]
    pub detector_ids: Vec<DetectorId>,
    #[serde(default)]
    pub action_filters: Vec<ActionFilterFixture>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub detectors: Vec<Detector>,
    #[serde(default)]
    pub environments: Vec<Environment>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub workflows: Vec<WorkflowFixture>,
    #[serde(default)]
    pub events: Vec<WorkflowEventData>,
}

impl Fixture {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write every configuration entity into `storage`
    ///
    /// Entities are inserted in dependency order, so every write-time check
    /// (condition validation, link targets) applies exactly as it would for
    /// hand-written configuration.
    pub async fn install(&self, storage: &dyn WorkflowStorage) -> Result<()> {
        for detector in &self.detectors {
            storage.insert_detector(detector.clone()).await?;
        }
        for environment in &self.environments {
            storage.insert_environment(environment.clone()).await?;
        }
        for action in &self.actions {
            storage.insert_action(action.clone()).await?;
        }

        for entry in &self.workflows {
            let workflow_id = entry.workflow.id;
            storage.insert_workflow(entry.workflow.clone()).await?;
            for detector_id in &entry.detector_ids {
                storage.link_detector_workflow(*detector_id, workflow_id).await?;
            }
            for filter in &entry.action_filters {
                storage.add_action_filter(workflow_id, filter.group.clone()).await?;
                for action_id in &filter.action_ids {
                    storage.link_action(filter.group.id, *action_id).await?;
                }
            }
            debug!(
                workflow_id = %workflow_id,
                detectors = entry.detector_ids.len(),
                action_filters = entry.action_filters.len(),
                "Installed workflow"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::registry::ConditionHandlerRegistry;
    use crate::engine::storage::InMemoryStorage;
    use crate::models::{DataConditionGroupId, WorkflowId};
    use crate::WorkflowEngineError;
    use serde_json::json;
    use std::sync::Arc;

    fn fixture_json(level_match: &str) -> String {
        json!({
            "detectors": [{"id": 1, "project_id": 1, "detector_type": "error"}],
            "actions": [{"id": 7, "type": "slack", "config": {"channel": "#alerts"}}],
            "workflows": [{
                "id": 1,
                "name": "Errors",
                "organization_id": 1,
                "config": {"frequency": 5},
                "detector_ids": [1],
                "when_condition_group": {
                    "id": 10,
                    "logic_type": "all",
                    "conditions": [{
                        "id": 100,
                        "type": "level",
                        "comparison": {"match": level_match, "level": 40},
                        "condition_group_id": 10
                    }]
                },
                "action_filters": [{"id": 20, "logic_type": "any-short", "action_ids": [7]}]
            }],
            "events": [{
                "kind": "group",
                "event_id": "67e55044-10b1-426f-9247-bb680e5fe0c8",
                "group": {
                    "id": 5,
                    "project_id": 1,
                    "organization_id": 1,
                    "first_seen": "2024-04-01T12:00:00Z"
                },
                "level": "error",
                "datetime": "2024-05-01T12:00:00Z"
            }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_install_populates_storage() {
        let fixture = Fixture::from_json(&fixture_json("gte")).unwrap();
        let storage = InMemoryStorage::new(Arc::new(ConditionHandlerRegistry::with_default_handlers()));

        fixture.install(&storage).await.unwrap();

        let workflow = storage.get_workflow(WorkflowId(1)).await.unwrap().unwrap();
        assert_eq!(workflow.config.frequency, Some(5));
        assert_eq!(workflow.name, "Errors");
        let actions = storage
            .get_actions_for_groups(&[DataConditionGroupId(20)])
            .await
            .unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(fixture.events.len(), 1);
    }

    #[tokio::test]
    async fn test_install_rejects_invalid_conditions() {
        let fixture = Fixture::from_json(&fixture_json("between")).unwrap();
        let storage = InMemoryStorage::new(Arc::new(ConditionHandlerRegistry::with_default_handlers()));

        let err = fixture.install(&storage).await.unwrap_err();
        assert!(matches!(err, WorkflowEngineError::InvalidComparison { condition_id: 100, .. }));
    }
}
