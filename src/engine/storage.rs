// Storage abstraction for the workflow engine
// Configuration entities the pipeline reads: detectors, environments, workflows, actions

//! # Storage Abstraction Layer
//!
//! The pipeline never reaches into a database directly. Everything it reads
//! goes through the [`WorkflowStorage`] trait:
//!
//! - detector and environment resolution for an incoming event
//! - enabled workflows attached to a detector
//! - action-filter groups of workflows and the actions linked to them
//!
//! ## Storage Architecture
//!
//! The storage layer follows the **Repository Pattern**:
//! - **WorkflowStorage trait**: the interface for all reads and writes
//! - **InMemoryStorage**: implementation for tests, demos and single-process
//!   deployments
//!
//! ## Write-time Validation
//!
//! Writes that carry conditions (workflows and action-filter groups) are
//! validated against the [`ConditionHandlerRegistry`]. An unknown condition
//! type or a malformed comparison is rejected at write time, so evaluation
//! errors only appear for data that bypassed this layer.
//!
//! ## Relationships
//!
//! ```text
//! Detector ──< detector_workflow >── Workflow ── when_condition_group
//!                                       │
//!                                       └──< action filter group >── group_action >── Action
//! ```
//!
//! Deleting a workflow removes its detector links, its action-filter groups
//! and their action links. Actions themselves are shared and are kept.
//!
//! ## Rust Learning Notes:
//!
//! ### Async Traits
//! Async functions in trait objects come from the `async-trait` crate, which
//! turns each `async fn` into a method returning a boxed future.
//!
//! ### tokio::sync::RwLock
//! The async `RwLock` can be held across `.await` points and never poisons,
//! so lock acquisition cannot fail and needs no `unwrap()`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::registry::ConditionHandlerRegistry;
use crate::models::{
    Action, ActionId, DataConditionGroup, DataConditionGroupId, Detector, DetectorId, Environment,
    EnvironmentId, OrganizationId, Workflow, WorkflowEventData, WorkflowId,
};
use crate::{Result, WorkflowEngineError};

/// An action-filter group together with the workflow it belongs to
pub type WorkflowActionFilter = (WorkflowId, DataConditionGroup);

/// Repository for workflow configuration
#[async_trait]
pub trait WorkflowStorage: Send + Sync {
    /// Resolve the detector responsible for an event
    ///
    /// An occurrence carrying a `detector_id` in its evidence resolves to that
    /// detector. Otherwise the project's detector for the group's type is used.
    ///
    /// ## Errors
    /// - `DetectorNotFound` when neither lookup finds a detector
    async fn get_detector_by_event(&self, event: &WorkflowEventData) -> Result<Detector>;

    /// Look up an environment by organization and name
    ///
    /// ## Errors
    /// - `EnvironmentNotFound` if the organization has no such environment
    async fn get_environment(
        &self,
        organization_id: OrganizationId,
        name: &str,
    ) -> Result<Environment>;

    async fn get_environment_by_id(&self, id: EnvironmentId) -> Result<Option<Environment>>;

    /// Enabled workflows attached to `detector_id` that apply to `environment_id`
    ///
    /// Workflows without an environment always apply. Environment-scoped
    /// workflows only apply to events resolved to that environment.
    async fn get_workflows_for_detector(
        &self,
        detector_id: DetectorId,
        environment_id: Option<EnvironmentId>,
    ) -> Result<Vec<Workflow>>;

    async fn get_workflow(&self, id: WorkflowId) -> Result<Option<Workflow>>;

    /// Action-filter groups of the given workflows, in workflow then group order
    async fn get_action_filter_groups(
        &self,
        workflow_ids: &[WorkflowId],
    ) -> Result<Vec<WorkflowActionFilter>>;

    /// Actions linked to the given groups, as `(group, action)` pairs
    async fn get_actions_for_groups(
        &self,
        group_ids: &[DataConditionGroupId],
    ) -> Result<Vec<(DataConditionGroupId, Action)>>;

    async fn insert_detector(&self, detector: Detector) -> Result<Detector>;

    async fn insert_environment(&self, environment: Environment) -> Result<Environment>;

    /// Store a workflow after validating its trigger group
    async fn insert_workflow(&self, workflow: Workflow) -> Result<Workflow>;

    async fn insert_action(&self, action: Action) -> Result<Action>;

    /// Attach a workflow to a detector
    async fn link_detector_workflow(
        &self,
        detector_id: DetectorId,
        workflow_id: WorkflowId,
    ) -> Result<()>;

    /// Add (or replace) an action-filter group on a workflow
    async fn add_action_filter(
        &self,
        workflow_id: WorkflowId,
        group: DataConditionGroup,
    ) -> Result<()>;

    /// Gate an action behind an action-filter group
    async fn link_action(&self, group_id: DataConditionGroupId, action_id: ActionId) -> Result<()>;

    /// Delete a workflow and everything it owns. Returns `false` if it did
    /// not exist.
    async fn delete_workflow(&self, workflow_id: WorkflowId) -> Result<bool>;
}

#[derive(Debug, Default)]
struct Tables {
    detectors: BTreeMap<DetectorId, Detector>,
    environments: BTreeMap<EnvironmentId, Environment>,
    workflows: BTreeMap<WorkflowId, Workflow>,
    actions: BTreeMap<ActionId, Action>,
    detector_workflows: BTreeMap<DetectorId, BTreeSet<WorkflowId>>,
    action_filters: BTreeMap<WorkflowId, Vec<DataConditionGroup>>,
    group_actions: BTreeMap<DataConditionGroupId, BTreeSet<ActionId>>,
}

impl Tables {
    fn filter_owner(&self, group_id: DataConditionGroupId) -> Option<WorkflowId> {
        self.action_filters
            .iter()
            .find(|(_, groups)| groups.iter().any(|group| group.id == group_id))
            .map(|(workflow_id, _)| *workflow_id)
    }
}

/// In-memory storage implementation
///
/// Ordered maps keep every listing deterministic (by id), which the pipeline
/// relies on for stable action ordering.
pub struct InMemoryStorage {
    registry: Arc<ConditionHandlerRegistry>,
    tables: RwLock<Tables>,
}

impl InMemoryStorage {
    pub fn new(registry: Arc<ConditionHandlerRegistry>) -> Self {
        Self {
            registry,
            tables: RwLock::new(Tables::default()),
        }
    }
}

fn describe_event(event: &WorkflowEventData) -> String {
    match (event.event_id(), event.activity_id()) {
        (Some(event_id), _) => event_id.to_string(),
        (None, Some(activity_id)) => format!("activity:{activity_id}"),
        (None, None) => format!("group:{}", event.group().id),
    }
}

#[async_trait]
impl WorkflowStorage for InMemoryStorage {
    async fn get_detector_by_event(&self, event: &WorkflowEventData) -> Result<Detector> {
        let tables = self.tables.read().await;

        let detector = match event.occurrence().and_then(|occurrence| occurrence.detector_id()) {
            Some(detector_id) => tables.detectors.get(&detector_id),
            None => {
                let group = event.group();
                tables.detectors.values().find(|detector| {
                    detector.project_id == group.project_id
                        && detector.detector_type == group.group_type
                })
            }
        };

        detector
            .cloned()
            .ok_or_else(|| WorkflowEngineError::DetectorNotFound {
                event: describe_event(event),
            })
    }

    async fn get_environment(
        &self,
        organization_id: OrganizationId,
        name: &str,
    ) -> Result<Environment> {
        let tables = self.tables.read().await;
        tables
            .environments
            .values()
            .find(|env| env.organization_id == organization_id && env.name == name)
            .cloned()
            .ok_or_else(|| WorkflowEngineError::EnvironmentNotFound {
                name: name.to_string(),
            })
    }

    async fn get_environment_by_id(&self, id: EnvironmentId) -> Result<Option<Environment>> {
        Ok(self.tables.read().await.environments.get(&id).cloned())
    }

    async fn get_workflows_for_detector(
        &self,
        detector_id: DetectorId,
        environment_id: Option<EnvironmentId>,
    ) -> Result<Vec<Workflow>> {
        let tables = self.tables.read().await;
        let Some(workflow_ids) = tables.detector_workflows.get(&detector_id) else {
            return Ok(Vec::new());
        };

        Ok(workflow_ids
            .iter()
            .filter_map(|id| tables.workflows.get(id))
            .filter(|workflow| workflow.enabled && workflow.applies_to_environment(environment_id))
            .cloned()
            .collect())
    }

    async fn get_workflow(&self, id: WorkflowId) -> Result<Option<Workflow>> {
        Ok(self.tables.read().await.workflows.get(&id).cloned())
    }

    async fn get_action_filter_groups(
        &self,
        workflow_ids: &[WorkflowId],
    ) -> Result<Vec<WorkflowActionFilter>> {
        let tables = self.tables.read().await;
        let workflow_ids: BTreeSet<WorkflowId> = workflow_ids.iter().copied().collect();

        Ok(workflow_ids
            .into_iter()
            .filter_map(|id| tables.action_filters.get(&id).map(|groups| (id, groups)))
            .flat_map(|(id, groups)| groups.iter().map(move |group| (id, group.clone())))
            .collect())
    }

    async fn get_actions_for_groups(
        &self,
        group_ids: &[DataConditionGroupId],
    ) -> Result<Vec<(DataConditionGroupId, Action)>> {
        let tables = self.tables.read().await;
        let mut pairs = Vec::new();

        for group_id in group_ids {
            let Some(action_ids) = tables.group_actions.get(group_id) else {
                continue;
            };
            for action_id in action_ids {
                if let Some(action) = tables.actions.get(action_id) {
                    pairs.push((*group_id, action.clone()));
                }
            }
        }
        Ok(pairs)
    }

    async fn insert_detector(&self, detector: Detector) -> Result<Detector> {
        let mut tables = self.tables.write().await;
        tables.detectors.insert(detector.id, detector.clone());
        Ok(detector)
    }

    async fn insert_environment(&self, environment: Environment) -> Result<Environment> {
        let mut tables = self.tables.write().await;
        let duplicate = tables.environments.values().any(|existing| {
            existing.id != environment.id
                && existing.organization_id == environment.organization_id
                && existing.name == environment.name
        });
        if duplicate {
            return Err(WorkflowEngineError::InvalidInput(format!(
                "environment '{}' already exists in organization {}",
                environment.name, environment.organization_id
            )));
        }
        tables.environments.insert(environment.id, environment.clone());
        Ok(environment)
    }

    async fn insert_workflow(&self, workflow: Workflow) -> Result<Workflow> {
        self.registry.validate_workflow(&workflow)?;

        let mut tables = self.tables.write().await;
        if let Some(environment_id) = workflow.environment_id {
            match tables.environments.get(&environment_id) {
                Some(env) if env.organization_id == workflow.organization_id => {}
                _ => {
                    return Err(WorkflowEngineError::InvalidInput(format!(
                        "workflow {} references unknown environment {}",
                        workflow.id, environment_id
                    )))
                }
            }
        }

        debug!(workflow_id = %workflow.id, "Storing workflow");
        tables.workflows.insert(workflow.id, workflow.clone());
        Ok(workflow)
    }

    async fn insert_action(&self, action: Action) -> Result<Action> {
        let mut tables = self.tables.write().await;
        tables.actions.insert(action.id, action.clone());
        Ok(action)
    }

    async fn link_detector_workflow(
        &self,
        detector_id: DetectorId,
        workflow_id: WorkflowId,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.detectors.contains_key(&detector_id) {
            return Err(WorkflowEngineError::NotFound(format!("detector {detector_id}")));
        }
        if !tables.workflows.contains_key(&workflow_id) {
            return Err(WorkflowEngineError::NotFound(format!("workflow {workflow_id}")));
        }
        tables
            .detector_workflows
            .entry(detector_id)
            .or_default()
            .insert(workflow_id);
        Ok(())
    }

    async fn add_action_filter(
        &self,
        workflow_id: WorkflowId,
        group: DataConditionGroup,
    ) -> Result<()> {
        self.registry.validate_group(&group)?;

        let mut tables = self.tables.write().await;
        if !tables.workflows.contains_key(&workflow_id) {
            return Err(WorkflowEngineError::NotFound(format!("workflow {workflow_id}")));
        }
        if let Some(owner) = tables.filter_owner(group.id) {
            if owner != workflow_id {
                return Err(WorkflowEngineError::InvalidInput(format!(
                    "condition group {} already filters workflow {}",
                    group.id, owner
                )));
            }
        }

        let groups = tables.action_filters.entry(workflow_id).or_default();
        match groups.iter_mut().find(|existing| existing.id == group.id) {
            Some(existing) => *existing = group,
            None => groups.push(group),
        }
        Ok(())
    }

    async fn link_action(&self, group_id: DataConditionGroupId, action_id: ActionId) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.filter_owner(group_id).is_none() {
            return Err(WorkflowEngineError::NotFound(format!(
                "action filter group {group_id}"
            )));
        }
        if !tables.actions.contains_key(&action_id) {
            return Err(WorkflowEngineError::NotFound(format!("action {action_id}")));
        }
        tables.group_actions.entry(group_id).or_default().insert(action_id);
        Ok(())
    }

    async fn delete_workflow(&self, workflow_id: WorkflowId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables.workflows.remove(&workflow_id).is_none() {
            return Ok(false);
        }

        for workflows in tables.detector_workflows.values_mut() {
            workflows.remove(&workflow_id);
        }
        let filters = tables.action_filters.remove(&workflow_id).unwrap_or_default();
        for group in &filters {
            tables.group_actions.remove(&group.id);
        }

        info!(
            workflow_id = %workflow_id,
            action_filters = filters.len(),
            "Deleted workflow"
        );
        Ok(true)
    }
}
