// Workflow, detector and environment configuration entities

//! # Workflows
//!
//! A [`Workflow`] ties a trigger condition group to the action-filter groups
//! (and through them, the actions) that run when the trigger passes. Workflows
//! are attached to [`Detector`]s: an event is only ever evaluated against the
//! workflows of the detector that owns it.
//!
//! ## Environment scoping
//!
//! `environment_id = None` means the workflow applies in every environment.
//! Otherwise it only participates for events resolved to that environment.
//! Events without an environment (activity updates) only reach unrestricted
//! workflows.

use std::hash::{Hash, Hasher};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::condition_group::DataConditionGroup;
use super::ids::{DetectorId, EnvironmentId, OrganizationId, ProjectId, WorkflowId};

/// Per-workflow settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Minimum minutes between two fires of the same action for the same
    /// issue group. `None` uses the engine default.
    #[serde(default)]
    pub frequency: Option<i64>,
}

/// A configured workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    #[serde(default)]
    pub name: String,
    pub organization_id: OrganizationId,
    #[serde(default)]
    pub environment_id: Option<EnvironmentId>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Trigger group. A workflow without one always triggers.
    #[serde(default)]
    pub when_condition_group: Option<DataConditionGroup>,
    #[serde(default)]
    pub config: WorkflowConfig,
}

fn default_enabled() -> bool {
    true
}

impl Workflow {
    pub fn new(id: impl Into<WorkflowId>, organization_id: impl Into<OrganizationId>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            organization_id: organization_id.into(),
            environment_id: None,
            enabled: true,
            when_condition_group: None,
            config: WorkflowConfig::default(),
        }
    }

    pub fn with_trigger(mut self, group: DataConditionGroup) -> Self {
        self.when_condition_group = Some(group);
        self
    }

    pub fn with_environment(mut self, environment_id: impl Into<EnvironmentId>) -> Self {
        self.environment_id = Some(environment_id.into());
        self
    }

    pub fn with_frequency(mut self, minutes: i64) -> Self {
        self.config.frequency = Some(minutes);
        self
    }

    /// Whether this workflow participates for an event resolved to `environment`
    pub fn applies_to_environment(&self, environment: Option<EnvironmentId>) -> bool {
        match (self.environment_id, environment) {
            (None, _) => true,
            (Some(required), Some(actual)) => required == actual,
            (Some(_), None) => false,
        }
    }

    /// The debounce window for this workflow's actions
    pub fn frequency(&self, default_minutes: i64) -> Duration {
        Duration::minutes(self.config.frequency.unwrap_or(default_minutes))
    }
}

impl PartialEq for Workflow {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Workflow {}

impl Hash for Workflow {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// The component that owns a class of issues within a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detector {
    pub id: DetectorId,
    pub project_id: ProjectId,
    #[serde(default)]
    pub name: String,
    /// Issue group type this detector produces, e.g. `error`
    pub detector_type: String,
}

impl Detector {
    pub fn new(
        id: impl Into<DetectorId>,
        project_id: impl Into<ProjectId>,
        detector_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            project_id: project_id.into(),
            name: String::new(),
            detector_type: detector_type.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub id: EnvironmentId,
    pub organization_id: OrganizationId,
    pub name: String,
}

impl Environment {
    pub fn new(
        id: impl Into<EnvironmentId>,
        organization_id: impl Into<OrganizationId>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            organization_id: organization_id.into(),
            name: name.into(),
        }
    }
}
