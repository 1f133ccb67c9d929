// Actions - the side effects a workflow can fire

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::ActionId;

/// Notification/integration provider that executes an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Slack,
    MsTeams,
    Discord,
    Email,
    Pagerduty,
    Opsgenie,
    Webhook,
    Plugin,
    Jira,
    Github,
}

/// An action linked to one or more action-filter groups
///
/// Actions are shared: several workflows may reference the same one, and
/// deleting a workflow never deletes its actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default)]
    pub integration_id: Option<i64>,
    /// Target reference (channel, address, service key, ...)
    #[serde(default)]
    pub config: Value,
}

impl Action {
    pub fn new(id: impl Into<ActionId>, action_type: ActionType) -> Self {
        Self {
            id: id.into(),
            action_type,
            integration_id: None,
            config: Value::Null,
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }
}

impl PartialEq for Action {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Action {}

impl Hash for Action {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
