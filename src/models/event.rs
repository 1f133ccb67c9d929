// Event context - what the engine evaluates workflows against

//! # Workflow Event Data
//!
//! The engine is invoked for two kinds of input:
//!
//! - [`GroupEvent`]: an error occurrence or performance issue detection that
//!   was grouped into an issue
//! - [`Activity`]: an update on an existing issue (resolved, priority changed,
//!   assigned, ...)
//!
//! Both carry the issue [`Group`] they belong to, which gives the engine the
//! project and organization to work in. [`WorkflowEventData`] is the tagged
//! union the pipeline accepts, and [`WorkflowEventContext`] is the explicit
//! per-evaluation context (event + detector + environments) threaded through
//! every condition evaluation.
//!
//! ## Rust Learning Notes:
//!
//! ### Borrowed Context Structs
//! `WorkflowEventContext<'a>` only holds references and is `Copy`. Deriving a
//! per-workflow context with [`WorkflowEventContext::with_workflow_env`]
//! copies a handful of pointers instead of cloning the event.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::condition::PriorityLevel;
use super::ids::{DetectorId, GroupId, OrganizationId, ProjectId};
use super::workflow::{Detector, Environment};

/// Event severity, ordered by the numeric log level it maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl EventLevel {
    pub fn as_i64(&self) -> i64 {
        match self {
            EventLevel::Debug => 10,
            EventLevel::Info => 20,
            EventLevel::Warning => 30,
            EventLevel::Error => 40,
            EventLevel::Fatal => 50,
        }
    }
}

/// Who an issue is assigned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Assignee {
    User(i64),
    Team(i64),
}

/// The issue an event or activity belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub project_id: ProjectId,
    pub organization_id: OrganizationId,
    /// Issue type slug, e.g. `error` or `performance_n_plus_one_db_queries`
    #[serde(default = "default_group_type")]
    pub group_type: String,
    #[serde(default)]
    pub priority: Option<PriorityLevel>,
    #[serde(default)]
    pub assignee: Option<Assignee>,
    pub first_seen: DateTime<Utc>,
    #[serde(default)]
    pub times_seen: u64,
}

fn default_group_type() -> String {
    "error".to_string()
}

/// State transitions the event caused on its group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupState {
    #[serde(default)]
    pub is_new: bool,
    #[serde(default)]
    pub is_regression: bool,
    #[serde(default)]
    pub is_new_group_environment: bool,
}

/// Issue occurrence payload attached to specialised (non-error) issue types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueOccurrence {
    pub id: String,
    #[serde(default)]
    pub evidence_data: Value,
}

impl IssueOccurrence {
    /// Detector recorded on the occurrence's evidence, if any
    pub fn detector_id(&self) -> Option<DetectorId> {
        self.evidence_data
            .get("detector_id")
            .and_then(Value::as_i64)
            .map(DetectorId)
    }
}

/// A grouped error or issue detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupEvent {
    pub event_id: Uuid,
    pub group: Group,
    #[serde(default)]
    pub occurrence: Option<IssueOccurrence>,
    /// Value of the `environment` tag, if the event carries one
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub level: Option<EventLevel>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Scalar observation carried by the event (metric value of a detection)
    #[serde(default)]
    pub value: Option<Value>,
    pub datetime: DateTime<Utc>,
    #[serde(default)]
    pub group_state: GroupState,
    #[serde(default)]
    pub has_reappeared: bool,
    #[serde(default)]
    pub has_escalated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    SetResolved,
    SetUnresolved,
    SetIgnored,
    SetRegression,
    SetPriority,
    Assigned,
    Unassigned,
    Note,
}

/// An update on an existing issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: i64,
    pub group: Group,
    pub activity_type: ActivityType,
    #[serde(default)]
    pub data: Value,
    pub datetime: DateTime<Utc>,
}

/// Input to the workflow pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkflowEventData {
    Group(GroupEvent),
    Activity(Activity),
}

impl WorkflowEventData {
    pub fn group(&self) -> &Group {
        match self {
            WorkflowEventData::Group(event) => &event.group,
            WorkflowEventData::Activity(activity) => &activity.group,
        }
    }

    pub fn project_id(&self) -> ProjectId {
        self.group().project_id
    }

    pub fn organization_id(&self) -> OrganizationId {
        self.group().organization_id
    }

    /// Event id for group events; activities have none
    pub fn event_id(&self) -> Option<Uuid> {
        match self {
            WorkflowEventData::Group(event) => Some(event.event_id),
            WorkflowEventData::Activity(_) => None,
        }
    }

    pub fn activity_id(&self) -> Option<i64> {
        match self {
            WorkflowEventData::Activity(activity) => Some(activity.id),
            WorkflowEventData::Group(_) => None,
        }
    }

    pub fn occurrence(&self) -> Option<&IssueOccurrence> {
        match self {
            WorkflowEventData::Group(event) => event.occurrence.as_ref(),
            WorkflowEventData::Activity(_) => None,
        }
    }

    /// Name of the environment the event was reported in. Activities are
    /// global and have none.
    pub fn environment_name(&self) -> Option<&str> {
        match self {
            WorkflowEventData::Group(event) => event.environment.as_deref(),
            WorkflowEventData::Activity(_) => None,
        }
    }

    pub fn datetime(&self) -> DateTime<Utc> {
        match self {
            WorkflowEventData::Group(event) => event.datetime,
            WorkflowEventData::Activity(activity) => activity.datetime,
        }
    }

    pub fn is_activity(&self) -> bool {
        matches!(self, WorkflowEventData::Activity(_))
    }

    pub fn as_group_event(&self) -> Option<&GroupEvent> {
        match self {
            WorkflowEventData::Group(event) => Some(event),
            WorkflowEventData::Activity(_) => None,
        }
    }

    /// Short label used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowEventData::Group(_) => "group_event",
            WorkflowEventData::Activity(_) => "activity",
        }
    }
}

/// Everything a condition may need to know about the evaluation it runs in
#[derive(Debug, Clone, Copy)]
pub struct WorkflowEventContext<'a> {
    pub event: &'a WorkflowEventData,
    pub detector: &'a Detector,
    pub organization_id: OrganizationId,
    /// Environment the event was resolved to
    pub environment: Option<&'a Environment>,
    /// Environment of the workflow whose action filters are being evaluated
    pub workflow_env: Option<&'a Environment>,
}

impl<'a> WorkflowEventContext<'a> {
    pub fn new(
        event: &'a WorkflowEventData,
        detector: &'a Detector,
        environment: Option<&'a Environment>,
    ) -> Self {
        Self {
            event,
            detector,
            organization_id: event.organization_id(),
            environment,
            workflow_env: None,
        }
    }

    pub fn with_workflow_env(self, workflow_env: Option<&'a Environment>) -> Self {
        Self {
            workflow_env,
            ..self
        }
    }
}
