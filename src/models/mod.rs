// Core domain models for the workflow engine
// These are the configuration entities and event payloads the engine reads

//! # Domain Models Module
//!
//! This module contains the data the engine evaluates:
//!
//! - **Configuration**: [`Workflow`], [`DataConditionGroup`], [`DataCondition`],
//!   [`Action`], [`Detector`], [`Environment`]
//! - **Event context**: [`WorkflowEventData`] and the explicit
//!   [`WorkflowEventContext`] passed into every evaluation
//! - **Deferred work**: [`DelayedWorkflowItem`], written to the buffer when
//!   slow conditions remain
//!
//! Models are plain data. Evaluation lives in [`crate::engine`].
//!
//! ## Rust Learning Notes:
//!
//! ### Re-exports for Clean APIs
//! The `pub use` statements at the bottom create a flat API. Users can write
//! `use workflow_engine::models::Workflow` instead of
//! `use workflow_engine::models::workflow::Workflow`.

pub mod action;
pub mod condition;
pub mod condition_group;
pub mod delayed;
pub mod event;
pub mod ids;
pub mod workflow;

pub use action::{Action, ActionType};
pub use condition::{ConditionOutcome, ConditionResult, ConditionType, DataCondition, PriorityLevel};
pub use condition_group::{
    ConditionMatch, DataConditionGroup, LogicEvaluation, LogicType, ProcessedDataConditionGroup,
};
pub use delayed::{BufferValue, DelayedWorkflowItem, DelayedWorkflowSource};
pub use event::{
    Activity, ActivityType, Assignee, EventLevel, Group, GroupEvent, GroupState, IssueOccurrence,
    WorkflowEventContext, WorkflowEventData,
};
pub use ids::{
    ActionId, DataConditionGroupId, DataConditionId, DetectorId, EnvironmentId, GroupId,
    OrganizationId, ProjectId, WorkflowId,
};
pub use workflow::{Detector, Environment, Workflow, WorkflowConfig};
