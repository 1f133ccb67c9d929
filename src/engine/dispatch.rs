// Action dispatch - hands surviving actions to the task queue

//! # Dispatcher
//!
//! The last stage of the pipeline. Each action that survived debounce becomes
//! a [`TriggerActionTask`] on the [`TaskQueue`]. Dispatch is gated per
//! organization:
//!
//! - `trigger_actions_enabled = false` suppresses dispatch everywhere
//! - organizations in `dry_run_organizations` are never dispatched
//!
//! Suppressed or not, every fire is recorded in the fire history with its
//! `dispatched` flag, so a dry run leaves the same audit trail as a live run.
//!
//! Tasks are submitted one at a time. When the queue refuses one, the tasks
//! already accepted are still recorded, the debounce windows of the refused
//! and remaining actions are released, and the error is returned so the
//! caller can redeliver the event.
//!
//! ## Rust Learning Notes:
//!
//! ### mpsc Channels
//! [`ChannelTaskQueue`] wraps a `tokio::sync::mpsc` sender. The engine only
//! holds the sending half; whoever executes actions owns the receiver. A
//! bounded channel applies backpressure: `send` waits while the channel is
//! full.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use super::debounce::ActionToFire;
use super::fire_history::{FireHistoryEntry, FireHistoryStore};
use super::metrics::{self, EngineMetrics};
use crate::config::EngineConfig;
use crate::models::{
    ActionId, DetectorId, EnvironmentId, GroupId, GroupState, ProjectId, WorkflowEventContext,
    WorkflowEventData, WorkflowId,
};
use crate::{Result, WorkflowEngineError};

/// What the action executor needs to find the triggering event again
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventReference {
    pub event_id: Option<Uuid>,
    pub activity_id: Option<i64>,
    pub group_id: GroupId,
    pub project_id: ProjectId,
    pub occurrence_id: Option<String>,
}

impl EventReference {
    pub fn from_event(event: &WorkflowEventData) -> Self {
        Self {
            event_id: event.event_id(),
            activity_id: event.activity_id(),
            group_id: event.group().id,
            project_id: event.project_id(),
            occurrence_id: event.occurrence().map(|occurrence| occurrence.id.clone()),
        }
    }
}

/// Work item for the action executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerActionTask {
    pub action_id: ActionId,
    pub workflow_id: WorkflowId,
    pub detector_id: DetectorId,
    pub event: EventReference,
    /// `None` for activities
    pub group_state: Option<GroupState>,
    pub has_reappeared: bool,
    pub has_escalated: bool,
    pub workflow_environment_id: Option<EnvironmentId>,
}

impl TriggerActionTask {
    pub fn new(action: &ActionToFire, ctx: &WorkflowEventContext<'_>) -> Self {
        let group_event = ctx.event.as_group_event();
        Self {
            action_id: action.action.id,
            workflow_id: action.workflow_id,
            detector_id: ctx.detector.id,
            event: EventReference::from_event(ctx.event),
            group_state: group_event.map(|event| event.group_state),
            has_reappeared: group_event.map(|event| event.has_reappeared).unwrap_or(false),
            has_escalated: group_event.map(|event| event.has_escalated).unwrap_or(false),
            workflow_environment_id: action.workflow_environment_id,
        }
    }
}

/// Asynchronous executor of action tasks. Submission is fire and forget.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn submit(&self, task: TriggerActionTask) -> Result<()>;
}

/// Task queue backed by a tokio mpsc channel
#[derive(Debug, Clone)]
pub struct ChannelTaskQueue {
    sender: mpsc::Sender<TriggerActionTask>,
}

impl ChannelTaskQueue {
    /// Create a queue holding up to `capacity` pending tasks, plus the
    /// receiving half for the executor
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TriggerActionTask>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl TaskQueue for ChannelTaskQueue {
    async fn submit(&self, task: TriggerActionTask) -> Result<()> {
        self.sender
            .send(task)
            .await
            .map_err(|e| WorkflowEngineError::Dispatch(format!("task queue closed: {e}")))
    }
}

/// Summary of one dispatch call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Tasks handed to the queue
    pub dispatched: usize,
    /// Fire-history entries written
    pub recorded: usize,
    /// Whether dispatch was suppressed for this organization
    pub dry_run: bool,
}

pub struct Dispatcher {
    queue: Arc<dyn TaskQueue>,
    fire_history: Arc<dyn FireHistoryStore>,
    metrics: Arc<EngineMetrics>,
    config: EngineConfig,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        fire_history: Arc<dyn FireHistoryStore>,
        metrics: Arc<EngineMetrics>,
        config: EngineConfig,
    ) -> Self {
        Self {
            queue,
            fire_history,
            metrics,
            config,
        }
    }

    /// Submit tasks for `actions` (unless suppressed) and record every fire
    pub async fn dispatch(
        &self,
        actions: &[ActionToFire],
        ctx: &WorkflowEventContext<'_>,
        now: DateTime<Utc>,
    ) -> Result<DispatchReport> {
        let permitted = self.config.actions_permitted(ctx.organization_id);
        let mut report = DispatchReport {
            dry_run: !permitted,
            ..DispatchReport::default()
        };
        if actions.is_empty() {
            return Ok(report);
        }

        if !permitted {
            warn!(
                organization_id = %ctx.organization_id,
                actions = actions.len(),
                "Action dispatch suppressed, recording fires only"
            );
        }

        let mut entries = Vec::with_capacity(actions.len());
        let mut failure = None;
        for (index, action) in actions.iter().enumerate() {
            if permitted {
                if let Err(e) = self.queue.submit(TriggerActionTask::new(action, ctx)).await {
                    failure = Some((index, e));
                    break;
                }
                report.dispatched += 1;
                info!(
                    action_id = %action.action.id,
                    workflow_id = %action.workflow_id,
                    group_id = %ctx.event.group().id,
                    "Dispatched action"
                );
            }
            entries.push(FireHistoryEntry {
                workflow_id: action.workflow_id,
                action_id: action.action.id,
                group_id: ctx.event.group().id,
                detector_id: ctx.detector.id,
                event_id: ctx.event.event_id(),
                activity_id: ctx.event.activity_id(),
                fired_at: now,
                dispatched: permitted,
            });
        }

        // Undispatched actions must not hold a debounce window, or a
        // redelivery of this event could never fire them
        if let Some((index, _)) = &failure {
            self.release_claims(&actions[*index..], ctx, now).await;
        }

        report.recorded = entries.len();
        self.fire_history.record(entries).await?;

        self.metrics.incr_by(metrics::ACTIONS_DISPATCHED, report.dispatched as u64);
        self.metrics
            .incr_by(metrics::ACTIONS_SUPPRESSED, (report.recorded - report.dispatched) as u64);

        if let Some((index, error)) = failure {
            warn!(
                error = %error,
                dispatched = report.dispatched,
                released = actions.len() - index,
                "Task queue refused an action"
            );
            return Err(error);
        }

        Ok(report)
    }

    async fn release_claims(
        &self,
        actions: &[ActionToFire],
        ctx: &WorkflowEventContext<'_>,
        acquired_at: DateTime<Utc>,
    ) {
        let group_id = ctx.event.group().id;
        let releases = join_all(actions.iter().map(|action| {
            self.fire_history
                .release(action.action.id, group_id, acquired_at)
        }))
        .await;

        for (action, released) in actions.iter().zip(releases) {
            if let Err(e) = released {
                warn!(
                    error = %e,
                    action_id = %action.action.id,
                    group_id = %group_id,
                    "Failed to release debounce window"
                );
            }
        }
    }
}
