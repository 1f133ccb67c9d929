// Workflow processor - the top-level entry point for an incoming event

//! # Workflow Processor
//!
//! [`WorkflowProcessor::process_workflows`] runs one event through the whole
//! pipeline:
//!
//! 1. resolve the detector (miss: empty result)
//! 2. resolve the event's environment (miss: empty result)
//! 3. fetch enabled workflows for the detector and environment
//! 4. evaluate trigger groups
//! 5. evaluate action filters of triggered workflows, then debounce
//! 6. dispatch surviving actions
//!
//! The stages live in their own modules ([`super::triggers`],
//! [`super::action_filters`], [`super::debounce`], [`super::dispatch`]) as
//! further `impl WorkflowProcessor` blocks.
//!
//! Resolution misses are expected (a detector or environment deleted while
//! the event was in flight) and produce an empty result. Storage, buffer and
//! queue errors propagate to the caller, which owns retries.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use super::buffer::DelayedWorkflowBuffer;
use super::dispatch::{Dispatcher, TaskQueue};
use super::fire_history::FireHistoryStore;
use super::metrics::{self, EngineMetrics};
use super::registry::ConditionHandlerRegistry;
use super::scheduler::enqueue_delayed_items;
use super::storage::WorkflowStorage;
use crate::config::EngineConfig;
use crate::models::{
    DelayedWorkflowItem, Environment, Workflow, WorkflowEventContext, WorkflowEventData,
};
use crate::Result;

/// Orchestrates workflow evaluation for incoming events
///
/// Cheap to share: every collaborator is behind an `Arc`, so one processor
/// can serve many concurrent events.
pub struct WorkflowProcessor {
    pub(crate) registry: Arc<ConditionHandlerRegistry>,
    pub(crate) storage: Arc<dyn WorkflowStorage>,
    pub(crate) buffer: Arc<dyn DelayedWorkflowBuffer>,
    pub(crate) fire_history: Arc<dyn FireHistoryStore>,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) metrics: Arc<EngineMetrics>,
    pub(crate) config: EngineConfig,
}

impl WorkflowProcessor {
    pub fn new(
        registry: Arc<ConditionHandlerRegistry>,
        storage: Arc<dyn WorkflowStorage>,
        buffer: Arc<dyn DelayedWorkflowBuffer>,
        fire_history: Arc<dyn FireHistoryStore>,
        queue: Arc<dyn TaskQueue>,
        config: EngineConfig,
    ) -> Self {
        let metrics = Arc::new(EngineMetrics::new());
        let dispatcher = Dispatcher::new(
            queue,
            Arc::clone(&fire_history),
            Arc::clone(&metrics),
            config.clone(),
        );
        Self {
            registry,
            storage,
            buffer,
            fire_history,
            dispatcher,
            metrics,
            config,
        }
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Process one event, returning the workflows it triggered
    pub async fn process_workflows(&self, event: &WorkflowEventData) -> Result<HashSet<Workflow>> {
        self.process_workflows_at(event, Utc::now()).await
    }

    /// [`process_workflows`](Self::process_workflows) with an explicit clock
    #[instrument(
        skip(self, event),
        fields(kind = event.kind(), group_id = %event.group().id, project_id = %event.project_id())
    )]
    pub async fn process_workflows_at(
        &self,
        event: &WorkflowEventData,
        now: DateTime<Utc>,
    ) -> Result<HashSet<Workflow>> {
        let detector = match self.storage.get_detector_by_event(event).await {
            Ok(detector) => detector,
            Err(e) if e.is_resolution_miss() => {
                info!(error = %e, "No detector for event");
                self.metrics.incr(metrics::DETECTOR_NOT_FOUND);
                return Ok(HashSet::new());
            }
            Err(e) => return Err(e),
        };

        let environment = match self.resolve_environment(event).await {
            Ok(environment) => environment,
            Err(e) if e.is_resolution_miss() => {
                warn!(error = %e, "Environment for event not found");
                self.metrics.incr(metrics::ENVIRONMENT_NOT_FOUND);
                return Ok(HashSet::new());
            }
            Err(e) => return Err(e),
        };

        let ctx = WorkflowEventContext::new(event, &detector, environment.as_ref());

        let workflows = self
            .storage
            .get_workflows_for_detector(detector.id, environment.as_ref().map(|env| env.id))
            .await?;
        if workflows.is_empty() {
            debug!(detector_id = %detector.id, "No workflows for detector");
            self.metrics.incr(metrics::NO_WORKFLOWS);
            return Ok(HashSet::new());
        }

        let triggered = self.evaluate_workflow_triggers(&workflows, ctx, now).await?;
        if triggered.is_empty() {
            debug!(candidates = workflows.len(), "No workflows triggered");
            return Ok(triggered);
        }
        self.metrics
            .incr_by(metrics::WORKFLOWS_TRIGGERED, triggered.len() as u64);

        let passed = self.evaluate_workflows_action_filters(&triggered, ctx, now).await?;
        let actions = self.filter_recently_fired_actions(&passed, ctx, now).await?;
        if actions.is_empty() {
            debug!(triggered = triggered.len(), "No actions to fire");
            return Ok(triggered);
        }

        let report = self.dispatcher.dispatch(&actions, &ctx, now).await?;
        info!(
            triggered = triggered.len(),
            dispatched = report.dispatched,
            recorded = report.recorded,
            dry_run = report.dry_run,
            "Processed workflows"
        );

        Ok(triggered)
    }

    /// Grouped events resolve their environment tag within the organization.
    /// Activities, and events without the tag, have no environment.
    async fn resolve_environment(&self, event: &WorkflowEventData) -> Result<Option<Environment>> {
        match event.environment_name() {
            Some(name) => Ok(Some(
                self.storage
                    .get_environment(event.organization_id(), name)
                    .await?,
            )),
            None => Ok(None),
        }
    }

    /// Flush deferred items to the buffer
    pub(crate) async fn enqueue(
        &self,
        items: &[DelayedWorkflowItem],
        now: DateTime<Utc>,
    ) -> Result<()> {
        enqueue_delayed_items(self.buffer.as_ref(), items, &self.config.buffer_list_key, now).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::engine::buffer::InMemoryBuffer;
    use crate::engine::dispatch::tests::FailingQueue;
    use crate::engine::dispatch::{ChannelTaskQueue, TriggerActionTask};
    use crate::engine::fire_history::InMemoryFireHistory;
    use crate::engine::storage::InMemoryStorage;
    use crate::models::{
        Action, ActionId, ActionType, ConditionType, DataCondition, DataConditionGroup,
        DetectorId, EventLevel, LogicType, OrganizationId, WorkflowId,
    };
    use crate::testing;
    use crate::WorkflowEngineError;
    use serde_json::json;
    use tokio::sync::mpsc;

    pub(crate) struct Harness {
        pub processor: WorkflowProcessor,
        pub storage: Arc<InMemoryStorage>,
        pub buffer: Arc<InMemoryBuffer>,
        pub history: Arc<InMemoryFireHistory>,
        pub metrics: Arc<EngineMetrics>,
        pub receiver: mpsc::Receiver<TriggerActionTask>,
    }

    impl Harness {
        pub fn drain_tasks(&mut self) -> Vec<TriggerActionTask> {
            let mut tasks = Vec::new();
            while let Ok(task) = self.receiver.try_recv() {
                tasks.push(task);
            }
            tasks
        }
    }

    pub(crate) async fn harness() -> Harness {
        harness_with(EngineConfig::default()).await
    }

    pub(crate) async fn harness_with(config: EngineConfig) -> Harness {
        harness_with_queue(config, |queue| Arc::new(queue) as Arc<dyn TaskQueue>).await
    }

    /// Harness whose task queue wraps the channel queue the receiver reads
    pub(crate) async fn harness_with_queue(
        config: EngineConfig,
        wrap: impl FnOnce(ChannelTaskQueue) -> Arc<dyn TaskQueue>,
    ) -> Harness {
        let registry = Arc::new(ConditionHandlerRegistry::with_default_handlers());
        let storage = Arc::new(InMemoryStorage::new(Arc::clone(&registry)));
        let buffer = Arc::new(InMemoryBuffer::new());
        let history = Arc::new(InMemoryFireHistory::new());
        let (queue, receiver) = ChannelTaskQueue::new(64);

        storage.insert_detector(testing::error_detector()).await.unwrap();

        let processor = WorkflowProcessor::new(
            registry,
            storage.clone(),
            buffer.clone(),
            history.clone(),
            wrap(queue),
            config,
        );
        let metrics = Arc::clone(processor.metrics());

        Harness {
            processor,
            storage,
            buffer,
            history,
            metrics,
            receiver,
        }
    }

    /// Store a workflow on the fixture detector with one action-filter group
    /// gating one Slack action
    async fn install(
        h: &Harness,
        workflow: Workflow,
        filter: DataConditionGroup,
        action_id: i64,
    ) {
        let workflow_id = workflow.id;
        let filter_id = filter.id;
        h.storage.insert_workflow(workflow).await.unwrap();
        h.storage
            .link_detector_workflow(DetectorId(1), workflow_id)
            .await
            .unwrap();
        h.storage
            .insert_action(Action::new(action_id, ActionType::Slack))
            .await
            .unwrap();
        h.storage.add_action_filter(workflow_id, filter).await.unwrap();
        h.storage.link_action(filter_id, action_id.into()).await.unwrap();
    }

    fn trigger(
        id: i64,
        logic_type: LogicType,
        conditions: Vec<DataCondition>,
    ) -> DataConditionGroup {
        conditions
            .into_iter()
            .fold(DataConditionGroup::new(id, logic_type), |group, condition| {
                group.with_condition(condition)
            })
    }

    fn frequency(id: i64, value: i64) -> DataCondition {
        DataCondition::new(
            id,
            0,
            ConditionType::EventFrequencyCount,
            json!({"interval": "1h", "value": value}),
        )
    }

    fn level_at_least(id: i64, level: i64) -> DataCondition {
        DataCondition::new(id, 0, ConditionType::Level, json!({"match": "gte", "level": level}))
    }

    fn error_event(group_id: i64) -> WorkflowEventData {
        let mut event = testing::group_event(testing::group(group_id));
        event.level = Some(EventLevel::Error);
        testing::event_data(event)
    }

    // A fast-only trigger and an always-passing filter fire the action once
    #[tokio::test]
    async fn test_fast_trigger_dispatches_action() {
        let mut h = harness().await;
        install(
            &h,
            Workflow::new(1, 1)
                .with_trigger(trigger(10, LogicType::All, vec![level_at_least(1, 40)])),
            DataConditionGroup::new(20, LogicType::Any),
            7,
        )
        .await;

        let event = error_event(5);
        let triggered = h
            .processor
            .process_workflows_at(&event, testing::event_time())
            .await
            .unwrap();

        assert_eq!(triggered.len(), 1);
        let tasks = h.drain_tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].action_id, ActionId(7));
        assert_eq!(tasks[0].workflow_id, WorkflowId(1));
        assert_eq!(tasks[0].detector_id, DetectorId(1));
        assert_eq!(h.history.all_entries().len(), 1);
    }

    // A fast failure under ALL makes the slow condition irrelevant
    #[tokio::test]
    async fn test_all_with_fast_failure_neither_triggers_nor_defers() {
        let mut h = harness().await;
        install(
            &h,
            Workflow::new(1, 1).with_trigger(trigger(
                10,
                LogicType::All,
                vec![level_at_least(1, 50), frequency(2, 100)],
            )),
            DataConditionGroup::new(20, LogicType::Any),
            7,
        )
        .await;

        let triggered = h
            .processor
            .process_workflows_at(&error_event(5), testing::event_time())
            .await
            .unwrap();

        assert!(triggered.is_empty());
        assert_eq!(h.buffer.pending_entries(), 0);
        assert!(h.drain_tasks().is_empty());
    }

    // A fast pass under ALL with a slow condition left defers the trigger
    #[tokio::test]
    async fn test_all_with_fast_pass_defers_slow_trigger() {
        let mut h = harness().await;
        install(
            &h,
            Workflow::new(1, 1).with_trigger(trigger(
                10,
                LogicType::All,
                vec![level_at_least(1, 40), frequency(2, 100)],
            )),
            DataConditionGroup::new(20, LogicType::Any),
            7,
        )
        .await;

        let triggered = h
            .processor
            .process_workflows_at(&error_event(5), testing::event_time())
            .await
            .unwrap();

        assert!(triggered.is_empty());
        assert!(h.drain_tasks().is_empty());

        let hash = h.buffer.get_hash(1.into()).await.unwrap();
        assert_eq!(hash.keys().collect::<Vec<_>>(), vec!["1:5:10:workflow_trigger"]);
        let pending = h
            .buffer
            .get_sorted_set("workflow_engine_delayed_processing_buffer", testing::event_time())
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
    }

    // Two events for the same issue inside the window fire the action once
    #[tokio::test]
    async fn test_debounce_across_events() {
        let mut h = harness().await;
        install(
            &h,
            Workflow::new(1, 1),
            DataConditionGroup::new(20, LogicType::Any),
            7,
        )
        .await;

        for minute in [0, 5] {
            let triggered = h
                .processor
                .process_workflows_at(&error_event(5), testing::at(2024, 5, 1, 12, minute))
                .await
                .unwrap();
            assert_eq!(triggered.len(), 1);
        }

        assert_eq!(h.drain_tasks().len(), 1);
        assert_eq!(h.metrics.get(metrics::ACTIONS_DEBOUNCED), 1);

        // A different issue is not affected by the first issue's fire
        h.processor
            .process_workflows_at(&error_event(6), testing::at(2024, 5, 1, 12, 6))
            .await
            .unwrap();
        assert_eq!(h.drain_tasks().len(), 1);
    }

    // Concurrent events for one issue still fire the action exactly once
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_events_fire_once() {
        let mut h = harness().await;
        install(
            &h,
            Workflow::new(1, 1),
            DataConditionGroup::new(20, LogicType::Any),
            7,
        )
        .await;

        let events: Vec<WorkflowEventData> = (0..8).map(|_| error_event(5)).collect();
        let results = futures::future::join_all(
            events
                .iter()
                .map(|event| h.processor.process_workflows_at(event, testing::event_time())),
        )
        .await;

        assert!(results.iter().all(|result| result.is_ok()));
        assert_eq!(h.drain_tasks().len(), 1);
    }

    // An activity against a slow action filter assumes the filter passes
    #[tokio::test]
    async fn test_activity_with_slow_filter_dispatches() {
        let mut h = harness().await;
        install(
            &h,
            Workflow::new(1, 1),
            trigger(20, LogicType::All, vec![frequency(1, 100)]),
            7,
        )
        .await;

        let activity = WorkflowEventData::Activity(testing::activity(testing::group(5)));
        let triggered = h
            .processor
            .process_workflows_at(&activity, testing::event_time())
            .await
            .unwrap();

        assert_eq!(triggered.len(), 1);
        let tasks = h.drain_tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].event.activity_id, Some(900));
        assert_eq!(tasks[0].group_state, None);
        assert_eq!(h.buffer.pending_entries(), 0);
    }

    #[tokio::test]
    async fn test_unknown_detector_returns_empty() {
        let h = harness().await;
        let mut group = testing::group(5);
        group.group_type = "profile_regression".to_string();
        let event = testing::event_data(testing::group_event(group));

        let triggered = h
            .processor
            .process_workflows_at(&event, testing::event_time())
            .await
            .unwrap();

        assert!(triggered.is_empty());
        assert_eq!(h.metrics.get(metrics::DETECTOR_NOT_FOUND), 1);
    }

    #[tokio::test]
    async fn test_unknown_environment_returns_empty() {
        let h = harness().await;
        install(&h, Workflow::new(1, 1), DataConditionGroup::new(20, LogicType::Any), 7).await;
        let mut event = testing::group_event(testing::group(5));
        event.environment = Some("staging".to_string());

        let triggered = h
            .processor
            .process_workflows_at(&testing::event_data(event), testing::event_time())
            .await
            .unwrap();

        assert!(triggered.is_empty());
        assert_eq!(h.metrics.get(metrics::ENVIRONMENT_NOT_FOUND), 1);
    }

    #[tokio::test]
    async fn test_environment_scoped_workflows() {
        let mut h = harness().await;
        h.storage
            .insert_environment(Environment::new(3, 1, "prod"))
            .await
            .unwrap();
        h.storage
            .insert_environment(Environment::new(4, 1, "dev"))
            .await
            .unwrap();
        install(
            &h,
            Workflow::new(1, 1).with_environment(3),
            DataConditionGroup::new(20, LogicType::Any),
            7,
        )
        .await;
        install(&h, Workflow::new(2, 1), DataConditionGroup::new(21, LogicType::Any), 8).await;

        let mut event = testing::group_event(testing::group(5));
        event.environment = Some("dev".to_string());
        let triggered = h
            .processor
            .process_workflows_at(&testing::event_data(event), testing::event_time())
            .await
            .unwrap();

        let ids: Vec<i64> = triggered.iter().map(|w| w.id.get()).collect();
        assert_eq!(ids, vec![2]);
        let tasks = h.drain_tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].action_id, ActionId(8));
    }

    #[tokio::test]
    async fn test_dry_run_organization_records_without_dispatch() {
        let mut h = harness_with(EngineConfig {
            dry_run_organizations: vec![OrganizationId(1)],
            ..EngineConfig::default()
        })
        .await;
        install(&h, Workflow::new(1, 1), DataConditionGroup::new(20, LogicType::Any), 7).await;

        let triggered = h
            .processor
            .process_workflows_at(&error_event(5), testing::event_time())
            .await
            .unwrap();

        assert_eq!(triggered.len(), 1);
        assert!(h.drain_tasks().is_empty());
        let entries = h.history.all_entries();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].dispatched);
        assert_eq!(h.metrics.get(metrics::ACTIONS_SUPPRESSED), 1);
    }

    #[tokio::test]
    async fn test_disabled_workflow_is_ignored() {
        let mut h = harness().await;
        let mut workflow = Workflow::new(1, 1);
        workflow.enabled = false;
        install(&h, workflow, DataConditionGroup::new(20, LogicType::Any), 7).await;

        let triggered = h
            .processor
            .process_workflows_at(&error_event(5), testing::event_time())
            .await
            .unwrap();

        assert!(triggered.is_empty());
        assert!(h.drain_tasks().is_empty());
        assert_eq!(h.metrics.get(metrics::NO_WORKFLOWS), 1);
    }

    // A threshold trigger on the event value with no action filters triggers
    // the workflow and dispatches nothing
    #[tokio::test]
    async fn test_value_threshold_without_action_filters_triggers_only() {
        let mut h = harness().await;
        let workflow = Workflow::new(1, 1).with_trigger(trigger(
            10,
            LogicType::All,
            vec![DataCondition::new(1, 0, ConditionType::Greater, json!(5))],
        ));
        h.storage.insert_workflow(workflow).await.unwrap();
        h.storage
            .link_detector_workflow(DetectorId(1), WorkflowId(1))
            .await
            .unwrap();

        let mut event = testing::group_event(testing::group(5));
        event.value = Some(json!(10));
        let triggered = h
            .processor
            .process_workflows_at(&testing::event_data(event), testing::event_time())
            .await
            .unwrap();

        let ids: Vec<i64> = triggered.iter().map(|w| w.id.get()).collect();
        assert_eq!(ids, vec![1]);
        assert!(h.drain_tasks().is_empty());
        assert!(h.history.all_entries().is_empty());
        assert_eq!(h.buffer.pending_entries(), 0);
    }

    // A refused submit fails the event; redelivering it fires what was left
    // without repeating what already went out
    #[tokio::test]
    async fn test_redelivery_after_refused_submit_fires_remaining_action() {
        let mut h = harness_with_queue(EngineConfig::default(), |queue| {
            Arc::new(FailingQueue::new(queue, 2)) as Arc<dyn TaskQueue>
        })
        .await;
        install(&h, Workflow::new(1, 1), DataConditionGroup::new(20, LogicType::Any), 7).await;
        h.storage
            .insert_action(Action::new(8, ActionType::Email))
            .await
            .unwrap();
        h.storage.link_action(20.into(), 8.into()).await.unwrap();

        let event = error_event(5);
        let err = h
            .processor
            .process_workflows_at(&event, testing::at(2024, 5, 1, 12, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowEngineError::Dispatch(_)));

        let first: Vec<ActionId> = h.drain_tasks().iter().map(|task| task.action_id).collect();
        assert_eq!(first, vec![ActionId(7)]);
        let recorded: Vec<ActionId> = h.history.all_entries().iter().map(|e| e.action_id).collect();
        assert_eq!(recorded, vec![ActionId(7)]);

        let triggered = h
            .processor
            .process_workflows_at(&event, testing::at(2024, 5, 1, 12, 1))
            .await
            .unwrap();
        assert_eq!(triggered.len(), 1);

        let retried: Vec<ActionId> = h.drain_tasks().iter().map(|task| task.action_id).collect();
        assert_eq!(retried, vec![ActionId(8)]);
        let recorded: Vec<ActionId> = h.history.all_entries().iter().map(|e| e.action_id).collect();
        assert_eq!(recorded, vec![ActionId(7), ActionId(8)]);
        assert_eq!(h.metrics.get(metrics::ACTIONS_DEBOUNCED), 1);
    }
}
