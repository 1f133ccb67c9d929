// In-process counters incremented at each branch of the pipeline

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::trace;

pub const DETECTOR_NOT_FOUND: &str = "process_workflows.detector_not_found";
pub const ENVIRONMENT_NOT_FOUND: &str = "process_workflows.environment_not_found";
pub const NO_WORKFLOWS: &str = "process_workflows.no_workflows";
pub const WORKFLOWS_TRIGGERED: &str = "process_workflows.triggered_workflows";
pub const TRIGGER_DEFERRED: &str = "process_workflows.enqueue_workflow";
pub const TRIGGER_ACTIVITY_SKIPPED: &str = "process_workflows.enqueue_workflow.activity";
pub const ACTION_FILTER_DEFERRED: &str = "process_workflows.action_filter.enqueued";
pub const ACTION_FILTER_ACTIVITY_ASSUMED_TRUE: &str =
    "process_workflows.action_filter.activity_assumed_true";
pub const ACTION_FILTER_ENVIRONMENT_MISSING: &str =
    "process_workflows.action_filter.environment_not_found";
pub const ACTIONS_DEBOUNCED: &str = "process_workflows.actions.debounced";
pub const ACTIONS_DISPATCHED: &str = "process_workflows.actions.dispatched";
pub const ACTIONS_SUPPRESSED: &str = "process_workflows.actions.suppressed";

/// Named monotonically increasing counters
///
/// Counters are created on first use. Reading a counter that was never
/// incremented returns 0.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    counters: DashMap<String, AtomicU64>,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(&self, name: &str) {
        self.incr_by(name, 1);
    }

    pub fn incr_by(&self, name: &str, amount: u64) {
        if let Some(counter) = self.counters.get(name) {
            counter.fetch_add(amount, Ordering::Relaxed);
            return;
        }
        self.counters
            .entry(name.to_string())
            .or_default()
            .fetch_add(amount, Ordering::Relaxed);
        trace!(metric = name, "Counter created");
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters
            .get(name)
            .map(|counter| counter.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Point-in-time copy of every counter, sorted by name
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect()
    }
}
