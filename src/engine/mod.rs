// Workflow evaluation engine
// Condition evaluation, deferred scheduling, debounce and dispatch

//! # Engine Module
//!
//! This module contains everything that turns an incoming event into fired
//! actions. The domain models it reads live in [`crate::models`].
//!
//! ## Architecture Overview
//!
//! ```text
//! registry ─ handlers            condition type -> evaluator
//!    │
//! group_evaluator                one condition list under one logic type
//!    │
//! scheduler ─ buffer             fast now, slow deferred
//!    │
//! processor                      process_workflows
//!    ├─ triggers                 which workflows fire
//!    ├─ action_filters           which of their actions are allowed
//!    ├─ debounce ─ fire_history  which actions fired too recently
//!    └─ dispatch                 task queue + audit trail
//! ```
//!
//! ## Collaborator Traits
//!
//! Each I/O seam is an `async_trait` trait with an in-memory implementation:
//!
//! | Trait                   | In-memory implementation |
//! |-------------------------|--------------------------|
//! | [`WorkflowStorage`]     | [`InMemoryStorage`]      |
//! | [`DelayedWorkflowBuffer`] | [`InMemoryBuffer`]     |
//! | [`FireHistoryStore`]    | [`InMemoryFireHistory`]  |
//! | [`TaskQueue`]           | [`ChannelTaskQueue`]     |
//!
//! ## Rust Learning Notes:
//!
//! ### Split `impl` Blocks
//! [`WorkflowProcessor`] is defined in `processor.rs`, but its pipeline
//! stages are implemented in `triggers.rs`, `action_filters.rs` and
//! `debounce.rs`. A type can have any number of `impl` blocks anywhere in
//! its crate, which keeps each stage and its tests in one file.

/// Typed condition handler registry
pub mod registry;

/// Built-in condition handlers
pub mod handlers;

/// Pure evaluation of a condition list under a logic type
pub mod group_evaluator;

/// Fast/slow split and deferred-work enqueue
pub mod scheduler;

/// Delayed-processing buffer trait and in-memory implementation
pub mod buffer;

/// Workflow, detector, environment and action storage
pub mod storage;

/// Debounce state and fire audit trail
pub mod fire_history;

/// Named counters
pub mod metrics;

/// Top-level orchestration
pub mod processor;

pub mod action_filters;
pub mod debounce;
pub mod triggers;

/// Task queue and dispatcher
pub mod dispatch;

pub use action_filters::PassedActionFilter;
pub use buffer::{DelayedWorkflowBuffer, InMemoryBuffer};
pub use debounce::ActionToFire;
pub use dispatch::{ChannelTaskQueue, DispatchReport, Dispatcher, TaskQueue, TriggerActionTask};
pub use fire_history::{FireHistoryEntry, FireHistoryStore, InMemoryFireHistory};
pub use metrics::EngineMetrics;
pub use processor::WorkflowProcessor;
pub use registry::{ConditionHandler, ConditionHandlerRegistry, ConditionInput};
pub use scheduler::{enqueue_delayed_items, process_data_condition_group, DataConditionGroupResult};
pub use storage::{InMemoryStorage, WorkflowStorage};
