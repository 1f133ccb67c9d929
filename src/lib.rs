// Workflow Engine - Rust Edition
// Decides which workflows an incoming issue event triggers and which actions fire

//! # Workflow Engine Library
//!
//! This is the library crate for the workflow evaluation engine. For every
//! incoming event (a grouped error, an issue detection, or an activity update
//! on an issue) it decides which configured workflows are triggered and which
//! of their actions should fire.
//!
//! ## Pipeline
//!
//! ```text
//! event
//!   ↓ resolve detector + environment
//! enabled workflows for the detector
//!   ↓ trigger groups (fast conditions now, slow ones deferred to the buffer)
//! triggered workflows
//!   ↓ action-filter groups (same fast/slow split)
//! passed action filters → actions
//!   ↓ debounce per (action, issue group)
//! dispatch to the task queue + fire history
//! ```
//!
//! ## Core Components
//!
//! - [`ConditionHandlerRegistry`]: typed registry of condition handlers,
//!   built once at startup and shared by `Arc`
//! - [`engine::group_evaluator`]: pure evaluation of a condition list under
//!   a logic type
//! - [`engine::scheduler`]: fast/slow split and deferred-work enqueue
//! - [`WorkflowProcessor`]: the top-level `process_workflows` entry point
//!
//! ## Collaborators
//!
//! Storage, the delayed-processing buffer, the fire-history store and the task
//! queue are traits ([`WorkflowStorage`], [`DelayedWorkflowBuffer`],
//! [`FireHistoryStore`], [`TaskQueue`]). In-memory implementations ship with
//! the crate for tests, demos and single-process deployments.
//!
//! ## Rust Learning Notes:
//!
//! ### Re-exports
//! `pub use` statements create shortcuts so users don't need to know the
//! internal module structure. Instead of
//! `use workflow_engine::engine::processor::WorkflowProcessor`, users can
//! write `use workflow_engine::WorkflowProcessor`.

// Core domain models: configuration entities and event payloads
pub mod models;

// Evaluation pipeline and collaborator abstractions
pub mod engine;

// Engine settings loaded from file + environment
pub mod config;

// JSON configuration + event fixtures for replay and demos
pub mod fixture;

#[cfg(test)]
pub(crate) mod testing;

pub use config::EngineConfig;
pub use engine::{
    buffer::{DelayedWorkflowBuffer, InMemoryBuffer},
    dispatch::{ChannelTaskQueue, DispatchReport, Dispatcher, TaskQueue, TriggerActionTask},
    fire_history::{FireHistoryEntry, FireHistoryStore, InMemoryFireHistory},
    metrics::EngineMetrics,
    processor::WorkflowProcessor,
    registry::{ConditionHandler, ConditionHandlerRegistry, ConditionInput},
    storage::{InMemoryStorage, WorkflowStorage},
};

use thiserror::Error;

/// Error types for workflow engine operations
///
/// ## Rust Learning Notes:
///
/// ### The `thiserror` Crate
/// - `#[derive(Error)]` implements the `std::error::Error` trait
/// - `#[error("...")]` provides human-readable error messages
/// - `#[from]` enables automatic conversion from other error types, so `?`
///   works on storage, JSON and config results directly
#[derive(Error, Debug)]
pub enum WorkflowEngineError {
    /// A condition references a type no handler is registered for.
    /// This is corrupted configuration and is never retried.
    #[error("No handler registered for condition type '{condition_type}'")]
    UnregisteredConditionType { condition_type: String },

    /// A condition's comparison does not match its type's schema
    #[error("Invalid comparison for {condition_type} condition {condition_id}: {reason}")]
    InvalidComparison {
        condition_id: i64,
        condition_type: String,
        reason: String,
    },

    /// A slow condition was asked to evaluate an event instead of an
    /// aggregate value
    #[error("Condition type '{condition_type}' needs an aggregate value and cannot evaluate an event")]
    SlowConditionRequiresAggregate { condition_type: String },

    #[error("Detector not found for event {event}")]
    DetectorNotFound { event: String },

    #[error("Environment not found: {name}")]
    EnvironmentNotFound { name: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Storage, buffer and fire-history backend errors
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    /// The task queue refused a task
    #[error("Dispatch error: {0}")]
    Dispatch(String),
}

impl WorkflowEngineError {
    /// Resolution misses are expected races (a detector or environment was
    /// deleted between ingestion and processing), not failures
    pub fn is_resolution_miss(&self) -> bool {
        matches!(
            self,
            WorkflowEngineError::DetectorNotFound { .. }
                | WorkflowEngineError::EnvironmentNotFound { .. }
        )
    }

    /// Configuration errors are fatal and must not be retried
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            WorkflowEngineError::UnregisteredConditionType { .. }
                | WorkflowEngineError::InvalidComparison { .. }
                | WorkflowEngineError::SlowConditionRequiresAggregate { .. }
        )
    }
}

/// Type alias for Results that use our custom error type
pub type Result<T> = std::result::Result<T, WorkflowEngineError>;
