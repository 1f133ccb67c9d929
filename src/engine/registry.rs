// Condition handler registry - typed dispatch from condition type to evaluator

//! # Condition Handler Registry
//!
//! Every [`ConditionType`] is evaluated by a [`ConditionHandler`]. The
//! [`ConditionHandlerRegistry`] maps types to handlers and is the only way the
//! engine evaluates a condition.
//!
//! ## Lifecycle
//!
//! The registry is built once at process startup
//! ([`ConditionHandlerRegistry::with_default_handlers`]), wrapped in an `Arc`
//! and handed to every component that evaluates conditions. There is no
//! global registry: tests build their own, and a deployment can register
//! extra handlers before sharing it.
//!
//! ## Failure Policy
//!
//! Looking up a type with no handler is a configuration error
//! ([`WorkflowEngineError::UnregisteredConditionType`]), never a silent skip.
//! A condition that cannot be evaluated indicates corrupted configuration.
//!
//! ## Rust Learning Notes:
//!
//! ### Trait Objects in a HashMap
//! `HashMap<ConditionType, Arc<dyn ConditionHandler>>` stores different
//! handler structs behind one interface. `Arc` lets the registry be cloned
//! cheaply and lets the same handler instance back several types.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use super::handlers;
use crate::models::{
    ConditionOutcome, ConditionType, DataCondition, DataConditionGroup, Workflow,
    WorkflowEventContext,
};
use crate::{Result, WorkflowEngineError};

/// What a condition is evaluated against
///
/// Workflow evaluation always passes an [`ConditionInput::Event`]. A raw
/// [`ConditionInput::Value`] is used for threshold-style evaluation and by the
/// batch processor, which hands slow conditions their aggregate value.
#[derive(Debug, Clone, Copy)]
pub enum ConditionInput<'a> {
    Value(&'a Value),
    Event(WorkflowEventContext<'a>),
}

impl<'a> ConditionInput<'a> {
    pub fn event(&self) -> Option<WorkflowEventContext<'a>> {
        match self {
            ConditionInput::Event(ctx) => Some(*ctx),
            ConditionInput::Value(_) => None,
        }
    }
}

/// Errors a handler reports without knowing which condition it evaluates.
/// The registry attaches the condition id and type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    #[error("{0}")]
    InvalidComparison(String),

    #[error("an event context is required")]
    RequiresEvent,

    #[error("an aggregate value is required")]
    RequiresAggregate,
}

impl HandlerError {
    fn into_engine_error(self, condition: &DataCondition) -> WorkflowEngineError {
        match self {
            HandlerError::InvalidComparison(reason) => WorkflowEngineError::InvalidComparison {
                condition_id: condition.id.get(),
                condition_type: condition.condition_type.to_string(),
                reason,
            },
            HandlerError::RequiresEvent => WorkflowEngineError::InvalidInput(format!(
                "condition {} ({}) requires an event context",
                condition.id, condition.condition_type
            )),
            HandlerError::RequiresAggregate => {
                WorkflowEngineError::SlowConditionRequiresAggregate {
                    condition_type: condition.condition_type.to_string(),
                }
            }
        }
    }
}

pub type HandlerResult<T> = std::result::Result<T, HandlerError>;

/// Common evaluation interface for every condition type
///
/// Handlers are stateless and must be `Send + Sync` so one registry can be
/// shared across async tasks.
pub trait ConditionHandler: Send + Sync {
    /// Slow handlers need an aggregate query and are deferred to the batch
    /// processor instead of being evaluated inline.
    fn is_slow(&self) -> bool {
        false
    }

    /// Check that a comparison has the shape this handler expects
    fn validate_comparison(&self, comparison: &Value) -> HandlerResult<()>;

    /// Decide whether the condition passes for `input`
    fn evaluate(&self, input: ConditionInput<'_>, comparison: &Value) -> HandlerResult<bool>;
}

/// Registry of condition handlers keyed by condition type
#[derive(Clone, Default)]
pub struct ConditionHandlerRegistry {
    handlers: HashMap<ConditionType, Arc<dyn ConditionHandler>>,
}

impl std::fmt::Debug for ConditionHandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types = self.registered_types();
        types.sort();
        f.debug_struct("ConditionHandlerRegistry")
            .field("types", &types)
            .finish()
    }
}

impl ConditionHandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Create a registry with a handler for every built-in condition type
    pub fn with_default_handlers() -> Self {
        let mut registry = Self::new();
        handlers::register_defaults(&mut registry);
        registry
    }

    /// Register (or replace) the handler for a type
    pub fn register(&mut self, condition_type: ConditionType, handler: Arc<dyn ConditionHandler>) {
        self.handlers.insert(condition_type, handler);
    }

    pub fn remove(&mut self, condition_type: ConditionType) -> Option<Arc<dyn ConditionHandler>> {
        self.handlers.remove(&condition_type)
    }

    pub fn is_registered(&self, condition_type: ConditionType) -> bool {
        self.handlers.contains_key(&condition_type)
    }

    pub fn registered_types(&self) -> Vec<ConditionType> {
        self.handlers.keys().copied().collect()
    }

    /// Look up the handler for a type, failing on unknown types
    pub fn handler(&self, condition_type: ConditionType) -> Result<&dyn ConditionHandler> {
        self.handlers
            .get(&condition_type)
            .map(|handler| handler.as_ref())
            .ok_or_else(|| WorkflowEngineError::UnregisteredConditionType {
                condition_type: condition_type.to_string(),
            })
    }

    pub fn is_slow(&self, condition: &DataCondition) -> Result<bool> {
        Ok(self.handler(condition.condition_type)?.is_slow())
    }

    /// Partition conditions into (fast, slow), preserving configured order
    pub fn split_conditions_by_speed<'c>(
        &self,
        conditions: &'c [DataCondition],
    ) -> Result<(Vec<&'c DataCondition>, Vec<&'c DataCondition>)> {
        let mut fast = Vec::new();
        let mut slow = Vec::new();
        for condition in conditions {
            if self.is_slow(condition)? {
                slow.push(condition);
            } else {
                fast.push(condition);
            }
        }
        Ok((fast, slow))
    }

    /// Evaluate one condition, producing its outcome
    pub fn evaluate(
        &self,
        condition: &DataCondition,
        input: ConditionInput<'_>,
    ) -> Result<ConditionOutcome> {
        let handler = self.handler(condition.condition_type)?;
        let passed = handler
            .evaluate(input, &condition.comparison)
            .map_err(|e| e.into_engine_error(condition))?;

        Ok(if passed {
            ConditionOutcome::passed(condition.condition_result)
        } else {
            ConditionOutcome::failed()
        })
    }

    /// Validate a condition's type and comparison (write-time check)
    pub fn validate_condition(&self, condition: &DataCondition) -> Result<()> {
        self.handler(condition.condition_type)?
            .validate_comparison(&condition.comparison)
            .map_err(|e| e.into_engine_error(condition))
    }

    pub fn validate_group(&self, group: &DataConditionGroup) -> Result<()> {
        for condition in &group.conditions {
            if condition.condition_group_id != group.id {
                return Err(WorkflowEngineError::InvalidInput(format!(
                    "condition {} belongs to group {} but is listed in group {}",
                    condition.id, condition.condition_group_id, group.id
                )));
            }
            self.validate_condition(condition)?;
        }
        Ok(())
    }

    pub fn validate_workflow(&self, workflow: &Workflow) -> Result<()> {
        if let Some(group) = &workflow.when_condition_group {
            self.validate_group(group)?;
        }
        if let Some(frequency) = workflow.config.frequency {
            if frequency < 0 {
                return Err(WorkflowEngineError::InvalidInput(format!(
                    "workflow {} has a negative frequency ({})",
                    workflow.id, frequency
                )));
            }
        }
        Ok(())
    }
}
