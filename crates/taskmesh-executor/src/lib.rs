//! Workflow execution for Taskmesh.
//!
//! Drives a planned workflow against the task dispatcher: parallel
//! wave-at-a-time or sequential dependency order, with optional-step
//! semantics, halt-on-required-failure, and partial-result aggregation.

/// Workflow run state machine and aggregation.
pub mod executor;

pub use executor::{ExecutionMode, WorkflowExecutor};
