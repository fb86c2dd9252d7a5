//! Shared types and primitives for the Taskmesh orchestration core.
//!
//! Taskmesh coordinates work across a population of independently deployed
//! worker services: it resolves step dependencies, computes execution order,
//! dispatches work over HTTP with bounded timeouts, and aggregates partial
//! results under failure.
//!
//! # Main types
//!
//! - [`Step`] / [`WorkflowDefinition`] — declarative workflow templates.
//! - [`WorkerHandle`] — registry entry resolving a capability to an endpoint.
//! - [`TaskExecutionRecord`] / [`WorkflowExecutionResult`] — dispatch and run outcomes.
//! - [`MeshError`] — the error taxonomy shared by all crates.
//! - [`RollingStat`] — the exponential-moving-average used for worker metrics.

/// Error taxonomy and result alias.
pub mod error;
/// Rolling statistics (EMA latency and success-rate tracking).
pub mod stats;
/// Shared data model (steps, workflows, workers, results).
pub mod types;
/// Immutable workflow definition store.
pub mod workflow;

pub use error::{MeshError, MeshResult};
pub use stats::{RollingStat, WorkerStats, DEFAULT_ALPHA};
pub use types::{
    Priority, RunStatus, Step, StepOutcome, StepResult, TaskExecutionRecord, WorkerHandle,
    WorkerStatus, WorkflowDefinition, WorkflowExecutionResult,
};
pub use workflow::WorkflowStore;
