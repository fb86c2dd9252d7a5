//! Worker registry, task dispatch, and health monitoring for Taskmesh.
//!
//! Workers are opaque HTTP services exposing `POST /execute` and
//! `GET /health`. This crate resolves logical capabilities to live endpoints,
//! dispatches single tasks with hard timeouts, and runs the background
//! health and optimization loop.
//!
//! # Main types
//!
//! - [`WorkerRegistry`] — capability-to-endpoint directory with liveness state.
//! - [`TaskDispatcher`] / [`Dispatch`] — single-task dispatch and its trait seam.
//! - [`HealthMonitor`] — periodic probes plus optimization hooks.

/// Single-task HTTP dispatch.
pub mod dispatcher;
/// Health probe and optimization loop.
pub mod health;
/// Worker directory.
pub mod registry;

pub use dispatcher::{Dispatch, TaskDispatcher};
pub use health::{HealthConfig, HealthMonitor, HealthSnapshot, OptimizationHook};
pub use registry::{WorkerRegistry, WorkerSnapshot};
