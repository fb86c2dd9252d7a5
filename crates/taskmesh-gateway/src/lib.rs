//! HTTP surface for the Taskmesh orchestration core.
//!
//! Exposes aggregate health, the worker registry snapshot, direct single-task
//! dispatch, workflow planning, and workflow execution over axum.

/// Route handlers and error-to-status mapping.
pub mod handlers;
/// Router construction and shared state.
pub mod server;

pub use server::{AppState, GatewayServer};
