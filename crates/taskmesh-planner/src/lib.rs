//! Dependency analysis and execution planning for Taskmesh workflows.
//!
//! Turns a declarative [`taskmesh_core::WorkflowDefinition`] into an ordered,
//! parallel-aware [`ExecutionPlan`]: dependency graph with cycle detection,
//! critical-path analysis, wave layering, resource and time estimation, and a
//! TTL plan cache.
//!
//! # Main types
//!
//! - [`DependencyGraph`] — adjacency and cycle validation over step ids.
//! - [`CriticalPath`] — longest-chain analysis via Kahn's algorithm.
//! - [`ExecutionPlanner`] — the cached planning pipeline.
//! - [`PlanCache`] — TTL cache of published plans.

/// Plan cache with TTL eviction and sha256 cache keys.
pub mod cache;
/// Critical-path (longest chain) analysis.
pub mod critical_path;
/// Dependency graph construction and cycle detection.
pub mod graph;
/// Execution planner pipeline.
pub mod planner;
/// Parallel wave layering.
pub mod waves;

pub use cache::{cache_key, PlanCache, DEFAULT_PLAN_TTL};
pub use critical_path::CriticalPath;
pub use graph::DependencyGraph;
pub use planner::{
    ExecutionPlan, ExecutionPlanner, OptimizationLevel, PlanConstraints, PlanValidation,
    ResourcePrediction, TimeEstimate,
};
pub use waves::compute_waves;
