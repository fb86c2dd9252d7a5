use crate::cache::{cache_key, PlanCache};
use crate::critical_path::CriticalPath;
use crate::graph::DependencyGraph;
use crate::waves::compute_waves;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use taskmesh_core::{MeshResult, Priority, Step, WorkflowStore};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// How hard the planner works at producing optimization suggestions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationLevel {
    /// Validation and scheduling only; no suggestions.
    Basic,
    /// Structural heuristics (sequential chains, capability spread).
    #[default]
    Standard,
    /// Standard plus slack analysis from the critical-path distance map.
    Aggressive,
}

/// Caller-supplied constraints checked during planning.
///
/// Constraint violations never abort planning; the plan comes back with
/// `validations.valid = false` and itemized messages, and the caller decides
/// whether to proceed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanConstraints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_capabilities: Vec<String>,
}

/// Result of constraint validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanValidation {
    pub valid: bool,
    pub messages: Vec<String>,
}

/// Predicted resource usage, summed per capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcePrediction {
    /// Weighted load per capability (priority-scaled step counts).
    pub per_capability: HashMap<String, f64>,
    pub total_weight: f64,
    /// Largest wave size: how many workers the plan can keep busy at once.
    pub peak_parallelism: usize,
}

/// Optimistic / likely / pessimistic duration estimates in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeEstimate {
    pub optimistic_ms: u64,
    pub likely_ms: u64,
    pub pessimistic_ms: u64,
}

/// Cached, versioned scheduling artifact for one `(workflow, parameters,
/// constraints)` combination. Immutable once published into the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub workflow_id: String,
    /// Waves of step ids eligible to run together, in execution order.
    pub phases: Vec<Vec<String>>,
    pub critical_path: CriticalPath,
    pub resource_prediction: ResourcePrediction,
    pub time_estimate: TimeEstimate,
    pub validations: PlanValidation,
    pub suggestions: Vec<String>,
    pub cached: bool,
    pub cache_age_ms: u64,
    pub cached_at: DateTime<Utc>,
    pub cache_key: String,
}

#[cfg(test)]
impl ExecutionPlan {
    pub(crate) fn stub_for_tests(workflow_id: &str) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            phases: vec![],
            critical_path: CriticalPath {
                path: vec![],
                total_duration_ms: 0,
                distances: HashMap::new(),
                topological_order: vec![],
            },
            resource_prediction: ResourcePrediction {
                per_capability: HashMap::new(),
                total_weight: 0.0,
                peak_parallelism: 0,
            },
            time_estimate: TimeEstimate {
                optimistic_ms: 0,
                likely_ms: 0,
                pessimistic_ms: 0,
            },
            validations: PlanValidation {
                valid: true,
                messages: vec![],
            },
            suggestions: vec![],
            cached: false,
            cache_age_ms: 0,
            cached_at: Utc::now(),
            cache_key: String::new(),
        }
    }
}

fn priority_weight(priority: Priority) -> f64 {
    match priority {
        Priority::Low => 0.5,
        Priority::Medium => 1.0,
        Priority::High => 1.5,
        Priority::Critical => 2.0,
    }
}

/// Turns workflow definitions into cached, parallel-aware execution plans.
pub struct ExecutionPlanner {
    workflows: Arc<WorkflowStore>,
    cache: RwLock<PlanCache>,
}

impl ExecutionPlanner {
    pub fn new(workflows: Arc<WorkflowStore>) -> Self {
        Self {
            workflows,
            cache: RwLock::new(PlanCache::default()),
        }
    }

    pub fn with_ttl(workflows: Arc<WorkflowStore>, ttl: Duration) -> Self {
        Self {
            workflows,
            cache: RwLock::new(PlanCache::new(ttl)),
        }
    }

    /// Produce (or reuse) the execution plan for a workflow.
    ///
    /// Cache hits within the TTL come back tagged `cached = true`; everything
    /// else runs the full pipeline: graph build and cycle check, critical
    /// path, wave layering, resource prediction, time estimation, constraint
    /// validation, and suggestion heuristics.
    pub async fn plan(
        &self,
        workflow_id: &str,
        parameters: &Value,
        constraints: &PlanConstraints,
        level: OptimizationLevel,
    ) -> MeshResult<ExecutionPlan> {
        let constraints_json = serde_json::to_value(constraints)?;
        let key = cache_key(workflow_id, parameters, &constraints_json);

        if let Some(hit) = self.cache.write().await.get(&key) {
            debug!(workflow_id, cache_key = %key, age_ms = hit.cache_age_ms, "Plan cache hit");
            return Ok(hit);
        }

        let workflow = self.workflows.get(workflow_id)?;
        let steps = &workflow.steps;

        let graph = DependencyGraph::build(steps)?;
        let critical_path = CriticalPath::analyze(&graph, steps)?;
        let phases = compute_waves(steps)?;

        let resource_prediction = predict_resources(steps, &phases);
        let time_estimate = estimate_time(steps, &phases, &critical_path);
        let validations = validate_constraints(steps, &time_estimate, constraints);
        let suggestions = suggest(steps, &phases, &critical_path, level);

        let plan = ExecutionPlan {
            workflow_id: workflow_id.to_string(),
            phases,
            critical_path,
            resource_prediction,
            time_estimate,
            validations,
            suggestions,
            cached: false,
            cache_age_ms: 0,
            cached_at: Utc::now(),
            cache_key: key.clone(),
        };

        info!(
            workflow_id,
            phases = plan.phases.len(),
            critical_path_ms = plan.critical_path.total_duration_ms,
            valid = plan.validations.valid,
            "Execution plan computed"
        );

        self.cache.write().await.insert(key, plan.clone());
        Ok(plan)
    }

    /// Evict expired cache entries. Wired into the optimization loop.
    pub async fn sweep_cache(&self) -> usize {
        let evicted = self.cache.write().await.sweep();
        if evicted > 0 {
            info!(evicted, "Plan cache sweep");
        }
        evicted
    }

    /// Number of live cached plans.
    pub async fn cached_plans(&self) -> usize {
        self.cache.read().await.len()
    }
}

fn predict_resources(steps: &[Step], phases: &[Vec<String>]) -> ResourcePrediction {
    let mut per_capability: HashMap<String, f64> = HashMap::new();
    let mut total_weight = 0.0;
    for step in steps {
        let weight = priority_weight(step.priority);
        *per_capability.entry(step.capability.clone()).or_insert(0.0) += weight;
        total_weight += weight;
    }
    ResourcePrediction {
        per_capability,
        total_weight,
        peak_parallelism: phases.iter().map(Vec::len).max().unwrap_or(0),
    }
}

fn estimate_time(steps: &[Step], phases: &[Vec<String>], cp: &CriticalPath) -> TimeEstimate {
    let sequential_ms: u64 = steps.iter().map(|s| s.estimated_duration_ms).sum();
    // With any wave wider than one step, the schedule is bounded by the
    // critical path; a pure chain degenerates to the sequential sum.
    let base = if phases.iter().any(|w| w.len() > 1) {
        cp.total_duration_ms
    } else {
        sequential_ms
    };
    TimeEstimate {
        optimistic_ms: (base as f64 * 0.8) as u64,
        likely_ms: base,
        pessimistic_ms: (base as f64 * 1.5) as u64,
    }
}

fn validate_constraints(
    steps: &[Step],
    estimate: &TimeEstimate,
    constraints: &PlanConstraints,
) -> PlanValidation {
    let mut messages = Vec::new();

    if let Some(max) = constraints.max_duration_ms {
        if estimate.likely_ms > max {
            messages.push(format!(
                "likely duration {}ms exceeds max_duration_ms {max}ms",
                estimate.likely_ms
            ));
        }
    }

    for required in &constraints.required_capabilities {
        if !steps.iter().any(|s| &s.capability == required) {
            messages.push(format!(
                "required capability '{required}' is not targeted by any step"
            ));
        }
    }

    PlanValidation {
        valid: messages.is_empty(),
        messages,
    }
}

fn suggest(
    steps: &[Step],
    phases: &[Vec<String>],
    cp: &CriticalPath,
    level: OptimizationLevel,
) -> Vec<String> {
    if level == OptimizationLevel::Basic {
        return Vec::new();
    }

    let mut suggestions = Vec::new();

    let sequential_steps = phases.iter().filter(|w| w.len() == 1).count();
    if sequential_steps > 3 {
        suggestions.push(format!(
            "{sequential_steps} steps run strictly sequentially; consider loosening dependencies to parallelize"
        ));
    }

    let mut capabilities: Vec<&str> = steps.iter().map(|s| s.capability.as_str()).collect();
    capabilities.sort_unstable();
    capabilities.dedup();
    if capabilities.len() > 5 {
        suggestions.push(format!(
            "workflow spans {} capabilities; coordination overhead may dominate",
            capabilities.len()
        ));
    }

    if level == OptimizationLevel::Aggressive {
        let slack = cp.slack(steps);
        for step in steps {
            let s = slack.get(&step.id).copied().unwrap_or(0);
            if cp.total_duration_ms > 0 && s * 4 > cp.total_duration_ms {
                suggestions.push(format!(
                    "step '{}' has {s}ms of slack; it can be deferred without extending the critical path",
                    step.id
                ));
            }
        }
    }

    suggestions
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskmesh_core::{MeshError, WorkflowDefinition};

    fn store_with_launch_workflow() -> Arc<WorkflowStore> {
        let workflow = WorkflowDefinition::new("launch", "Product launch", "marketing")
            .with_step(Step::new("research", "Market research", "researcher", 300_000))
            .with_step(
                Step::new("draft", "Draft copy", "writer", 600_000)
                    .with_dependencies(vec!["research".into()])
                    .parallelizable(),
            )
            .with_step(
                Step::new("design", "Design assets", "designer", 900_000)
                    .with_dependencies(vec!["research".into()])
                    .parallelizable(),
            )
            .with_step(
                Step::new("qa", "Review", "qa", 180_000)
                    .with_dependencies(vec!["draft".into(), "design".into()]),
            );
        let mut store = WorkflowStore::new();
        store.register(workflow).unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let planner = ExecutionPlanner::new(store_with_launch_workflow());
        let plan = planner
            .plan(
                "launch",
                &json!({}),
                &PlanConstraints::default(),
                OptimizationLevel::Standard,
            )
            .await
            .unwrap();

        assert_eq!(
            plan.phases,
            vec![
                vec!["research".to_string()],
                vec!["design".to_string(), "draft".to_string()],
                vec!["qa".to_string()],
            ]
        );
        assert_eq!(plan.critical_path.path, vec!["research", "design", "qa"]);
        assert_eq!(plan.critical_path.total_duration_ms, 1_380_000);
        assert_eq!(plan.time_estimate.likely_ms, 1_380_000);
        assert_eq!(plan.time_estimate.optimistic_ms, 1_104_000);
        assert_eq!(plan.time_estimate.pessimistic_ms, 2_070_000);
        assert!(plan.validations.valid);
        assert!(!plan.cached);
    }

    #[tokio::test]
    async fn test_unknown_workflow_is_not_found() {
        let planner = ExecutionPlanner::new(Arc::new(WorkflowStore::new()));
        let err = planner
            .plan(
                "ghost",
                &json!({}),
                &PlanConstraints::default(),
                OptimizationLevel::Standard,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MeshError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cyclic_workflow_fails_validation() {
        let workflow = WorkflowDefinition::new("cyclic", "Cyclic", "test")
            .with_step(Step::new("a", "A", "w", 100).with_dependencies(vec!["b".into()]))
            .with_step(Step::new("b", "B", "w", 100).with_dependencies(vec!["a".into()]));
        let mut store = WorkflowStore::new();
        store.register(workflow).unwrap();

        let planner = ExecutionPlanner::new(Arc::new(store));
        let err = planner
            .plan(
                "cyclic",
                &json!({}),
                &PlanConstraints::default(),
                OptimizationLevel::Standard,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MeshError::Validation(_)));
    }

    #[tokio::test]
    async fn test_cache_hit_and_parameter_isolation() {
        let planner = ExecutionPlanner::new(store_with_launch_workflow());
        let constraints = PlanConstraints::default();

        let first = planner
            .plan("launch", &json!({"a": 1}), &constraints, OptimizationLevel::Standard)
            .await
            .unwrap();
        let second = planner
            .plan("launch", &json!({"a": 1}), &constraints, OptimizationLevel::Standard)
            .await
            .unwrap();
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.cache_key, second.cache_key);
        assert_eq!(first.phases, second.phases);
        assert_eq!(
            first.critical_path.total_duration_ms,
            second.critical_path.total_duration_ms
        );

        let other = planner
            .plan("launch", &json!({"a": 2}), &constraints, OptimizationLevel::Standard)
            .await
            .unwrap();
        assert!(!other.cached);
        assert_ne!(other.cache_key, first.cache_key);
        assert_eq!(planner.cached_plans().await, 2);
    }

    #[tokio::test]
    async fn test_constraint_violations_are_non_fatal() {
        let planner = ExecutionPlanner::new(store_with_launch_workflow());
        let constraints = PlanConstraints {
            max_duration_ms: Some(1_000),
            required_capabilities: vec!["translator".into()],
        };
        let plan = planner
            .plan("launch", &json!({}), &constraints, OptimizationLevel::Standard)
            .await
            .unwrap();
        assert!(!plan.validations.valid);
        assert_eq!(plan.validations.messages.len(), 2);
        assert!(plan.validations.messages[1].contains("translator"));
    }

    #[tokio::test]
    async fn test_sequential_chain_suggestion() {
        let mut wf = WorkflowDefinition::new("chain", "Chain", "test");
        let mut prev: Option<String> = None;
        for i in 0..5 {
            let id = format!("s{i}");
            let mut step = Step::new(&id, &id, "w", 1_000);
            if let Some(p) = prev {
                step = step.with_dependencies(vec![p]);
            }
            wf = wf.with_step(step);
            prev = Some(id);
        }
        let mut store = WorkflowStore::new();
        store.register(wf).unwrap();

        let planner = ExecutionPlanner::new(Arc::new(store));
        let plan = planner
            .plan("chain", &json!({}), &PlanConstraints::default(), OptimizationLevel::Standard)
            .await
            .unwrap();
        assert!(plan
            .suggestions
            .iter()
            .any(|s| s.contains("strictly sequentially")));
        // A pure chain estimates against the sequential sum.
        assert_eq!(plan.time_estimate.likely_ms, 5_000);
    }

    #[tokio::test]
    async fn test_basic_level_skips_suggestions() {
        let planner = ExecutionPlanner::new(store_with_launch_workflow());
        let plan = planner
            .plan("launch", &json!({}), &PlanConstraints::default(), OptimizationLevel::Basic)
            .await
            .unwrap();
        assert!(plan.suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_resource_prediction_counts_capabilities() {
        let planner = ExecutionPlanner::new(store_with_launch_workflow());
        let plan = planner
            .plan("launch", &json!({}), &PlanConstraints::default(), OptimizationLevel::Standard)
            .await
            .unwrap();
        assert_eq!(plan.resource_prediction.per_capability.len(), 4);
        assert_eq!(plan.resource_prediction.peak_parallelism, 2);
        assert!((plan.resource_prediction.total_weight - 4.0).abs() < f64::EPSILON);
    }
}
