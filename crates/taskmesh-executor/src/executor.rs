use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskmesh_core::{
    MeshResult, RunStatus, Step, StepOutcome, StepResult, WorkflowDefinition,
    WorkflowExecutionResult, WorkflowStore,
};
use taskmesh_planner::{ExecutionPlanner, OptimizationLevel, PlanConstraints};
use taskmesh_registry::Dispatch;
use tracing::{info, warn};
use uuid::Uuid;

/// How a workflow's steps are driven against the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Wave-at-a-time: every step in a wave is dispatched concurrently, and
    /// the next wave never starts before all outcomes of the current one are
    /// known.
    #[default]
    Parallel,
    /// One step at a time in dependency order, halting on the first
    /// non-optional failure.
    Sequential,
}

/// Executes named workflows against the task dispatcher, honoring the
/// execution plan's ordering, optional-step semantics, and partial-failure
/// aggregation.
///
/// Each invocation is an independent run with a fresh run id; deduplication,
/// retries, and failover are caller policy, not this layer's.
pub struct WorkflowExecutor {
    workflows: Arc<WorkflowStore>,
    planner: Arc<ExecutionPlanner>,
    dispatcher: Arc<dyn Dispatch>,
}

impl WorkflowExecutor {
    pub fn new(
        workflows: Arc<WorkflowStore>,
        planner: Arc<ExecutionPlanner>,
        dispatcher: Arc<dyn Dispatch>,
    ) -> Self {
        Self {
            workflows,
            planner,
            dispatcher,
        }
    }

    /// Run a workflow end to end: Planning, Dispatching, Aggregating.
    ///
    /// Plan validation failures (unknown workflow, cycles, dangling
    /// dependencies) surface as errors before any dispatch. Per-step dispatch
    /// failures are folded into the result list; partial results are always
    /// returned.
    pub async fn run(
        &self,
        workflow_id: &str,
        parameters: &Value,
        mode: ExecutionMode,
        step_timeout: Duration,
    ) -> MeshResult<WorkflowExecutionResult> {
        let run_id = Uuid::new_v4();
        let start = Instant::now();

        info!(workflow_id, run_id = %run_id, ?mode, "Workflow run: planning");
        let plan = self
            .planner
            .plan(
                workflow_id,
                parameters,
                &PlanConstraints::default(),
                OptimizationLevel::Basic,
            )
            .await?;
        let workflow = self.workflows.get(workflow_id)?;

        info!(
            workflow_id,
            run_id = %run_id,
            phases = plan.phases.len(),
            "Workflow run: dispatching"
        );
        let results = match mode {
            ExecutionMode::Parallel => {
                self.run_parallel(workflow, run_id, &plan.phases, parameters, step_timeout)
                    .await
            }
            ExecutionMode::Sequential => {
                self.run_sequential(
                    workflow,
                    run_id,
                    &plan.critical_path.topological_order,
                    parameters,
                    step_timeout,
                )
                .await
            }
        };

        let result = aggregate(workflow, workflow_id, run_id, results, start.elapsed());
        info!(
            workflow_id,
            run_id = %run_id,
            status = ?result.status,
            success_rate = result.success_rate,
            duration_ms = result.duration_ms,
            "Workflow run finished"
        );
        Ok(result)
    }

    /// Wave-at-a-time execution. A failing step never cancels its siblings;
    /// its dependents in later waves are marked skipped instead of dispatched.
    async fn run_parallel(
        &self,
        workflow: &WorkflowDefinition,
        run_id: Uuid,
        phases: &[Vec<String>],
        parameters: &Value,
        step_timeout: Duration,
    ) -> Vec<StepResult> {
        let mut results: Vec<StepResult> = Vec::with_capacity(workflow.steps.len());
        let mut succeeded: HashMap<String, bool> = HashMap::new();

        for wave in phases {
            let mut dispatchable: Vec<&Step> = Vec::new();
            for step_id in wave {
                let Some(step) = workflow.step(step_id) else {
                    continue;
                };
                if required_deps_met(workflow, step, &succeeded) {
                    dispatchable.push(step);
                } else {
                    succeeded.insert(step.id.clone(), false);
                    results.push(StepResult {
                        step_id: step.id.clone(),
                        outcome: StepOutcome::SkippedDependencyFailed,
                    });
                }
            }

            // Join the whole wave before moving on: wave N+1 never starts
            // before every outcome of wave N is known.
            let outcomes = join_all(dispatchable.iter().map(|&step| {
                let payload = step_payload(workflow, run_id, step, parameters);
                async move {
                    (
                        step.id.clone(),
                        self.dispatch_step(step, payload, step_timeout).await,
                    )
                }
            }))
            .await;

            for (step_id, outcome) in outcomes {
                succeeded.insert(step_id.clone(), outcome.is_success());
                results.push(StepResult { step_id, outcome });
            }
        }

        results
    }

    /// Step-at-a-time execution in dependency order. The first non-optional
    /// failure halts the run; every remaining step is marked skipped.
    async fn run_sequential(
        &self,
        workflow: &WorkflowDefinition,
        run_id: Uuid,
        order: &[String],
        parameters: &Value,
        step_timeout: Duration,
    ) -> Vec<StepResult> {
        let mut results: Vec<StepResult> = Vec::with_capacity(order.len());
        let mut succeeded: HashMap<String, bool> = HashMap::new();
        let mut halted = false;

        for step_id in order {
            let Some(step) = workflow.step(step_id) else {
                continue;
            };

            if halted || !required_deps_met(workflow, step, &succeeded) {
                succeeded.insert(step.id.clone(), false);
                results.push(StepResult {
                    step_id: step.id.clone(),
                    outcome: StepOutcome::SkippedDependencyFailed,
                });
                continue;
            }

            let payload = step_payload(workflow, run_id, step, parameters);
            let outcome = self.dispatch_step(step, payload, step_timeout).await;
            let ok = outcome.is_success();
            succeeded.insert(step.id.clone(), ok);
            if !ok && !step.optional {
                warn!(
                    run_id = %run_id,
                    step_id = %step.id,
                    "Non-optional step failed; halting sequential run"
                );
                halted = true;
            }
            results.push(StepResult {
                step_id: step.id.clone(),
                outcome,
            });
        }

        results
    }

    /// Dispatch one step, folding every dispatch-path error into an outcome.
    async fn dispatch_step(&self, step: &Step, payload: Value, timeout: Duration) -> StepOutcome {
        match self
            .dispatcher
            .dispatch(&step.capability, payload, timeout)
            .await
        {
            Ok(record) if record.success => StepOutcome::Success {
                result: record.payload.unwrap_or(Value::Null),
            },
            Ok(record) => StepOutcome::Failed {
                error: record
                    .error
                    .unwrap_or_else(|| "dispatch failed".to_string()),
            },
            Err(e) => StepOutcome::Failed {
                error: e.to_string(),
            },
        }
    }
}

/// A step may be dispatched when every *non-optional* dependency succeeded.
/// Optional dependencies only need to have resolved; their outcome is
/// irrelevant.
fn required_deps_met(
    workflow: &WorkflowDefinition,
    step: &Step,
    succeeded: &HashMap<String, bool>,
) -> bool {
    step.depends_on.iter().all(|dep_id| {
        let dep_optional = workflow.step(dep_id).map(|d| d.optional).unwrap_or(false);
        dep_optional || succeeded.get(dep_id).copied().unwrap_or(false)
    })
}

fn step_payload(
    workflow: &WorkflowDefinition,
    run_id: Uuid,
    step: &Step,
    parameters: &Value,
) -> Value {
    json!({
        "task": step.name,
        "step_id": step.id,
        "workflow_id": workflow.id,
        "run_id": run_id,
        "priority": step.priority,
        "parameters": parameters,
    })
}

fn aggregate(
    workflow: &WorkflowDefinition,
    workflow_id: &str,
    run_id: Uuid,
    steps: Vec<StepResult>,
    elapsed: Duration,
) -> WorkflowExecutionResult {
    let attempted = steps.iter().filter(|r| r.outcome.was_attempted()).count();
    let succeeded = steps.iter().filter(|r| r.outcome.is_success()).count();
    let success_rate = if attempted == 0 {
        0.0
    } else {
        succeeded as f64 / attempted as f64
    };

    let all_required_ok = workflow
        .steps
        .iter()
        .filter(|s| !s.optional)
        .all(|s| {
            steps
                .iter()
                .find(|r| r.step_id == s.id)
                .map(|r| r.outcome.is_success())
                .unwrap_or(false)
        });

    WorkflowExecutionResult {
        workflow_id: workflow_id.to_string(),
        run_id,
        status: if all_required_ok {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        },
        steps,
        success_rate,
        duration_ms: elapsed.as_millis() as u64,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashSet;
    use taskmesh_core::{MeshError, TaskExecutionRecord};
    use tokio::sync::Mutex;

    /// Scripted dispatcher: fails the configured step ids and records every
    /// dispatched step id in order.
    struct MockDispatch {
        failing_steps: HashSet<String>,
        calls: Mutex<Vec<String>>,
    }

    impl MockDispatch {
        fn new(failing: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                failing_steps: failing.iter().map(|s| (*s).to_string()).collect(),
                calls: Mutex::new(Vec::new()),
            })
        }

        async fn calls(&self) -> Vec<String> {
            self.calls.lock().await.clone()
        }
    }

    #[async_trait]
    impl Dispatch for MockDispatch {
        async fn dispatch(
            &self,
            capability: &str,
            payload: Value,
            _timeout: Duration,
        ) -> MeshResult<TaskExecutionRecord> {
            let step_id = payload["step_id"].as_str().unwrap_or_default().to_string();
            self.calls.lock().await.push(step_id.clone());
            if self.failing_steps.contains(&step_id) {
                Ok(TaskExecutionRecord::failure(
                    capability,
                    Utc::now(),
                    5,
                    "worker returned 500",
                ))
            } else {
                Ok(TaskExecutionRecord::success(
                    capability,
                    Utc::now(),
                    5,
                    Some(json!({"echo": step_id})),
                ))
            }
        }
    }

    fn chain_store() -> Arc<WorkflowStore> {
        // a -> b -> c, all required.
        let wf = WorkflowDefinition::new("chain", "Chain", "test")
            .with_step(Step::new("a", "A", "writer", 100))
            .with_step(Step::new("b", "B", "writer", 100).with_dependencies(vec!["a".into()]))
            .with_step(Step::new("c", "C", "writer", 100).with_dependencies(vec!["b".into()]));
        let mut store = WorkflowStore::new();
        store.register(wf).unwrap();
        Arc::new(store)
    }

    fn chain_store_optional_b() -> Arc<WorkflowStore> {
        let wf = WorkflowDefinition::new("chain", "Chain", "test")
            .with_step(Step::new("a", "A", "writer", 100))
            .with_step(
                Step::new("b", "B", "writer", 100)
                    .with_dependencies(vec!["a".into()])
                    .optional(),
            )
            .with_step(Step::new("c", "C", "writer", 100).with_dependencies(vec!["b".into()]));
        let mut store = WorkflowStore::new();
        store.register(wf).unwrap();
        Arc::new(store)
    }

    fn diamond_store() -> Arc<WorkflowStore> {
        let wf = WorkflowDefinition::new("launch", "Launch", "marketing")
            .with_step(Step::new("research", "Research", "researcher", 300_000))
            .with_step(
                Step::new("draft", "Draft", "writer", 600_000)
                    .with_dependencies(vec!["research".into()])
                    .parallelizable(),
            )
            .with_step(
                Step::new("design", "Design", "designer", 900_000)
                    .with_dependencies(vec!["research".into()])
                    .parallelizable(),
            )
            .with_step(
                Step::new("qa", "QA", "qa", 180_000)
                    .with_dependencies(vec!["draft".into(), "design".into()]),
            );
        let mut store = WorkflowStore::new();
        store.register(wf).unwrap();
        Arc::new(store)
    }

    fn executor(store: Arc<WorkflowStore>, dispatch: Arc<MockDispatch>) -> WorkflowExecutor {
        let planner = Arc::new(ExecutionPlanner::new(store.clone()));
        WorkflowExecutor::new(store, planner, dispatch)
    }

    fn outcome_of<'a>(result: &'a WorkflowExecutionResult, id: &str) -> &'a StepOutcome {
        &result
            .steps
            .iter()
            .find(|r| r.step_id == id)
            .unwrap()
            .outcome
    }

    #[tokio::test]
    async fn test_cyclic_workflow_never_dispatches() {
        let wf = WorkflowDefinition::new("cyclic", "Cyclic", "test")
            .with_step(Step::new("a", "A", "w", 100).with_dependencies(vec!["b".into()]))
            .with_step(Step::new("b", "B", "w", 100).with_dependencies(vec!["a".into()]));
        let mut store = WorkflowStore::new();
        store.register(wf).unwrap();
        let dispatch = MockDispatch::new(&[]);
        let executor = executor(Arc::new(store), dispatch.clone());

        let err = executor
            .run("cyclic", &json!({}), ExecutionMode::Parallel, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, MeshError::Validation(_)));
        assert!(dispatch.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_workflow_never_dispatches() {
        let dispatch = MockDispatch::new(&[]);
        let executor = executor(Arc::new(WorkflowStore::new()), dispatch.clone());
        let err = executor
            .run("ghost", &json!({}), ExecutionMode::Sequential, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, MeshError::NotFound(_)));
        assert!(dispatch.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_sequential_halt_on_required_failure() {
        let dispatch = MockDispatch::new(&["b"]);
        let executor = executor(chain_store(), dispatch.clone());

        let result = executor
            .run("chain", &json!({}), ExecutionMode::Sequential, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(result.status, RunStatus::Failed);
        assert!(outcome_of(&result, "a").is_success());
        assert!(matches!(outcome_of(&result, "b"), StepOutcome::Failed { .. }));
        assert_eq!(
            outcome_of(&result, "c"),
            &StepOutcome::SkippedDependencyFailed
        );
        // c was never dispatched.
        assert_eq!(dispatch.calls().await, vec!["a", "b"]);
        // 1 success out of 2 attempted.
        assert!((result.success_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_optional_failure_continues() {
        let dispatch = MockDispatch::new(&["b"]);
        let executor = executor(chain_store_optional_b(), dispatch.clone());

        let result = executor
            .run("chain", &json!({}), ExecutionMode::Sequential, Duration::from_secs(1))
            .await
            .unwrap();

        // b failed but is optional: c is still dispatched and the run completes.
        assert_eq!(dispatch.calls().await, vec!["a", "b", "c"]);
        assert!(outcome_of(&result, "c").is_success());
        assert_eq!(result.status, RunStatus::Completed);
        assert!((result.success_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_parallel_sibling_failure_does_not_cancel() {
        let dispatch = MockDispatch::new(&["draft"]);
        let executor = executor(diamond_store(), dispatch.clone());

        let result = executor
            .run("launch", &json!({}), ExecutionMode::Parallel, Duration::from_secs(1))
            .await
            .unwrap();

        // design ran to completion despite its sibling failing.
        assert!(outcome_of(&result, "design").is_success());
        assert!(matches!(
            outcome_of(&result, "draft"),
            StepOutcome::Failed { .. }
        ));
        // qa depends on the failed draft, so it is skipped, not dispatched.
        assert_eq!(
            outcome_of(&result, "qa"),
            &StepOutcome::SkippedDependencyFailed
        );
        let calls = dispatch.calls().await;
        assert!(!calls.contains(&"qa".to_string()));
        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.steps.len(), 4);
    }

    #[tokio::test]
    async fn test_parallel_waves_dispatch_in_order() {
        let dispatch = MockDispatch::new(&[]);
        let executor = executor(diamond_store(), dispatch.clone());

        let result = executor
            .run("launch", &json!({}), ExecutionMode::Parallel, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(result.status, RunStatus::Completed);
        assert!((result.success_rate - 1.0).abs() < f64::EPSILON);

        let calls = dispatch.calls().await;
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0], "research");
        assert_eq!(calls[3], "qa");
        // draft and design share the middle wave in either order.
        let middle: HashSet<&str> = calls[1..3].iter().map(String::as_str).collect();
        assert_eq!(middle, HashSet::from(["draft", "design"]));
    }

    #[tokio::test]
    async fn test_runs_are_independent() {
        let dispatch = MockDispatch::new(&[]);
        let executor = executor(chain_store(), dispatch.clone());

        let first = executor
            .run("chain", &json!({}), ExecutionMode::Sequential, Duration::from_secs(1))
            .await
            .unwrap();
        let second = executor
            .run("chain", &json!({}), ExecutionMode::Sequential, Duration::from_secs(1))
            .await
            .unwrap();

        assert_ne!(first.run_id, second.run_id);
        assert_eq!(dispatch.calls().await.len(), 6);
    }
}
