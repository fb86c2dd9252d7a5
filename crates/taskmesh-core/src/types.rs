use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Priority of a step or workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}

/// One schedulable unit of a workflow, bound to a worker capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Unique within the owning workflow.
    pub id: String,
    pub name: String,
    /// Logical worker type this step targets; resolved to a live endpoint
    /// through the worker registry at dispatch time.
    pub capability: String,
    /// Step ids that must succeed before this step may run.
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub estimated_duration_ms: u64,
    #[serde(default)]
    pub parallelizable: bool,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub priority: Priority,
}

impl Step {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        capability: impl Into<String>,
        estimated_duration_ms: u64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            capability: capability.into(),
            depends_on: Vec::new(),
            estimated_duration_ms,
            parallelizable: false,
            optional: false,
            priority: Priority::Medium,
        }
    }

    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.depends_on = deps;
        self
    }

    pub fn parallelizable(mut self) -> Self {
        self.parallelizable = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// Immutable workflow template. Registered once; a new version gets a new id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub priority: Priority,
    pub steps: Vec<Step>,
    /// Sum of step estimates; derived when omitted from config.
    #[serde(default)]
    pub estimated_total_duration_ms: u64,
}

impl WorkflowDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            priority: Priority::Medium,
            steps: Vec::new(),
            estimated_total_duration_ms: 0,
        }
    }

    /// Append a step, keeping the summed duration estimate current.
    pub fn with_step(mut self, step: Step) -> Self {
        self.estimated_total_duration_ms += step.estimated_duration_ms;
        self.steps.push(step);
        self
    }

    /// Look up a step by id.
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }
}

/// Liveness status of a registered worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Active,
    Degraded,
    Unreachable,
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerStatus::Active => write!(f, "active"),
            WorkerStatus::Degraded => write!(f, "degraded"),
            WorkerStatus::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// Registry entry for one worker endpoint.
///
/// Status is mutated only by the health loop and by dispatch outcomes; the
/// dispatcher reads it on every dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHandle {
    pub id: Uuid,
    pub capability: String,
    pub endpoint: String,
    pub status: WorkerStatus,
    pub last_probe_at: Option<DateTime<Utc>>,
}

impl WorkerHandle {
    pub fn new(capability: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            capability: capability.into(),
            endpoint: endpoint.into(),
            status: WorkerStatus::Active,
            last_probe_at: None,
        }
    }
}

/// Ephemeral result of a single dispatch. Not persisted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecutionRecord {
    pub task_id: Uuid,
    pub capability: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl TaskExecutionRecord {
    pub fn success(
        capability: impl Into<String>,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        payload: Option<serde_json::Value>,
    ) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            capability: capability.into(),
            started_at,
            duration_ms,
            success: true,
            error: None,
            payload,
        }
    }

    pub fn failure(
        capability: impl Into<String>,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            capability: capability.into(),
            started_at,
            duration_ms,
            success: false,
            error: Some(error.into()),
            payload: None,
        }
    }
}

/// Outcome of one step inside a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Success { result: serde_json::Value },
    Failed { error: String },
    /// A required dependency did not succeed; the step was never dispatched.
    SkippedDependencyFailed,
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success { .. })
    }

    /// True when the step was actually dispatched (success or failure).
    pub fn was_attempted(&self) -> bool {
        !matches!(self, StepOutcome::SkippedDependencyFailed)
    }
}

/// Per-step entry in a [`WorkflowExecutionResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

/// Terminal state of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// Aggregate of one workflow run. Partial results are always surfaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecutionResult {
    pub workflow_id: String,
    pub run_id: Uuid,
    pub status: RunStatus,
    /// Per-step outcomes in the order the steps were considered.
    pub steps: Vec<StepResult>,
    /// Succeeded over attempted; 0.0 when nothing was attempted.
    pub success_rate: f64,
    pub duration_ms: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_step_builder() {
        let step = Step::new("draft", "Draft copy", "writer", 600_000)
            .with_dependencies(vec!["research".into()])
            .parallelizable()
            .with_priority(Priority::High);
        assert_eq!(step.depends_on, vec!["research".to_string()]);
        assert!(step.parallelizable);
        assert!(!step.optional);
        assert_eq!(step.priority, Priority::High);
    }

    #[test]
    fn test_workflow_duration_accumulates() {
        let wf = WorkflowDefinition::new("launch", "Launch", "marketing")
            .with_step(Step::new("a", "A", "writer", 100))
            .with_step(Step::new("b", "B", "designer", 250));
        assert_eq!(wf.estimated_total_duration_ms, 350);
        assert!(wf.step("b").is_some());
        assert!(wf.step("c").is_none());
    }

    #[test]
    fn test_step_deserializes_with_defaults() {
        let json = r#"{
            "id": "qa",
            "name": "QA pass",
            "capability": "qa",
            "estimated_duration_ms": 180000
        }"#;
        let step: Step = serde_json::from_str(json).unwrap();
        assert!(step.depends_on.is_empty());
        assert!(!step.optional);
        assert_eq!(step.priority, Priority::Medium);
    }

    #[test]
    fn test_step_outcome_serialization() {
        let outcome = StepOutcome::SkippedDependencyFailed;
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("skipped_dependency_failed"));
        assert!(!outcome.was_attempted());
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_record_constructors() {
        let ok = TaskExecutionRecord::success("writer", Utc::now(), 42, None);
        assert!(ok.success);
        assert!(ok.error.is_none());

        let bad = TaskExecutionRecord::failure("writer", Utc::now(), 42, "timeout");
        assert!(!bad.success);
        assert_eq!(bad.error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_worker_handle_starts_active() {
        let handle = WorkerHandle::new("writer", "http://127.0.0.1:9000");
        assert_eq!(handle.status, WorkerStatus::Active);
        assert!(handle.last_probe_at.is_none());
    }

    #[test]
    fn test_unknown_priority_rejected() {
        let result: Result<Priority, _> = serde_json::from_str("\"urgent\"");
        assert!(result.is_err());
    }
}
