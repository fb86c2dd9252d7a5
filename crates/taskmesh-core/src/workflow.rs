use crate::error::{MeshError, MeshResult};
use crate::types::WorkflowDefinition;
use std::collections::HashMap;

/// Directory of registered workflow definitions.
///
/// Definitions are immutable once registered; publishing a changed workflow
/// means registering it under a new id. The store is an injected, owned value
/// so tests can build isolated instances.
#[derive(Debug, Default)]
pub struct WorkflowStore {
    workflows: HashMap<String, WorkflowDefinition>,
}

impl WorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition. Rejects duplicate ids and empty step lists.
    pub fn register(&mut self, workflow: WorkflowDefinition) -> MeshResult<()> {
        if workflow.steps.is_empty() {
            return Err(MeshError::Validation(format!(
                "workflow '{}' has no steps",
                workflow.id
            )));
        }
        if self.workflows.contains_key(&workflow.id) {
            return Err(MeshError::Validation(format!(
                "workflow '{}' is already registered; a new version needs a new id",
                workflow.id
            )));
        }
        self.workflows.insert(workflow.id.clone(), workflow);
        Ok(())
    }

    /// Look up a definition by id.
    pub fn get(&self, id: &str) -> MeshResult<&WorkflowDefinition> {
        self.workflows
            .get(id)
            .ok_or_else(|| MeshError::NotFound(format!("workflow '{id}'")))
    }

    /// All registered definitions, sorted by id for stable output.
    pub fn list(&self) -> Vec<&WorkflowDefinition> {
        let mut all: Vec<&WorkflowDefinition> = self.workflows.values().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}
