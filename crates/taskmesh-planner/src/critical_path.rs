use crate::graph::DependencyGraph;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use taskmesh_core::{MeshError, MeshResult, Step};

/// Longest dependency-respecting chain through a workflow, with the full
/// earliest-start distance map kept for slack computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticalPath {
    /// Step ids along the critical path, in execution order.
    pub path: Vec<String>,
    /// Cumulative duration of the critical path in milliseconds.
    pub total_duration_ms: u64,
    /// Earliest start time per step, all roots starting at zero.
    pub distances: HashMap<String, u64>,
    /// Dependency-respecting order over all steps (Kahn's algorithm output).
    pub topological_order: Vec<String>,
}

impl CriticalPath {
    /// Analyze an acyclic graph using in-degree elimination.
    ///
    /// All steps with no dependencies start at time zero simultaneously;
    /// resource contention between steps sharing a capability does not push
    /// start times back. Disconnected steps form trivial one-node chains and
    /// still compete for the maximum.
    pub fn analyze(graph: &DependencyGraph, steps: &[Step]) -> MeshResult<Self> {
        let durations: HashMap<&str, u64> = steps
            .iter()
            .map(|s| (s.id.as_str(), s.estimated_duration_ms))
            .collect();

        let mut in_degree: HashMap<String, usize> = graph.in_degrees().clone();
        let mut distance: HashMap<String, u64> =
            steps.iter().map(|s| (s.id.clone(), 0)).collect();
        let mut predecessor: HashMap<String, String> = HashMap::new();

        // Roots, kept sorted descending so pop() yields the lexicographically
        // smallest id and ties resolve deterministically.
        let mut ready: Vec<String> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| id.clone())
            .collect();
        ready.sort_by(|a, b| b.cmp(a));

        let mut order: Vec<String> = Vec::with_capacity(steps.len());
        while let Some(id) = ready.pop() {
            order.push(id.clone());
            let finish = distance[&id]
                + durations.get(id.as_str()).copied().unwrap_or_default();
            for succ in graph.successors(&id) {
                if finish > distance[succ] {
                    distance.insert(succ.clone(), finish);
                    predecessor.insert(succ.clone(), id.clone());
                }
                let remaining = in_degree
                    .get_mut(succ)
                    .ok_or_else(|| MeshError::Validation(format!("unknown step '{succ}'")))?;
                *remaining -= 1;
                if *remaining == 0 {
                    // Keep `ready` sorted descending.
                    let pos = ready
                        .binary_search_by(|probe| succ.as_str().cmp(probe.as_str()))
                        .unwrap_or_else(|p| p);
                    ready.insert(pos, succ.clone());
                }
            }
        }

        if order.len() != steps.len() {
            return Err(MeshError::Validation(
                "dependency graph left steps unordered; cycle or dangling reference".into(),
            ));
        }

        // The node whose completion time is maximal terminates the critical path.
        let terminal = steps
            .iter()
            .map(|s| {
                let finish = distance[&s.id] + s.estimated_duration_ms;
                (s.id.clone(), finish)
            })
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
            .ok_or_else(|| MeshError::Validation("workflow has no steps".into()))?;

        let mut path = vec![terminal.0.clone()];
        let mut cursor = terminal.0;
        while let Some(prev) = predecessor.get(&cursor) {
            path.push(prev.clone());
            cursor = prev.clone();
        }
        path.reverse();

        Ok(Self {
            path,
            total_duration_ms: terminal.1,
            distances: distance,
            topological_order: order,
        })
    }

    /// Slack per step: how long the step could be delayed without extending
    /// the critical path. Critical-path members have zero slack.
    pub fn slack(&self, steps: &[Step]) -> HashMap<String, u64> {
        let durations: HashMap<&str, u64> = steps
            .iter()
            .map(|s| (s.id.as_str(), s.estimated_duration_ms))
            .collect();
        self.distances
            .iter()
            .map(|(id, start)| {
                let finish = start + durations.get(id.as_str()).copied().unwrap_or_default();
                (id.clone(), self.total_duration_ms.saturating_sub(finish))
            })
            .collect()
    }
}
