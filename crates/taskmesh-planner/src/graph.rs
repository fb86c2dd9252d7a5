use std::collections::{HashMap, HashSet};
use taskmesh_core::{MeshError, MeshResult, Step};

/// Directed dependency graph over the step ids of one workflow.
///
/// Rebuilt per planning request; an edge `a -> b` exists iff `b.depends_on`
/// contains `a`. Construction is a pure function: it validates dangling
/// references and cycles and never performs I/O.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Forward edges: dependency -> dependents.
    successors: HashMap<String, Vec<String>>,
    /// Number of unresolved dependencies per step.
    in_degree: HashMap<String, usize>,
}

impl DependencyGraph {
    /// Build and validate the graph for a list of steps.
    ///
    /// Fails with `Validation` on duplicate ids, references to unknown ids,
    /// self-dependencies, and cycles (listing the participating ids).
    pub fn build(steps: &[Step]) -> MeshResult<Self> {
        let mut ids = HashSet::with_capacity(steps.len());
        for step in steps {
            if !ids.insert(step.id.as_str()) {
                return Err(MeshError::Validation(format!(
                    "duplicate step id '{}'",
                    step.id
                )));
            }
        }

        let mut successors: HashMap<String, Vec<String>> = HashMap::with_capacity(steps.len());
        let mut in_degree: HashMap<String, usize> = HashMap::with_capacity(steps.len());
        for step in steps {
            successors.entry(step.id.clone()).or_default();
            in_degree.entry(step.id.clone()).or_insert(0);
        }

        for step in steps {
            for dep in &step.depends_on {
                if dep == &step.id {
                    return Err(MeshError::Validation(format!(
                        "step '{}' depends on itself",
                        step.id
                    )));
                }
                if !ids.contains(dep.as_str()) {
                    return Err(MeshError::Validation(format!(
                        "step '{}' depends on unknown step '{dep}'",
                        step.id
                    )));
                }
                successors
                    .entry(dep.clone())
                    .or_default()
                    .push(step.id.clone());
                *in_degree.entry(step.id.clone()).or_insert(0) += 1;
            }
        }

        let graph = Self {
            successors,
            in_degree,
        };

        let cycle = graph.find_cycle(steps);
        if !cycle.is_empty() {
            return Err(MeshError::Validation(format!(
                "cyclic dependency among steps: {}",
                cycle.join(", ")
            )));
        }

        Ok(graph)
    }

    /// Steps that directly depend on `id`.
    pub fn successors(&self, id: &str) -> &[String] {
        self.successors.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Unresolved-dependency count per step id.
    pub fn in_degrees(&self) -> &HashMap<String, usize> {
        &self.in_degree
    }

    pub fn node_count(&self) -> usize {
        self.in_degree.len()
    }

    /// DFS with an explicit recursion stack; any id revisited while still on
    /// the stack closes a cycle. Returns the participants (the stack segment
    /// from the revisited id onward), sorted for stable error messages.
    fn find_cycle(&self, steps: &[Step]) -> Vec<String> {
        let mut state: HashMap<&str, DfsState> = HashMap::with_capacity(steps.len());
        let mut path: Vec<&str> = Vec::new();
        let mut participants: HashSet<String> = HashSet::new();

        for step in steps {
            self.dfs(&step.id, &mut state, &mut path, &mut participants);
        }

        let mut out: Vec<String> = participants.into_iter().collect();
        out.sort();
        out
    }

    fn dfs<'a>(
        &'a self,
        id: &'a str,
        state: &mut HashMap<&'a str, DfsState>,
        path: &mut Vec<&'a str>,
        participants: &mut HashSet<String>,
    ) {
        match state.get(id) {
            Some(DfsState::OnStack) => {
                // Back edge: everything on the path from `id` onward is in the cycle.
                if let Some(pos) = path.iter().position(|n| *n == id) {
                    for node in &path[pos..] {
                        participants.insert((*node).to_string());
                    }
                }
                return;
            }
            Some(DfsState::Done) => return,
            None => {}
        }
        state.insert(id, DfsState::OnStack);
        path.push(id);
        for succ in self.successors(id) {
            self.dfs(succ, state, path, participants);
        }
        path.pop();
        state.insert(id, DfsState::Done);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DfsState {
    OnStack,
    Done,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn step(id: &str, deps: &[&str]) -> Step {
        Step::new(id, id, "worker", 1000)
            .with_dependencies(deps.iter().map(|d| (*d).to_string()).collect())
    }

    #[test]
    fn test_build_linear_chain() {
        let steps = vec![step("a", &[]), step("b", &["a"]), step("c", &["b"])];
        let graph = DependencyGraph::build(&steps).unwrap();
        assert_eq!(graph.successors("a"), &["b".to_string()]);
        assert_eq!(graph.in_degrees()["a"], 0);
        assert_eq!(graph.in_degrees()["c"], 1);
        assert_eq!(graph.node_count(), 3);
    }

    #[test]
    fn test_dangling_dependency_rejected() {
        let steps = vec![step("a", &["ghost"])];
        let err = DependencyGraph::build(&steps).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_self_dependency_rejected() {
        let steps = vec![step("a", &["a"])];
        let err = DependencyGraph::build(&steps).unwrap_err();
        assert!(err.to_string().contains("depends on itself"));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let steps = vec![step("a", &[]), step("a", &[])];
        let err = DependencyGraph::build(&steps).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_two_step_cycle_reports_participants() {
        let steps = vec![step("a", &["b"]), step("b", &["a"])];
        let err = DependencyGraph::build(&steps).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("cyclic dependency"));
        assert!(msg.contains('a') && msg.contains('b'));
    }

    #[test]
    fn test_cycle_behind_clean_prefix() {
        // a is fine; b -> c -> d -> b is a cycle.
        let steps = vec![
            step("a", &[]),
            step("b", &["a", "d"]),
            step("c", &["b"]),
            step("d", &["c"]),
        ];
        let err = DependencyGraph::build(&steps).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains('b') && msg.contains('c') && msg.contains('d'));
    }

    #[test]
    fn test_diamond_is_acyclic() {
        let steps = vec![
            step("root", &[]),
            step("left", &["root"]),
            step("right", &["root"]),
            step("join", &["left", "right"]),
        ];
        assert!(DependencyGraph::build(&steps).is_ok());
    }
}
