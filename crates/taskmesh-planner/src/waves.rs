use std::collections::HashSet;
use taskmesh_core::{MeshError, MeshResult, Step};

/// Partition steps into waves: wave 0 holds steps with no dependencies, wave
/// *k* holds steps whose full dependency set is satisfied by waves `0..k`.
///
/// The returned list of waves is usable directly as a parallel execution
/// schedule. Each wave is sorted by step id for stable output. Iteration is
/// capped at `steps.len() + 1`; any step still unplaced at the cap means a
/// cycle or dangling reference slipped past earlier validation and is a hard
/// `Validation` failure.
pub fn compute_waves(steps: &[Step]) -> MeshResult<Vec<Vec<String>>> {
    let mut waves: Vec<Vec<String>> = Vec::new();
    let mut placed: HashSet<&str> = HashSet::with_capacity(steps.len());

    for _ in 0..=steps.len() {
        if placed.len() == steps.len() {
            break;
        }
        let eligible: Vec<&Step> = steps
            .iter()
            .filter(|s| !placed.contains(s.id.as_str()))
            .filter(|s| s.depends_on.iter().all(|d| placed.contains(d.as_str())))
            .collect();
        if eligible.is_empty() {
            break;
        }
        let mut wave: Vec<String> = eligible.iter().map(|s| s.id.clone()).collect();
        wave.sort();
        for step in eligible {
            placed.insert(step.id.as_str());
        }
        waves.push(wave);
    }

    if placed.len() != steps.len() {
        let unplaced: Vec<&str> = steps
            .iter()
            .filter(|s| !placed.contains(s.id.as_str()))
            .map(|s| s.id.as_str())
            .collect();
        return Err(MeshError::Validation(format!(
            "steps could not be scheduled (cycle or dangling dependency): {}",
            unplaced.join(", ")
        )));
    }

    Ok(waves)
}
