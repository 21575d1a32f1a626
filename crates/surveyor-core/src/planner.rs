//! Converts a ranked strategy list into an ordered execution plan.
//!
//! Each strategy becomes one [`ExecutionStep`]. Dependencies declared as
//! `"module_id:source_id"` keys are resolved within the same call, and the
//! steps are emitted in a topological order (Kahn's algorithm) that is
//! stable with respect to input order among independent steps. A cycle or
//! an unknown dependency key fails the whole call — these are the only
//! hard errors in the planning path.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PlanError, PlanResult};
use crate::registry::ParameterMap;
use crate::strategy::Strategy;

/// One planner-normalized unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStep {
    /// Monotonically increasing id, starting at 1, in plan order.
    pub step_id: u64,
    pub module_id: String,
    pub source_id: String,
    pub parameters: ParameterMap,
    /// Step ids that must complete before this step may run.
    pub depends_on: Vec<u64>,
}

/// An ordered, dependency-resolved sequence of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Stable plan identifier.
    pub plan_id: String,
    /// Steps in a valid topological order.
    pub steps: Vec<ExecutionStep>,
}

impl ExecutionPlan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Build an [`ExecutionPlan`] from `strategies`.
///
/// When several strategies share a `(module_id, source_id)` key (parameter
/// fan-out does this), a dependency on that key waits for all of them.
pub fn plan(strategies: &[Strategy]) -> PlanResult<ExecutionPlan> {
    let count = strategies.len();

    let mut by_key: HashMap<String, Vec<usize>> = HashMap::new();
    for (index, strategy) in strategies.iter().enumerate() {
        by_key.entry(strategy.key()).or_default().push(index);
    }

    // Input-index adjacency, deduplicated and ordered.
    let mut depends_on: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); count];
    for (index, strategy) in strategies.iter().enumerate() {
        for dependency in &strategy.dependencies {
            let Some(targets) = by_key.get(dependency) else {
                return Err(PlanError::UnresolvedDependency {
                    strategy: strategy.key(),
                    dependency: dependency.clone(),
                });
            };
            for &target in targets {
                if target != index {
                    depends_on[index].insert(target);
                }
            }
        }
    }

    // Kahn's algorithm, always advancing the smallest ready input index so
    // independent steps keep their input order.
    let mut in_degree: Vec<usize> = depends_on.iter().map(|deps| deps.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
    for (index, deps) in depends_on.iter().enumerate() {
        for &dep in deps {
            dependents[dep].push(index);
        }
    }

    let mut ready: BTreeSet<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &degree)| degree == 0)
        .map(|(index, _)| index)
        .collect();

    let mut order = Vec::with_capacity(count);
    let mut placed = vec![false; count];
    while let Some(&index) = ready.iter().next() {
        ready.remove(&index);
        placed[index] = true;
        order.push(index);
        for &dependent in &dependents[index] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() != count {
        let keys = strategies
            .iter()
            .enumerate()
            .filter(|(index, _)| !placed[*index])
            .map(|(_, s)| s.key())
            .collect();
        return Err(PlanError::CyclicPlan { keys });
    }

    let mut step_id_of = vec![0u64; count];
    for (position, &index) in order.iter().enumerate() {
        step_id_of[index] = position as u64 + 1;
    }

    let steps = order
        .iter()
        .map(|&index| {
            let strategy = &strategies[index];
            let mut step_deps: Vec<u64> = depends_on[index]
                .iter()
                .map(|&dep| step_id_of[dep])
                .collect();
            step_deps.sort_unstable();
            ExecutionStep {
                step_id: step_id_of[index],
                module_id: strategy.module_id.clone(),
                source_id: strategy.source_id.clone(),
                parameters: strategy.parameters.clone(),
                depends_on: step_deps,
            }
        })
        .collect();

    let plan_id = format!(
        "plan-{}",
        uuid::Uuid::new_v4()
            .to_string()
            .split('-')
            .next()
            .unwrap_or("x")
    );
    debug!(plan_id = %plan_id, steps = count, "built execution plan");

    Ok(ExecutionPlan { plan_id, steps })
}
