use std::collections::BTreeSet;
use std::path::Path;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::graph::DependencyGraph;

use super::{DtsProcessing, Task};

/// Which tasks must finish before which, indexed by task id.
#[derive(Debug, Clone, Default)]
pub struct TaskDependencies {
    /// For each task, the tasks it waits for.
    pub blocked_by: Vec<BTreeSet<usize>>,
    /// For each task, the tasks waiting for it.
    pub dependents: Vec<BTreeSet<usize>>,
}

impl TaskDependencies {
    fn with_len(len: usize) -> Self {
        Self {
            blocked_by: vec![BTreeSet::new(); len],
            dependents: vec![BTreeSet::new(); len],
        }
    }

    fn add(&mut self, task: usize, depends_on: usize) {
        self.blocked_by[task].insert(depends_on);
        self.dependents[depends_on].insert(task);
    }

    /// Every task that directly or transitively waits for `task_id`.
    pub fn transitive_dependents(&self, task_id: usize) -> BTreeSet<usize> {
        let mut result = BTreeSet::new();
        let mut stack = vec![task_id];
        while let Some(current) = stack.pop() {
            for &dependent in self.dependents.get(current).into_iter().flatten() {
                if result.insert(dependent) {
                    stack.push(dependent);
                }
            }
        }
        result
    }
}

/// Computes task ordering constraints.
///
/// A task waits for every task of the entry points it depends on, and for
/// the task of its own entry point that processes typings.
///
/// # Errors
///
/// Fails if task ids are not their positions, or if two tasks of one entry
/// point both process typings.
pub fn compute_task_dependencies(
    tasks: &[Task],
    graph: &DependencyGraph,
) -> Result<TaskDependencies> {
    let mut dependencies = TaskDependencies::with_len(tasks.len());
    let mut by_entry_point: FxHashMap<&Path, Vec<usize>> = FxHashMap::default();
    let mut typings_task: FxHashMap<&Path, usize> = FxHashMap::default();

    for (index, task) in tasks.iter().enumerate() {
        if task.id != index {
            return Err(Error::Invariant(format!(
                "task {} is at position {}",
                task.id, index
            )));
        }
        let path = task.entry_point.path.as_path();
        by_entry_point.entry(path).or_default().push(index);

        if task.process_dts != DtsProcessing::No
            && typings_task.insert(path, index).is_some()
        {
            return Err(Error::Invariant(format!(
                "Multiple tasks are assigned generating typings for '{}'",
                path.display()
            )));
        }
    }

    for task in tasks {
        let path = task.entry_point.path.as_path();

        if graph.has_node(path) {
            for dependency in graph.dependencies_of(path)? {
                let dependency_tasks = by_entry_point.get(dependency.as_path());
                for &dependency_task in dependency_tasks.into_iter().flatten() {
                    dependencies.add(task.id, dependency_task);
                }
            }
        }

        if task.process_dts == DtsProcessing::No {
            if let Some(&typings) = typings_task.get(path) {
                dependencies.add(task.id, typings);
            }
        }
    }

    Ok(dependencies)
}
