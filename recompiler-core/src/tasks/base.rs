use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::{Task, TaskDependencies};

/// Bookkeeping shared by both queue kinds.
pub(super) struct QueueState {
    /// Every planned task, indexed by id.
    pub tasks: Vec<Task>,
    /// Ids not yet handed out, in hand-out priority order.
    pub pending: Vec<usize>,
    pub in_progress: BTreeSet<usize>,
    pub completed: BTreeSet<usize>,
    /// Tasks to skip, mapped to the failed task that caused it.
    pub to_skip: BTreeMap<usize, usize>,
    pub dependencies: TaskDependencies,
}

impl QueueState {
    pub fn new(tasks: Vec<Task>, dependencies: TaskDependencies) -> Self {
        let pending = (0..tasks.len()).collect();
        Self {
            tasks,
            pending,
            in_progress: BTreeSet::new(),
            completed: BTreeSet::new(),
            to_skip: BTreeMap::new(),
            dependencies,
        }
    }

    pub fn all_tasks_completed(&self) -> bool {
        self.completed.len() == self.tasks.len()
    }

    /// Takes `index` out of `pending`, completing it right away if skipped.
    ///
    /// Returns the task if it should actually run.
    pub fn start(&mut self, index: usize) -> Result<Option<Task>> {
        let task_id = self.pending.remove(index);
        self.in_progress.insert(task_id);

        if let Some(&failed) = self.to_skip.get(&task_id) {
            let task = &self.tasks[task_id];
            let failed = &self.tasks[failed];
            debug!(
                "Skipping processing of {} because its dependency {} failed to compile.",
                task.entry_point.name, failed.entry_point.name
            );
            self.mark_as_completed(task_id)?;
            return Ok(None);
        }

        Ok(Some(self.tasks[task_id].clone()))
    }

    pub fn mark_as_completed(&mut self, task_id: usize) -> Result<()> {
        if !self.in_progress.remove(&task_id) {
            return Err(Error::Invariant(format!(
                "Trying to mark task that was not in progress as completed: {}",
                self.describe(task_id)
            )));
        }
        self.completed.insert(task_id);
        Ok(())
    }

    pub fn mark_as_failed(&mut self, task_id: usize) -> Result<()> {
        if !self.in_progress.contains(&task_id) {
            return Err(Error::Invariant(format!(
                "Trying to mark task that was not in progress as failed: {}",
                self.describe(task_id)
            )));
        }
        for dependent in self.dependencies.transitive_dependents(task_id) {
            if self.in_progress.contains(&dependent) || self.completed.contains(&dependent) {
                warn!(
                    "Task {} depends on failed task {} but has already started",
                    self.describe(dependent),
                    self.describe(task_id)
                );
                continue;
            }
            self.to_skip.entry(dependent).or_insert(task_id);
        }
        Ok(())
    }

    fn describe(&self, task_id: usize) -> String {
        self.tasks
            .get(task_id)
            .map(Task::to_string)
            .unwrap_or_else(|| format!("#{}", task_id))
    }

    pub fn fmt_state(&self, name: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", name)?;
        writeln!(f, "  All tasks completed: {}", self.all_tasks_completed())?;
        writeln!(f, "  Unprocessed tasks ({}):", self.pending.len())?;
        for &id in &self.pending {
            writeln!(f, "    - {}", self.tasks[id])?;
        }
        writeln!(f, "  In-progress tasks ({}):", self.in_progress.len())?;
        for &id in &self.in_progress {
            writeln!(f, "    - {}", self.tasks[id])?;
        }
        Ok(())
    }
}
