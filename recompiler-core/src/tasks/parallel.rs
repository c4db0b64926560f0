use std::collections::BTreeSet;
use std::fmt;

use crate::error::Result;

use super::base::QueueState;
use super::{Task, TaskDependencies, TaskQueue};

/// Hands out any task whose dependencies have all completed.
///
/// Tasks with more dependents go first so that blocked work is released
/// as early as possible.
pub struct ParallelTaskQueue {
    state: QueueState,
    /// Per task, the dependencies that have not completed yet.
    blocked_by: Vec<BTreeSet<usize>>,
}

impl ParallelTaskQueue {
    pub fn new(tasks: Vec<Task>, dependencies: TaskDependencies) -> Self {
        let blocked_by = dependencies.blocked_by.clone();
        let mut state = QueueState::new(tasks, dependencies);

        let dependents = &state.dependencies.dependents;
        // Stable, so ties keep planned order.
        state
            .pending
            .sort_by_key(|&id| std::cmp::Reverse(dependents[id].len()));

        Self { state, blocked_by }
    }

    /// Number of tasks currently blocked by unfinished dependencies.
    pub fn blocked_count(&self) -> usize {
        self.state
            .pending
            .iter()
            .filter(|&&id| !self.blocked_by[id].is_empty())
            .count()
    }

    fn unblock_dependents(&mut self, task_id: usize) {
        for &dependent in &self.state.dependencies.dependents[task_id] {
            self.blocked_by[dependent].remove(&task_id);
        }
    }
}

impl TaskQueue for ParallelTaskQueue {
    fn all_tasks_completed(&self) -> bool {
        self.state.all_tasks_completed()
    }

    fn get_next_task(&mut self) -> Result<Option<Task>> {
        loop {
            let Some(index) = self
                .state
                .pending
                .iter()
                .position(|&id| self.blocked_by[id].is_empty())
            else {
                return Ok(None);
            };

            let task_id = self.state.pending[index];
            match self.state.start(index)? {
                Some(task) => return Ok(Some(task)),
                // Skipped tasks complete immediately.
                None => self.unblock_dependents(task_id),
            }
        }
    }

    fn mark_as_completed(&mut self, task_id: usize) -> Result<()> {
        self.state.mark_as_completed(task_id)?;
        self.unblock_dependents(task_id);
        Ok(())
    }

    fn mark_as_failed(&mut self, task_id: usize) -> Result<()> {
        self.state.mark_as_failed(task_id)
    }

    fn task(&self, task_id: usize) -> Option<&Task> {
        self.state.tasks.get(task_id)
    }

    fn len(&self) -> usize {
        self.state.tasks.len()
    }
}

impl fmt::Display for ParallelTaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.state.fmt_state("ParallelTaskQueue", f)?;
        writeln!(f, "  Blocked tasks ({}):", self.blocked_count())
    }
}
