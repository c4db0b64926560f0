use std::fmt;

use crate::error::{Error, Result};

use super::base::QueueState;
use super::{Task, TaskDependencies, TaskQueue};

/// Hands out tasks one at a time in planned order.
///
/// Planned order already respects dependencies, so only one task may be in
/// progress at any time.
pub struct SerialTaskQueue {
    state: QueueState,
}

impl SerialTaskQueue {
    pub fn new(tasks: Vec<Task>, dependencies: TaskDependencies) -> Self {
        Self {
            state: QueueState::new(tasks, dependencies),
        }
    }
}

impl TaskQueue for SerialTaskQueue {
    fn all_tasks_completed(&self) -> bool {
        self.state.all_tasks_completed()
    }

    fn get_next_task(&mut self) -> Result<Option<Task>> {
        if !self.state.in_progress.is_empty() {
            return Err(Error::Invariant(
                "Trying to get next task, while there is already a task in progress".to_string(),
            ));
        }
        while !self.state.pending.is_empty() {
            if let Some(task) = self.state.start(0)? {
                return Ok(Some(task));
            }
        }
        Ok(None)
    }

    fn mark_as_completed(&mut self, task_id: usize) -> Result<()> {
        self.state.mark_as_completed(task_id)
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

impl fmt::Display for SerialTaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.state.fmt_state("SerialTaskQueue", f)
    }
}
