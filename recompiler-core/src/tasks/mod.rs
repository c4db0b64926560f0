//! Tasks and the queues that hand them out.

mod base;
mod parallel;
mod serial;
mod utils;

pub use parallel::ParallelTaskQueue;
pub use serial::SerialTaskQueue;
pub use utils::{compute_task_dependencies, TaskDependencies};

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::entry_point::EntryPoint;
use crate::error::Result;
use crate::graph::DependencyGraph;

/// Whether a task also processes the entry point's type declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DtsProcessing {
    Yes,
    No,
    /// Only the typings; the bundle itself is left alone.
    Only,
}

/// Compile one format property of one entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Position in the planned task list.
    pub id: usize,
    pub entry_point: Arc<EntryPoint>,
    pub format_property: String,
    /// Properties sharing the compiled bundle, including `format_property`.
    pub format_properties_to_mark_as_processed: SmallVec<[String; 4]>,
    pub process_dts: DtsProcessing,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{EntryPoint: {}, FormatProperty: {}, processDts: {:?}}}",
            self.entry_point.name, self.format_property, self.process_dts
        )
    }
}

/// How a compile step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskProcessingOutcome {
    Processed,
    /// Nothing to do; the output was already there.
    AlreadyProcessed,
    Failed,
}

/// Reported by the compile function once a task is done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCompletion {
    pub task_id: usize,
    pub outcome: TaskProcessingOutcome,
    /// Diagnostics for a failed task.
    pub message: Option<String>,
}

/// Hands out tasks in an order that respects dependencies.
///
/// Only the coordinating thread touches a queue, so `&mut self` serializes
/// its bookkeeping.
pub trait TaskQueue: Send + fmt::Display {
    /// `true` once every planned task was marked completed.
    fn all_tasks_completed(&self) -> bool;

    /// The next task that may start now, if any.
    ///
    /// Tasks skipped because a dependency failed are completed on the way.
    fn get_next_task(&mut self) -> Result<Option<Task>>;

    fn mark_as_completed(&mut self, task_id: usize) -> Result<()>;

    /// Records a failure; every task depending on it will be skipped.
    fn mark_as_failed(&mut self, task_id: usize) -> Result<()>;

    /// The planned task with this id.
    fn task(&self, task_id: usize) -> Option<&Task>;

    /// Number of planned tasks.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Creates the queue matching the execution mode.
pub fn create_task_queue(
    in_parallel: bool,
    tasks: Vec<Task>,
    graph: &DependencyGraph,
) -> Result<Box<dyn TaskQueue>> {
    let dependencies = compute_task_dependencies(&tasks, graph)?;
    Ok(if in_parallel {
        Box::new(ParallelTaskQueue::new(tasks, dependencies))
    } else {
        Box::new(SerialTaskQueue::new(tasks, dependencies))
    })
}
