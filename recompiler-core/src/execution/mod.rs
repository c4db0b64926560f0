//! Executors that drive planned tasks through a compile function.
//!
//! Every executor follows the same shape: analyze once, then hand tasks out
//! of the queue to a compile function until the queue reports completion.
//! The compile function reports each outcome through a callback; the
//! executor applies it with a [`TaskCompletionHandler`], which owns the only
//! metadata writer of the run.

mod cluster;
mod completion;
mod single_process;

pub use cluster::{ClusterExecutor, CoordinatorMessage, PackageJsonUpdateAck, WorkerMessage};
pub use completion::{ExecutionSummary, TaskCompletionHandler};
pub use single_process::{SingleProcessExecutorAsync, SingleProcessExecutorSync};

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::package_json_updater::PackageJsonUpdater;
use crate::tasks::{Task, TaskCompletion, TaskQueue};

/// Receives the outcome of each compiled task.
pub type TaskCompletedCallback = Arc<dyn Fn(TaskCompletion) + Send + Sync>;

/// Compiles one task, reporting its outcome through the callback it was
/// created with. An `Err` is fatal for the whole run.
pub type CompileFn = Box<dyn FnMut(&Task) -> Result<()> + Send>;

/// Builds a compile function around the run's metadata writer.
pub type CreateCompileFn =
    Arc<dyn Fn(Arc<dyn PackageJsonUpdater>, TaskCompletedCallback) -> CompileFn + Send + Sync>;

/// Finds entry points and plans the tasks for them, cleaning stale output
/// through the run's metadata writer.
pub type AnalyzeEntryPointsFn =
    Box<dyn FnOnce(&dyn PackageJsonUpdater) -> Result<AnalyzedEntryPoints> + Send>;

/// Result of analysis.
pub struct AnalyzedEntryPoints {
    pub queue: Box<dyn TaskQueue>,
    /// Entry points none of the requested properties could be processed for.
    pub unprocessable: Vec<PathBuf>,
    pub properties_to_consider: Vec<String>,
}

/// Fails the run once every usable task ran, if any entry point was
/// unprocessable.
pub(crate) fn check_unprocessable(
    unprocessable: Vec<PathBuf>,
    properties: Vec<String>,
) -> Result<()> {
    if unprocessable.is_empty() {
        return Ok(());
    }
    Err(Error::UnprocessableEntryPoints {
        properties,
        paths: unprocessable,
    })
}

/// Errors unless every planned task was completed.
pub(crate) fn check_all_completed(queue: &dyn TaskQueue) -> Result<()> {
    if queue.all_tasks_completed() {
        return Ok(());
    }
    Err(Error::Invariant(format!(
        "The task queue ran dry before every task was completed.\n{}",
        queue
    )))
}
