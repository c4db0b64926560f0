use std::sync::Arc;
use std::time::Instant;

use crossbeam::channel::{self, Receiver};
use tracing::debug;

use crate::error::{Error, Result};
use crate::locking::{AsyncLocker, SyncLocker};
use crate::package_json_updater::PackageJsonUpdater;
use crate::tasks::{Task, TaskCompletion, TaskQueue};

use super::{
    check_all_completed, check_unprocessable, AnalyzeEntryPointsFn, AnalyzedEntryPoints, CompileFn,
    CreateCompileFn, ExecutionSummary, TaskCompletedCallback, TaskCompletionHandler,
};

/// One serial pass over the queue on the calling thread.
struct SerialRun {
    queue: Box<dyn TaskQueue>,
    unprocessable: Vec<std::path::PathBuf>,
    properties_to_consider: Vec<String>,
    compile: CompileFn,
    completions: Receiver<TaskCompletion>,
    handler: TaskCompletionHandler,
}

impl SerialRun {
    fn start(
        analyze: AnalyzeEntryPointsFn,
        create_compile_fn: &CreateCompileFn,
        updater: Arc<dyn PackageJsonUpdater>,
        error_on_failed_entry_point: bool,
    ) -> Result<Self> {
        debug!("Analyzing entry-points...");
        let start = Instant::now();
        let AnalyzedEntryPoints {
            queue,
            unprocessable,
            properties_to_consider,
        } = analyze(updater.as_ref())?;
        debug!("Analyzed entry-points in {:.2}s", start.elapsed().as_secs_f64());

        let (sender, completions) = channel::unbounded();
        let on_task_completed: TaskCompletedCallback = Arc::new(move |completion| {
            // The receiver lives as long as the run.
            let _ = sender.send(completion);
        });
        let compile = create_compile_fn(Arc::clone(&updater), on_task_completed);

        Ok(Self {
            queue,
            unprocessable,
            properties_to_consider,
            compile,
            completions,
            handler: TaskCompletionHandler::new(updater, error_on_failed_entry_point),
        })
    }

    fn next_task(&mut self) -> Result<Option<Task>> {
        self.queue.get_next_task()
    }

    fn process(&mut self, task: Task) -> Result<()> {
        (self.compile)(&task)?;
        let completion = self.completions.try_recv().map_err(|_| {
            Error::Invariant(format!("Task {} finished without reporting an outcome", task))
        })?;
        self.handler.handle(self.queue.as_mut(), completion)
    }

    fn finish(self) -> Result<ExecutionSummary> {
        check_all_completed(self.queue.as_ref())?;
        let total_tasks = self.queue.len();
        check_unprocessable(self.unprocessable, self.properties_to_consider)?;
        Ok(self.handler.into_summary(total_tasks))
    }
}

/// Runs every task on the calling thread, failing at once if another
/// process holds the lock.
pub struct SingleProcessExecutorSync {
    locker: SyncLocker,
    updater: Arc<dyn PackageJsonUpdater>,
    error_on_failed_entry_point: bool,
}

impl SingleProcessExecutorSync {
    pub fn new(
        locker: SyncLocker,
        updater: Arc<dyn PackageJsonUpdater>,
        error_on_failed_entry_point: bool,
    ) -> Self {
        Self {
            locker,
            updater,
            error_on_failed_entry_point,
        }
    }

    pub fn execute(
        &self,
        analyze: AnalyzeEntryPointsFn,
        create_compile_fn: CreateCompileFn,
    ) -> Result<ExecutionSummary> {
        self.locker.lock(|| {
            let mut run = SerialRun::start(
                analyze,
                &create_compile_fn,
                Arc::clone(&self.updater),
                self.error_on_failed_entry_point,
            )?;
            while let Some(task) = run.next_task()? {
                run.process(task)?;
            }
            run.finish()
        })
    }
}

/// Same as [`SingleProcessExecutorSync`] but awaitable, waiting for the lock
/// and yielding between tasks.
pub struct SingleProcessExecutorAsync {
    locker: AsyncLocker,
    updater: Arc<dyn PackageJsonUpdater>,
    error_on_failed_entry_point: bool,
}

impl SingleProcessExecutorAsync {
    pub fn new(
        locker: AsyncLocker,
        updater: Arc<dyn PackageJsonUpdater>,
        error_on_failed_entry_point: bool,
    ) -> Self {
        Self {
            locker,
            updater,
            error_on_failed_entry_point,
        }
    }

    pub async fn execute(
        &self,
        analyze: AnalyzeEntryPointsFn,
        create_compile_fn: CreateCompileFn,
    ) -> Result<ExecutionSummary> {
        self.locker
            .lock(async {
                let mut run = SerialRun::start(
                    analyze,
                    &create_compile_fn,
                    Arc::clone(&self.updater),
                    self.error_on_failed_entry_point,
                )?;
                while let Some(task) = run.next_task()? {
                    run.process(task)?;
                    tokio::task::yield_now().await;
                }
                run.finish()
            })
            .await
    }
}
