//! Parallel execution on a pool of worker threads.
//!
//! The coordinator owns the task queue and the run's metadata writer.
//! Workers only compile: they receive tasks over a channel, report outcomes
//! as [`WorkerMessage`]s and route metadata writes back to the coordinator,
//! which applies them and acknowledges.

mod api;
mod package_json_updater;
mod worker;

pub use api::{CoordinatorMessage, PackageJsonUpdateAck, WorkerMessage};
pub use package_json_updater::ClusterWorkerPackageJsonUpdater;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crossbeam::channel::{self, Sender};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::locking::AsyncLocker;
use crate::package_json_updater::{PackageJsonChange, PackageJsonUpdater};
use crate::tasks::{TaskCompletion, TaskProcessingOutcome, TaskQueue};

use super::{
    check_all_completed, check_unprocessable, AnalyzeEntryPointsFn, AnalyzedEntryPoints,
    CreateCompileFn, ExecutionSummary, TaskCompletionHandler,
};
use worker::{run_worker, WorkerChannels};

/// Runs tasks on `worker_count` worker threads.
pub struct ClusterExecutor {
    worker_count: usize,
    locker: AsyncLocker,
    updater: Arc<dyn PackageJsonUpdater>,
    error_on_failed_entry_point: bool,
}

impl ClusterExecutor {
    pub fn new(
        worker_count: usize,
        locker: AsyncLocker,
        updater: Arc<dyn PackageJsonUpdater>,
        error_on_failed_entry_point: bool,
    ) -> Self {
        Self {
            worker_count: worker_count.max(1),
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
                debug!("Running recompiler on {} worker(s).", self.worker_count);
                let start = Instant::now();
                let updater = Arc::clone(&self.updater);
                let analyzed = tokio::task::spawn_blocking(move || analyze(updater.as_ref()))
                    .await
                    .map_err(|e| Error::Worker {
                        worker: 0,
                        message: format!("analysis did not complete: {}", e),
                    })??;
                debug!("Analyzed entry-points in {:.2}s", start.elapsed().as_secs_f64());

                let AnalyzedEntryPoints {
                    queue,
                    unprocessable,
                    properties_to_consider,
                } = analyzed;
                let handler = TaskCompletionHandler::new(
                    Arc::clone(&self.updater),
                    self.error_on_failed_entry_point,
                );
                let mut coordinator = Coordinator {
                    queue,
                    handler,
                    workers: Vec::new(),
                    idle: BTreeSet::new(),
                    in_flight: BTreeMap::new(),
                };
                coordinator.run(self.worker_count, create_compile_fn).await?;

                let total_tasks = coordinator.queue.len();
                check_unprocessable(unprocessable, properties_to_consider)?;
                Ok(coordinator.handler.into_summary(total_tasks))
            })
            .await
    }
}

/// Coordinator-side handle on a worker.
struct WorkerHandle {
    /// Closed once the run stops handing out tasks.
    tasks: Option<Sender<CoordinatorMessage>>,
    acks: Sender<PackageJsonUpdateAck>,
}

struct Coordinator {
    queue: Box<dyn TaskQueue>,
    handler: TaskCompletionHandler,
    workers: Vec<WorkerHandle>,
    idle: BTreeSet<usize>,
    /// Worker id to the task it is compiling.
    in_flight: BTreeMap<usize, usize>,
}

impl Coordinator {
    async fn run(&mut self, worker_count: usize, create_compile_fn: CreateCompileFn) -> Result<()> {
        if self.queue.all_tasks_completed() {
            return Ok(());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_count)
            .thread_name(|i| format!("recompiler-worker-{}", i))
            .build()
            .map_err(|e| Error::Worker {
                worker: 0,
                message: format!("failed to start worker pool: {}", e),
            })?;

        let (message_sender, mut messages) = mpsc::unbounded_channel();
        for worker_id in 0..worker_count {
            let (task_sender, tasks) = channel::unbounded();
            let (ack_sender, acks) = channel::unbounded();
            let channels = WorkerChannels {
                tasks,
                acks,
                messages: message_sender.clone(),
            };
            let create_compile_fn = Arc::clone(&create_compile_fn);
            pool.spawn(move || run_worker(worker_id, create_compile_fn, channels));
            self.workers.push(WorkerHandle {
                tasks: Some(task_sender),
                acks: ack_sender,
            });
        }
        drop(message_sender);

        let result = self.coordinate(&mut messages).await;
        self.drain(&mut messages).await;
        result?;

        info!("All {} task(s) completed.", self.queue.len());
        Ok(())
    }

    async fn coordinate(
        &mut self,
        messages: &mut mpsc::UnboundedReceiver<(usize, WorkerMessage)>,
    ) -> Result<()> {
        loop {
            self.distribute_tasks()?;
            if self.queue.all_tasks_completed() {
                return Ok(());
            }
            if self.in_flight.is_empty() && self.idle.len() == self.workers.len() {
                check_all_completed(self.queue.as_ref())?;
            }

            let Some((worker_id, message)) = messages.recv().await else {
                return Err(Error::Worker {
                    worker: 0,
                    message: "all workers exited before the queue was completed".to_string(),
                });
            };
            self.on_message(worker_id, message)?;
        }
    }

    /// Stops handing out tasks and waits until every worker has exited.
    ///
    /// Tasks still compiling when the run failed finish normally, so their
    /// output and markers stay consistent. Nothing is written after this
    /// returns.
    async fn drain(&mut self, messages: &mut mpsc::UnboundedReceiver<(usize, WorkerMessage)>) {
        for worker in &mut self.workers {
            worker.tasks = None;
        }
        if !self.in_flight.is_empty() {
            debug!("Waiting for {} in-flight task(s) to finish.", self.in_flight.len());
        }

        // Every worker holds a sender; the channel closes when the last one exits.
        while let Some((worker_id, message)) = messages.recv().await {
            match message {
                WorkerMessage::TaskCompleted {
                    task_id,
                    outcome,
                    message,
                } => {
                    self.in_flight.remove(&worker_id);
                    if outcome == TaskProcessingOutcome::Failed {
                        continue;
                    }
                    let completion = TaskCompletion {
                        task_id,
                        outcome,
                        message,
                    };
                    if let Err(e) = self.handler.handle(self.queue.as_mut(), completion) {
                        warn!("Failed to record late completion of task #{}: {}", task_id, e);
                    }
                }
                WorkerMessage::UpdatePackageJson {
                    request_id,
                    package_json_path,
                    changes,
                } => self.apply_update(worker_id, request_id, &package_json_path, &changes),
                WorkerMessage::Ready | WorkerMessage::Error { .. } => {}
            }
        }
    }

    fn apply_update(
        &self,
        worker_id: usize,
        request_id: u64,
        package_json_path: &Path,
        changes: &[PackageJsonChange],
    ) {
        let error = self
            .handler
            .updater()
            .write_changes(changes, package_json_path)
            .err()
            .map(|e| e.to_string());
        // A worker that already exited has nothing to acknowledge.
        let _ = self.workers[worker_id]
            .acks
            .send(PackageJsonUpdateAck { request_id, error });
    }

    /// Hands eligible tasks to idle workers.
    fn distribute_tasks(&mut self) -> Result<()> {
        while let Some(&worker_id) = self.idle.iter().next() {
            let Some(task) = self.queue.get_next_task()? else {
                break;
            };
            self.idle.remove(&worker_id);
            self.in_flight.insert(worker_id, task.id);
            debug!("Sending task {} to worker #{}", task, worker_id);
            let sent = self.workers[worker_id]
                .tasks
                .as_ref()
                .is_some_and(|tasks| tasks.send(CoordinatorMessage::ProcessTask { task }).is_ok());
            if !sent {
                return Err(Error::Worker {
                    worker: worker_id,
                    message: "worker exited unexpectedly".to_string(),
                });
            }
        }
        Ok(())
    }

    fn on_message(&mut self, worker_id: usize, message: WorkerMessage) -> Result<()> {
        match message {
            WorkerMessage::Ready => {
                self.idle.insert(worker_id);
            }
            WorkerMessage::TaskCompleted {
                task_id,
                outcome,
                message,
            } => {
                if self.in_flight.get(&worker_id) != Some(&task_id) {
                    return Err(Error::Invariant(format!(
                        "Worker #{} reported completion of task #{} it was not assigned",
                        worker_id, task_id
                    )));
                }
                self.handler.handle(
                    self.queue.as_mut(),
                    TaskCompletion {
                        task_id,
                        outcome,
                        message,
                    },
                )?;
                self.in_flight.remove(&worker_id);
                self.idle.insert(worker_id);
            }
            WorkerMessage::UpdatePackageJson {
                request_id,
                package_json_path,
                changes,
            } => self.apply_update(worker_id, request_id, &package_json_path, &changes),
            WorkerMessage::Error { task_id, message } => {
                let message = match task_id.and_then(|id| self.queue.task(id)) {
                    Some(task) => format!("{} while processing {}", message, task),
                    None => message,
                };
                return Err(Error::Worker {
                    worker: worker_id,
                    message,
                });
            }
        }
        Ok(())
    }
}
