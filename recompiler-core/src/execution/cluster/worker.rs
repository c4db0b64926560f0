use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::channel::Receiver;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::execution::{CreateCompileFn, TaskCompletedCallback};
use crate::package_json_updater::PackageJsonUpdater;

use super::api::{CoordinatorMessage, PackageJsonUpdateAck, WorkerMessage};
use super::package_json_updater::ClusterWorkerPackageJsonUpdater;

/// Channels owned by one worker.
pub(super) struct WorkerChannels {
    pub tasks: Receiver<CoordinatorMessage>,
    pub acks: Receiver<PackageJsonUpdateAck>,
    pub messages: UnboundedSender<(usize, WorkerMessage)>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Compiles tasks sent by the coordinator until its task channel closes.
pub(super) fn run_worker(
    worker_id: usize,
    create_compile_fn: CreateCompileFn,
    channels: WorkerChannels,
) {
    let WorkerChannels {
        tasks,
        acks,
        messages,
    } = channels;
    let send = |message: WorkerMessage| {
        // A closed channel means the coordinator already gave up.
        let _ = messages.send((worker_id, message));
    };

    let reported = Arc::new(AtomicBool::new(false));
    let updater: Arc<dyn PackageJsonUpdater> = Arc::new(ClusterWorkerPackageJsonUpdater::new(
        worker_id,
        messages.clone(),
        acks,
    ));
    let on_task_completed: TaskCompletedCallback = {
        let messages = messages.clone();
        let reported = Arc::clone(&reported);
        Arc::new(move |completion| {
            reported.store(true, Ordering::SeqCst);
            let _ = messages.send((
                worker_id,
                WorkerMessage::TaskCompleted {
                    task_id: completion.task_id,
                    outcome: completion.outcome,
                    message: completion.message,
                },
            ));
        })
    };
    let mut compile = create_compile_fn(updater, on_task_completed);

    debug!("Worker #{} is ready", worker_id);
    send(WorkerMessage::Ready);

    for message in tasks.iter() {
        let CoordinatorMessage::ProcessTask { task } = message;
        debug!("Worker #{} processing {}", worker_id, task);
        reported.store(false, Ordering::SeqCst);

        let result = panic::catch_unwind(AssertUnwindSafe(|| compile(&task)));
        let error = match result {
            Ok(Ok(())) if reported.load(Ordering::SeqCst) => None,
            Ok(Ok(())) => Some(format!("Task {} finished without reporting an outcome", task)),
            Ok(Err(e)) => Some(e.to_string()),
            Err(payload) => Some(format!("panicked: {}", panic_message(payload.as_ref()))),
        };
        if let Some(message) = error {
            send(WorkerMessage::Error {
                task_id: Some(task.id),
                message,
            });
            break;
        }
    }

    debug!("Worker #{} exiting", worker_id);
}
