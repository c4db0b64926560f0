use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::channel::Receiver;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::{Error, Result};
use crate::package_json_updater::{PackageJsonChange, PackageJsonUpdater};

use super::api::{PackageJsonUpdateAck, WorkerMessage};

/// Forwards metadata writes from a worker to the coordinator and blocks
/// until the coordinator acknowledges them.
pub struct ClusterWorkerPackageJsonUpdater {
    worker_id: usize,
    messages: UnboundedSender<(usize, WorkerMessage)>,
    acks: Receiver<PackageJsonUpdateAck>,
    next_request_id: AtomicU64,
}

impl ClusterWorkerPackageJsonUpdater {
    pub fn new(
        worker_id: usize,
        messages: UnboundedSender<(usize, WorkerMessage)>,
        acks: Receiver<PackageJsonUpdateAck>,
    ) -> Self {
        Self {
            worker_id,
            messages,
            acks,
            next_request_id: AtomicU64::new(0),
        }
    }

    fn worker_error(&self, message: impl Into<String>) -> Error {
        Error::Worker {
            worker: self.worker_id,
            message: message.into(),
        }
    }
}

impl PackageJsonUpdater for ClusterWorkerPackageJsonUpdater {
    fn write_changes(&self, changes: &[PackageJsonChange], package_json_path: &Path) -> Result<()> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        self.messages
            .send((
                self.worker_id,
                WorkerMessage::UpdatePackageJson {
                    request_id,
                    package_json_path: package_json_path.to_path_buf(),
                    changes: changes.to_vec(),
                },
            ))
            .map_err(|_| self.worker_error("coordinator is gone"))?;

        let ack = self
            .acks
            .recv()
            .map_err(|_| self.worker_error("coordinator stopped before acknowledging an update"))?;
        if ack.request_id != request_id {
            return Err(Error::Invariant(format!(
                "Worker {} expected acknowledgement {} but got {}",
                self.worker_id, request_id, ack.request_id
            )));
        }

        match ack.error {
            None => Ok(()),
            Some(message) => Err(Error::PackageJsonUpdate {
                path: package_json_path.to_path_buf(),
                message,
            }),
        }
    }
}
