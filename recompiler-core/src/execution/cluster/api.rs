//! Messages exchanged between the coordinator and its workers.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::package_json_updater::PackageJsonChange;
use crate::tasks::{Task, TaskProcessingOutcome};

/// Sent by a worker to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    /// The worker is up and waiting for its first task.
    Ready,
    TaskCompleted {
        task_id: usize,
        outcome: TaskProcessingOutcome,
        message: Option<String>,
    },
    /// Asks the coordinator to apply metadata changes; answered with a
    /// [`PackageJsonUpdateAck`].
    UpdatePackageJson {
        request_id: u64,
        package_json_path: PathBuf,
        changes: Vec<PackageJsonChange>,
    },
    /// A fatal error; the run aborts.
    Error {
        task_id: Option<usize>,
        message: String,
    },
}

/// Sent by the coordinator to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CoordinatorMessage {
    ProcessTask { task: Task },
}

/// Answer to [`WorkerMessage::UpdatePackageJson`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageJsonUpdateAck {
    pub request_id: u64,
    pub error: Option<String>,
}
