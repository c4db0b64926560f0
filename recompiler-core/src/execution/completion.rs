use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::build_marker::{mark_as_processed, TYPINGS_PROPERTY};
use crate::entry_point::get_entry_point_format;
use crate::error::{Error, Result};
use crate::package_json_updater::PackageJsonUpdater;
use crate::tasks::{DtsProcessing, Task, TaskCompletion, TaskProcessingOutcome, TaskQueue};

/// Counts of task outcomes for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionSummary {
    pub total_tasks: usize,
    pub processed: usize,
    pub already_processed: usize,
    pub failed: usize,
    /// Tasks not run because a dependency failed.
    pub skipped: usize,
}

/// Applies reported task outcomes to the queue and to package metadata.
pub struct TaskCompletionHandler {
    updater: Arc<dyn PackageJsonUpdater>,
    error_on_failed_entry_point: bool,
    summary: ExecutionSummary,
}

impl TaskCompletionHandler {
    pub fn new(updater: Arc<dyn PackageJsonUpdater>, error_on_failed_entry_point: bool) -> Self {
        Self {
            updater,
            error_on_failed_entry_point,
            summary: ExecutionSummary::default(),
        }
    }

    pub fn updater(&self) -> &Arc<dyn PackageJsonUpdater> {
        &self.updater
    }

    /// Records `completion` and marks its task completed.
    ///
    /// A failure is fatal when `error_on_failed_entry_point` is set;
    /// otherwise tasks depending on the failed one are skipped.
    pub fn handle(&mut self, queue: &mut dyn TaskQueue, completion: TaskCompletion) -> Result<()> {
        let Some(task) = queue.task(completion.task_id).cloned() else {
            return Err(Error::Invariant(format!(
                "Completion reported for unknown task #{}",
                completion.task_id
            )));
        };

        match completion.outcome {
            TaskProcessingOutcome::Processed => {
                self.mark_processed(&task)?;
                self.summary.processed += 1;
            }
            TaskProcessingOutcome::AlreadyProcessed => {
                info!(
                    "{} : {} was already compiled; marking it as processed.",
                    task.entry_point.name, task.format_property
                );
                self.mark_processed(&task)?;
                self.summary.already_processed += 1;
            }
            TaskProcessingOutcome::Failed => {
                let format = get_entry_point_format(&task.entry_point, &task.format_property)
                    .map(|format| format.to_string())
                    .unwrap_or_else(|| "unknown format".to_string());
                let message = format!(
                    "{} as {} due to {}",
                    task.format_property,
                    format,
                    completion.message.as_deref().unwrap_or("unknown error")
                );
                if self.error_on_failed_entry_point {
                    return Err(Error::TaskExecution {
                        entry_point: task.entry_point.name.clone(),
                        format_property: task.format_property.clone(),
                        message,
                    });
                }
                error!("Failed to compile entry-point {} ({})", task.entry_point.name, message);
                queue.mark_as_failed(task.id)?;
                self.summary.failed += 1;
            }
        }

        queue.mark_as_completed(task.id)
    }

    fn mark_processed(&self, task: &Task) -> Result<()> {
        // A typings-only task leaves the bundle itself unprocessed.
        let mut properties = match task.process_dts {
            DtsProcessing::Only => Vec::new(),
            _ => task.format_properties_to_mark_as_processed.to_vec(),
        };
        if task.process_dts != DtsProcessing::No {
            properties.push(TYPINGS_PROPERTY.to_string());
        }
        mark_as_processed(
            self.updater.as_ref(),
            &task.entry_point.package_json,
            &task.entry_point.package_json_path(),
            &properties,
        )
    }

    /// Final counts, given the size of the queue.
    pub fn into_summary(self, total_tasks: usize) -> ExecutionSummary {
        let mut summary = self.summary;
        summary.total_tasks = total_tasks;
        summary.skipped = total_tasks
            .saturating_sub(summary.processed + summary.already_processed + summary.failed);
        summary
    }
}
