//! Progress reporting for running tasks.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// A spinner counting compiled tasks; the total is only known after analysis.
pub fn create_task_progress() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {pos} task(s) compiled {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}
