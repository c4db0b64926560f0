//! Command implementations for the CLI.

mod discovery;
mod run;

use std::path::PathBuf;

use anyhow::Result;
use recompiler_core::{RecompileOptions, ResolvedOptions};

pub use discovery::{cmd_graph, cmd_scan};
pub use run::{cmd_run, RunArgs};

/// Default options for the read-only commands.
fn resolve_options(base_path: PathBuf) -> Result<ResolvedOptions> {
    Ok(RecompileOptions::new(base_path).validate()?)
}
