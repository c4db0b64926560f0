//! The `run` command.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::Args;
use owo_colors::OwoColorize;
use recompiler::Recompiler;
use recompiler_core::command_validator::CommandValidator;
use recompiler_core::locking::LockFile;
use recompiler_core::{CommandCompiler, RecompileOptions};

use crate::formatting::{
    create_task_progress, format_duration, print_key_value, print_section_header, print_success,
    print_summary_box, print_warning, SectionStyle,
};

#[derive(Args)]
pub struct RunArgs {
    /// Only process this entry point (relative to the base path) and its dependencies.
    #[arg(long)]
    target: Option<PathBuf>,

    /// Format properties to consider, most preferred first.
    #[arg(short, long = "properties")]
    properties: Vec<String>,

    /// Stop at the first matching format of each entry point.
    #[arg(long, action)]
    first_only: bool,

    /// Write output under __recompiled__ instead of overwriting bundles.
    #[arg(long, action)]
    create_new_entry_point_formats: bool,

    #[arg(long = "async", action)]
    async_mode: bool,

    #[arg(short = 'j', long)]
    max_workers: Option<usize>,

    #[arg(long, action)]
    typings_only: bool,

    #[arg(long, action)]
    no_backup: bool,

    /// Log failed entry points and skip their dependents instead of aborting.
    #[arg(long, action)]
    continue_on_error: bool,

    #[arg(long, action)]
    invalidate_manifest: bool,

    #[arg(long)]
    tsconfig: Option<PathBuf>,

    /// Shell command compiling one bundle.
    #[arg(long)]
    compiler: String,

    /// Reject shell features in the compiler command.
    #[arg(long, action)]
    strict_command: bool,
}

impl RunArgs {
    fn into_options(self, base_path: PathBuf) -> RecompileOptions {
        let mut options = RecompileOptions::new(base_path);
        options.target_entry_point_path = self.target;
        if !self.properties.is_empty() {
            options.properties_to_consider = self.properties;
        }
        options.compile_all_formats = !self.first_only;
        options.create_new_entry_point_formats = self.create_new_entry_point_formats;
        options.async_mode = self.async_mode;
        options.max_workers = self.max_workers;
        options.typings_only = self.typings_only;
        options.backup_originals = !self.no_backup;
        options.error_on_failed_entry_point = !self.continue_on_error;
        options.invalidate_entry_point_manifest = self.invalidate_manifest;
        options.tsconfig_path = self.tsconfig;
        options
    }
}

/// Removes our own lock file when interrupted.
fn install_interrupt_handler(base_path: &Path) -> Result<()> {
    let lock_file = LockFile::new(base_path);
    let pid = std::process::id().to_string();
    ctrlc::set_handler(move || {
        if lock_file.read_pid() == pid {
            lock_file.remove();
        }
        std::process::exit(1);
    })
    .map_err(|e| anyhow::anyhow!("Failed to set signal handler: {}", e))
}

pub fn cmd_run(base_path: PathBuf, args: RunArgs) -> Result<()> {
    let validator = if args.strict_command {
        CommandValidator::strict()
    } else {
        CommandValidator::new()
    };
    let compiler = Arc::new(CommandCompiler::new(args.compiler.clone(), &validator)?);
    let recompiler = Recompiler::new(args.into_options(base_path), compiler)?;
    install_interrupt_handler(&recompiler.options().base_path)?;

    print_section_header("Recompiling packages", SectionStyle::Primary);
    print_key_value("Base path:", &recompiler.options().base_path.display().to_string());
    print_key_value("Project:", &recompiler.options().project_path.display().to_string());
    if let Some(target) = &recompiler.options().target_entry_point_path {
        print_key_value("Target:", &target.display().to_string());
    }
    println!();

    let progress = create_task_progress();
    let on_task = progress.clone();
    let recompiler = recompiler.with_progress(move |task| {
        on_task.inc(1);
        on_task.set_message(format!("{} : {}", task.entry_point.name, task.format_property));
    });

    let start = Instant::now();
    let result = recompiler.run();
    progress.finish_and_clear();
    let summary = result?;
    let elapsed = start.elapsed().as_secs_f64();

    print_summary_box(
        "Summary",
        &[
            ("Tasks:", &summary.total_tasks.to_string()),
            ("Compiled:", &summary.processed.to_string()),
            ("Already compiled:", &summary.already_processed.to_string()),
            ("Failed:", &summary.failed.to_string()),
            ("Skipped:", &summary.skipped.to_string()),
            ("Duration:", &format_duration(elapsed)),
        ],
    );
    println!();

    if summary.failed > 0 {
        print_warning(&format!(
            "{} task(s) failed; their dependents were skipped",
            summary.failed
        ));
    } else if summary.total_tasks == 0 {
        println!("  {}", "Nothing to do.".bright_black());
    } else {
        print_success("All entry-points compiled");
    }

    Ok(())
}
