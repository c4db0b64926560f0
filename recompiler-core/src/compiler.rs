//! The seam to the external bundle compiler.
//!
//! The transformation itself lives outside this crate. A [`BundleCompiler`]
//! takes one bundle and returns the files to write; [`create_compile_fn`]
//! wraps it into the per-task compile function the executors drive.

use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::command_validator::CommandValidator;
use crate::entry_point::{get_entry_point_format, EntryPoint, EntryPointFormat};
use crate::error::{Error, Result};
use crate::execution::{CompileFn, CreateCompileFn, TaskCompletedCallback};
use crate::package_json_updater::PackageJsonUpdater;
use crate::path_utils::{normalize, resolve_file_with_postfixes};
use crate::tasks::{DtsProcessing, Task, TaskCompletion, TaskProcessingOutcome};
use crate::writing::{FileWriter, InPlaceFileWriter, NewEntryPointFileWriter};

/// Everything the compiler needs to know about one bundle.
#[derive(Debug, Clone)]
pub struct EntryPointBundle {
    pub entry_point: Arc<EntryPoint>,
    pub format_property: String,
    pub format: EntryPointFormat,
    /// Absolute path of the bundle's entry file.
    pub path: PathBuf,
    pub process_dts: DtsProcessing,
    /// Absolute path of the entry point's typings file.
    pub typings: PathBuf,
}

/// A file produced by the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileToWrite {
    pub path: PathBuf,
    pub contents: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub message: String,
    pub file: Option<PathBuf>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            DiagnosticSeverity::Error => "error",
            DiagnosticSeverity::Warning => "warning",
        };
        match &self.file {
            Some(file) => write!(f, "{}: {}: {}", file.display(), severity, self.message),
            None => write!(f, "{}: {}", severity, self.message),
        }
    }
}

/// Outcome of compiling one bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformResult {
    Compiled {
        files: Vec<FileToWrite>,
        /// Non-fatal diagnostics, logged as warnings.
        diagnostics: Vec<Diagnostic>,
    },
    /// The bundle was already in compiled form.
    AlreadyProcessed,
    Failed {
        diagnostics: Vec<Diagnostic>,
    },
}

/// Compiles one bundle.
pub trait BundleCompiler: Send + Sync {
    fn transform(&self, bundle: &EntryPointBundle) -> Result<TransformResult>;
}

fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Runs a shell command per bundle.
///
/// The command sees the bundle through `RECOMPILER_*` environment variables
/// and prints the new bundle contents on stdout. Empty stdout means the
/// bundle needs no change. Each stderr line becomes a diagnostic; a non-zero
/// exit status fails the task.
pub struct CommandCompiler {
    command: String,
}

impl CommandCompiler {
    pub fn new(command: impl Into<String>, validator: &CommandValidator) -> Result<Self> {
        let command = command.into();
        validator.validate(&command)?;
        Ok(Self { command })
    }
}

impl BundleCompiler for CommandCompiler {
    fn transform(&self, bundle: &EntryPointBundle) -> Result<TransformResult> {
        let process_dts = match bundle.process_dts {
            DtsProcessing::Yes => "yes",
            DtsProcessing::No => "no",
            DtsProcessing::Only => "only",
        };
        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&bundle.entry_point.path)
            .env("RECOMPILER_ENTRY_POINT", &bundle.entry_point.name)
            .env("RECOMPILER_ENTRY_POINT_PATH", &bundle.entry_point.path)
            .env("RECOMPILER_FORMAT_PROPERTY", &bundle.format_property)
            .env("RECOMPILER_FORMAT", bundle.format.as_str())
            .env("RECOMPILER_BUNDLE", &bundle.path)
            .env("RECOMPILER_TYPINGS", &bundle.typings)
            .env("RECOMPILER_PROCESS_DTS", process_dts)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| Error::TaskExecution {
                entry_point: bundle.entry_point.name.clone(),
                format_property: bundle.format_property.clone(),
                message: format!("Failed to execute compiler command: {}", e),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let severity = if output.status.success() {
            DiagnosticSeverity::Warning
        } else {
            DiagnosticSeverity::Error
        };
        let mut diagnostics: Vec<Diagnostic> = stderr
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| Diagnostic {
                severity,
                message: line.to_string(),
                file: Some(bundle.path.clone()),
            })
            .collect();

        if !output.status.success() {
            if diagnostics.is_empty() {
                diagnostics.push(Diagnostic {
                    severity: DiagnosticSeverity::Error,
                    message: format!("compiler command exited with {}", output.status),
                    file: Some(bundle.path.clone()),
                });
            }
            return Ok(TransformResult::Failed { diagnostics });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.is_empty() {
            return Ok(TransformResult::AlreadyProcessed);
        }
        Ok(TransformResult::Compiled {
            files: vec![FileToWrite {
                path: bundle.path.clone(),
                contents: stdout.into_owned(),
            }],
            diagnostics,
        })
    }
}

/// Options the compile function needs.
#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    pub create_new_entry_point_formats: bool,
    pub backup_originals: bool,
    pub error_on_failed_entry_point: bool,
}

/// Builds the bundle description for a task.
pub fn make_entry_point_bundle(task: &Task) -> Result<EntryPointBundle> {
    let entry_point = &task.entry_point;
    let format_path = entry_point.format_path(&task.format_property);
    let format = get_entry_point_format(entry_point, &task.format_property);

    let (Some(format_path), Some(format)) = (format_path, format) else {
        return Err(Error::Invariant(format!(
            "No format-path or format for {} : {} (formatPath: {:?} | format: {:?})",
            entry_point.path.display(),
            task.format_property,
            format_path,
            format
        )));
    };

    let bundle_path = normalize(&entry_point.path.join(format_path));
    let path = resolve_file_with_postfixes(&bundle_path, &["", ".js", "/index.js"])
        .unwrap_or(bundle_path);

    Ok(EntryPointBundle {
        entry_point: Arc::clone(entry_point),
        format_property: task.format_property.clone(),
        format,
        path,
        process_dts: task.process_dts,
        typings: entry_point.typings.clone(),
    })
}

/// Wraps `compiler` into a [`CreateCompileFn`].
///
/// The compile function writes output files and reports the outcome through
/// the callback; markers are written by whoever handles the completion.
pub fn create_compile_fn(
    compiler: Arc<dyn BundleCompiler>,
    options: CompileOptions,
) -> CreateCompileFn {
    Arc::new(
        move |updater: Arc<dyn PackageJsonUpdater>, on_task_completed: TaskCompletedCallback| {
            let compiler = Arc::clone(&compiler);
            let writer: Box<dyn FileWriter> = if options.create_new_entry_point_formats {
                Box::new(NewEntryPointFileWriter::new(
                    updater,
                    options.backup_originals,
                    options.error_on_failed_entry_point,
                ))
            } else {
                Box::new(InPlaceFileWriter::new(
                    options.backup_originals,
                    options.error_on_failed_entry_point,
                ))
            };

            let compile: CompileFn = Box::new(move |task: &Task| {
                let bundle = make_entry_point_bundle(task)?;
                info!(
                    "Compiling {} : {} as {}",
                    task.entry_point.name, task.format_property, bundle.format
                );

                let completion = match compiler.transform(&bundle)? {
                    TransformResult::Compiled { files, diagnostics } => {
                        if !diagnostics.is_empty() {
                            warn!("{}", format_diagnostics(&diagnostics));
                        }
                        writer.write_bundle(
                            &bundle,
                            &files,
                            &task.format_properties_to_mark_as_processed,
                        )?;
                        debug!(
                            "  Successfully compiled {} : {}",
                            task.entry_point.name, task.format_property
                        );
                        TaskCompletion {
                            task_id: task.id,
                            outcome: TaskProcessingOutcome::Processed,
                            message: None,
                        }
                    }
                    TransformResult::AlreadyProcessed => TaskCompletion {
                        task_id: task.id,
                        outcome: TaskProcessingOutcome::AlreadyProcessed,
                        message: None,
                    },
                    TransformResult::Failed { diagnostics } => TaskCompletion {
                        task_id: task.id,
                        outcome: TaskProcessingOutcome::Failed,
                        message: Some(format!(
                            "compilation errors:\n{}",
                            format_diagnostics(&diagnostics)
                        )),
                    },
                };
                on_task_completed(completion);
                Ok(())
            });
            compile
        },
    )
}
