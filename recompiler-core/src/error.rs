//! Error types and result aliases.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error in {}: {error}", .path.display())]
    Json {
        error: serde_json::Error,
        path: PathBuf,
    },

    #[error("JSON serialize error: {0}")]
    JsonSerialize(#[source] serde_json::Error),

    #[error("TOML parse error in {}: {error}", .path.display())]
    Toml {
        error: toml::de::Error,
        path: PathBuf,
    },

    #[error(
        "Unable to process any formats for the following entry-points (tried {}):{}",
        .properties.join(", "),
        format_path_list(.paths)
    )]
    UnprocessableEntryPoints {
        properties: Vec<String>,
        paths: Vec<PathBuf>,
    },

    #[error(
        "The target entry-point \"{name}\" has missing dependencies:{}",
        .missing.iter().map(|dep| format!("\n - {}", dep)).collect::<String>()
    )]
    InvalidTarget { name: String, missing: Vec<String> },

    #[error("Circular dependency detected between entry-points:{}", format_path_list(.0))]
    CircularDependency(Vec<PathBuf>),

    #[error("There is no appropriate source code format in '{}' entry-point.", .0.display())]
    NoSuitableFormat(PathBuf),

    #[error(
        "No supported format property to consider among [{}]. Supported properties: {}",
        .requested.join(", "),
        .supported.join(", ")
    )]
    UnsupportedProperties {
        requested: Vec<String>,
        supported: Vec<String>,
    },

    #[error("Failed to compile entry-point {entry_point} ({format_property}): {message}")]
    TaskExecution {
        entry_point: String,
        format_property: String,
        message: String,
    },

    #[error(
        "Another recompiler process, with id {pid}, is running. If you are sure no recompiler process is running, delete the lock-file at {}.",
        .path.display()
    )]
    LockHeld { path: PathBuf, pid: String },

    #[error(
        "Timed out waiting {waited_secs}s for another recompiler process, with id {pid}, to complete. If you are sure no recompiler process is running, delete the lock-file at {}.",
        .path.display()
    )]
    LockTimeout {
        path: PathBuf,
        pid: String,
        waited_secs: u64,
    },

    #[error("Entry-point manifest error in {}: {message}", .path.display())]
    Manifest { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unable to update {}: {message}", .path.display())]
    PackageJsonUpdate { path: PathBuf, message: String },

    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Worker {worker} failed: {message}")]
    Worker { worker: usize, message: String },

    #[error("Mutex lock error: {0}")]
    MutexLock(String),
}

fn format_path_list(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| format!("\n  - {}", path.display()))
        .collect()
}

pub type Result<T> = std::result::Result<T, Error>;
