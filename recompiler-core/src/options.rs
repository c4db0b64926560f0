//! Run options, validated once at entry.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Configuration;
use crate::entry_point::SUPPORTED_FORMAT_PROPERTIES;
use crate::error::{Error, Result};
use crate::path_utils::normalize;

/// Environment variable that caps the number of cluster workers.
pub const MAX_WORKERS_ENV: &str = "RECOMPILER_MAX_WORKERS";

const DEFAULT_MAX_WORKERS: usize = 4;

/// `baseUrl` plus `paths` style module aliases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathMappings {
    pub base_url: PathBuf,
    #[serde(default)]
    pub paths: BTreeMap<String, Vec<String>>,
}

impl PathMappings {
    /// Reads `compilerOptions.baseUrl` and `compilerOptions.paths` from a tsconfig file.
    ///
    /// Returns `None` when the file sets no `baseUrl`.
    pub fn from_tsconfig(tsconfig_path: &Path) -> Result<Option<Self>> {
        let content = fs::read_to_string(tsconfig_path)?;
        let stripped: String = content
            .lines()
            .filter(|line| !line.trim_start().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");
        let tsconfig: Value = serde_json::from_str(&stripped).map_err(|error| Error::Json {
            error,
            path: tsconfig_path.to_path_buf(),
        })?;

        let compiler_options = tsconfig.get("compilerOptions");
        let Some(base_url) = compiler_options
            .and_then(|o| o.get("baseUrl"))
            .and_then(Value::as_str)
        else {
            return Ok(None);
        };

        let dir = tsconfig_path.parent().unwrap_or_else(|| Path::new("."));
        let paths = compiler_options
            .and_then(|o| o.get("paths"))
            .and_then(Value::as_object)
            .map(|paths| {
                paths
                    .iter()
                    .map(|(pattern, targets)| {
                        let targets = targets
                            .as_array()
                            .map(|list| {
                                list.iter()
                                    .filter_map(Value::as_str)
                                    .map(str::to_string)
                                    .collect()
                            })
                            .unwrap_or_default();
                        (pattern.clone(), targets)
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(Self {
            base_url: normalize(&dir.join(base_url)),
            paths,
        }))
    }
}

/// Options for one recompilation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecompileOptions {
    /// Directory holding the installed packages, usually `node_modules`.
    pub base_path: PathBuf,
    /// Only process this entry point and its dependencies.
    pub target_entry_point_path: Option<PathBuf>,
    pub properties_to_consider: Vec<String>,
    /// Compile every matching format rather than stopping at the first.
    pub compile_all_formats: bool,
    /// Write output next to the originals instead of overwriting them.
    pub create_new_entry_point_formats: bool,
    pub path_mappings: Option<PathMappings>,
    pub tsconfig_path: Option<PathBuf>,
    pub async_mode: bool,
    pub max_workers: Option<usize>,
    pub parallelism_hint: Option<usize>,
    pub typings_only: bool,
    pub error_on_failed_entry_point: bool,
    pub backup_originals: bool,
    pub invalidate_entry_point_manifest: bool,
    pub lock_retry_attempts: u32,
    pub lock_retry_delay_ms: u64,
}

impl Default for RecompileOptions {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("node_modules"),
            target_entry_point_path: None,
            properties_to_consider: SUPPORTED_FORMAT_PROPERTIES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            compile_all_formats: true,
            create_new_entry_point_formats: false,
            path_mappings: None,
            tsconfig_path: None,
            async_mode: false,
            max_workers: None,
            parallelism_hint: None,
            typings_only: false,
            error_on_failed_entry_point: true,
            backup_originals: true,
            invalidate_entry_point_manifest: false,
            lock_retry_attempts: 500,
            lock_retry_delay_ms: 500,
        }
    }
}

impl RecompileOptions {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Self::default()
        }
    }

    /// Checks the options and fills in derived values.
    ///
    /// # Errors
    ///
    /// Fails when the base path is not a directory, when none of the
    /// requested properties is supported, or when configuration files
    /// cannot be read.
    pub fn validate(self) -> Result<ResolvedOptions> {
        if !self.base_path.is_dir() {
            return Err(Error::Config(format!(
                "base path {} is not a directory",
                self.base_path.display()
            )));
        }
        let base_path = fs::canonicalize(&self.base_path)?;

        let (supported, unsupported): (Vec<String>, Vec<String>) = self
            .properties_to_consider
            .iter()
            .cloned()
            .partition(|p| SUPPORTED_FORMAT_PROPERTIES.contains(&p.as_str()));
        if supported.is_empty() {
            return Err(Error::UnsupportedProperties {
                requested: self.properties_to_consider.clone(),
                supported: SUPPORTED_FORMAT_PROPERTIES
                    .iter()
                    .map(|p| p.to_string())
                    .collect(),
            });
        }
        if !unsupported.is_empty() {
            warn!("Ignoring unsupported format properties: {}", unsupported.join(", "));
        }

        let target_entry_point_path = self
            .target_entry_point_path
            .as_ref()
            .map(|target| normalize(&base_path.join(target)));

        let path_mappings = match (self.path_mappings, &self.tsconfig_path) {
            (Some(mappings), _) => Some(mappings),
            (None, Some(tsconfig)) => PathMappings::from_tsconfig(tsconfig)?,
            (None, None) => None,
        };

        let parallelism = self
            .parallelism_hint
            .unwrap_or_else(rayon::current_num_threads)
            .max(1);
        let max_workers = self
            .max_workers
            .or_else(max_workers_from_env)
            .unwrap_or_else(|| DEFAULT_MAX_WORKERS.min(parallelism.saturating_sub(1)).max(1));
        let worker_count = max_workers.min(parallelism.saturating_sub(1));
        debug!(
            "Parallelism {} (max workers {}, worker count {})",
            parallelism, max_workers, worker_count
        );

        let config = Configuration::load(&base_path)?;

        Ok(ResolvedOptions {
            project_path: base_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| base_path.clone()),
            base_path,
            target_entry_point_path,
            properties_to_consider: supported,
            compile_all_formats: self.compile_all_formats,
            create_new_entry_point_formats: self.create_new_entry_point_formats,
            path_mappings,
            async_mode: self.async_mode,
            worker_count,
            typings_only: self.typings_only,
            error_on_failed_entry_point: self.error_on_failed_entry_point,
            backup_originals: self.backup_originals,
            invalidate_entry_point_manifest: self.invalidate_entry_point_manifest,
            lock_retry: LockRetry {
                attempts: self.lock_retry_attempts,
                delay: Duration::from_millis(self.lock_retry_delay_ms),
            },
            config: Arc::new(config),
        })
    }
}

fn max_workers_from_env() -> Option<usize> {
    let raw = std::env::var(MAX_WORKERS_ENV).ok()?;
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            warn!("Ignoring invalid {}={}", MAX_WORKERS_ENV, raw);
            None
        }
    }
}

/// How long to wait for a lock held by another process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRetry {
    pub attempts: u32,
    pub delay: Duration,
}

/// Validated options with derived values filled in.
#[derive(Clone)]
pub struct ResolvedOptions {
    /// Absolute base path.
    pub base_path: PathBuf,
    /// The directory above the base path.
    pub project_path: PathBuf,
    pub target_entry_point_path: Option<PathBuf>,
    pub properties_to_consider: Vec<String>,
    pub compile_all_formats: bool,
    pub create_new_entry_point_formats: bool,
    pub path_mappings: Option<PathMappings>,
    pub async_mode: bool,
    /// Number of cluster workers; below two means single-process.
    pub worker_count: usize,
    pub typings_only: bool,
    pub error_on_failed_entry_point: bool,
    pub backup_originals: bool,
    pub invalidate_entry_point_manifest: bool,
    pub lock_retry: LockRetry,
    pub config: Arc<Configuration>,
}

impl ResolvedOptions {
    /// Whether the cluster executor should be used.
    pub fn in_parallel(&self) -> bool {
        self.async_mode && self.worker_count > 1
    }
}
