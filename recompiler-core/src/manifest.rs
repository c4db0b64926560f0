//! On-disk manifest of discovered entry points.
//!
//! Walking a large `node_modules` tree is slow. After a full walk, the
//! entry point paths and their dependency info are stored next to the
//! packages and reused until the tool version, the project lock file or the
//! configuration changes.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::build_marker::VERSION;
use crate::config::Configuration;
use crate::dependency_host::DependencyInfo;
use crate::dependency_resolver::EntryPointWithDependencies;
use crate::entry_point::{get_entry_point_info, EntryPointLookup};
use crate::error::{Error, Result};

/// File name of the manifest inside a base path.
pub const MANIFEST_FILE: &str = "__recompiler_entry_points__.bin";

const LOCK_FILES: &[&str] = &["package-lock.json", "yarn.lock", "pnpm-lock.yaml"];

#[derive(Debug, Serialize, Deserialize)]
struct ManifestEntry {
    package_path: PathBuf,
    entry_point_path: PathBuf,
    dependencies: Vec<PathBuf>,
    missing: Vec<String>,
    deep_imports: Vec<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    version: String,
    config_hash: u64,
    lock_file_hash: u64,
    entry_points: Vec<ManifestEntry>,
}

/// Reads and writes entry point manifests.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryPointManifest {
    /// Ignore existing manifests; new ones are still written.
    invalidate: bool,
}

impl EntryPointManifest {
    pub fn new(invalidate: bool) -> Self {
        Self { invalidate }
    }

    pub fn manifest_path(base_path: &Path) -> PathBuf {
        base_path.join(MANIFEST_FILE)
    }

    /// Loads entry points from a valid manifest, or `None` if there is none.
    ///
    /// A corrupt manifest is logged and treated as missing.
    pub fn read_entry_points(
        &self,
        base_path: &Path,
        config: &Configuration,
    ) -> Option<Vec<EntryPointWithDependencies>> {
        if self.invalidate {
            return None;
        }
        match self.try_read(base_path, config) {
            Ok(entry_points) => entry_points,
            Err(e) => {
                warn!(
                    "Unable to read the entry-point manifest for {}: {}",
                    base_path.display(),
                    e
                );
                None
            }
        }
    }

    fn try_read(
        &self,
        base_path: &Path,
        config: &Configuration,
    ) -> Result<Option<Vec<EntryPointWithDependencies>>> {
        if !is_node_modules(base_path) {
            return Ok(None);
        }
        let Some(lock_file_hash) = compute_lock_file_hash(base_path) else {
            debug!(
                "Unable to compute lock file hash for {}, so ignoring the entry-point manifest",
                base_path.display()
            );
            return Ok(None);
        };

        let manifest_path = Self::manifest_path(base_path);
        if !manifest_path.is_file() {
            return Ok(None);
        }

        let compressed = fs::read(&manifest_path)?;
        let content = zstd::decode_all(&compressed[..]).map_err(|e| Error::Manifest {
            path: manifest_path.clone(),
            message: format!("failed to decompress: {}", e),
        })?;
        let manifest: Manifest = bincode::deserialize(&content).map_err(|e| Error::Manifest {
            path: manifest_path.clone(),
            message: format!("failed to parse: {}", e),
        })?;

        if manifest.version != VERSION
            || manifest.config_hash != config.hash()
            || manifest.lock_file_hash != lock_file_hash
        {
            return Ok(None);
        }

        debug!(
            "Entry-point manifest found for {} so loading entry-point information directly.",
            base_path.display()
        );

        let mut entry_points = Vec::with_capacity(manifest.entry_points.len());
        for entry in manifest.entry_points {
            let package_path = base_path.join(&entry.package_path);
            let entry_point_path = base_path.join(&entry.entry_point_path);
            match get_entry_point_info(config, &package_path, &entry_point_path)? {
                EntryPointLookup::Found(entry_point) => {
                    entry_points.push(EntryPointWithDependencies {
                        entry_point: *entry_point,
                        dep_info: DependencyInfo {
                            dependencies: entry
                                .dependencies
                                .iter()
                                .map(|p| base_path.join(p))
                                .collect(),
                            missing: entry.missing.into_iter().collect(),
                            deep_imports: entry
                                .deep_imports
                                .iter()
                                .map(|p| base_path.join(p))
                                .collect(),
                        },
                    });
                }
                EntryPointLookup::Ignored => {}
                EntryPointLookup::NoEntryPoint | EntryPointLookup::Incompatible => {
                    return Err(Error::Manifest {
                        path: manifest_path,
                        message: format!(
                            "contained an invalid pair of package paths: [{}, {}]",
                            entry.package_path.display(),
                            entry.entry_point_path.display()
                        ),
                    });
                }
            }
        }

        Ok(Some(entry_points))
    }

    /// Stores the entry points found under `base_path`.
    ///
    /// Does nothing unless `base_path` is a `node_modules` directory with a
    /// lock file beside it.
    pub fn write_entry_points(
        &self,
        base_path: &Path,
        config: &Configuration,
        entry_points: &[EntryPointWithDependencies],
    ) -> Result<()> {
        if !is_node_modules(base_path) {
            return Ok(());
        }
        let Some(lock_file_hash) = compute_lock_file_hash(base_path) else {
            return Ok(());
        };

        let relative = |path: &Path| -> PathBuf {
            path.strip_prefix(base_path)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| path.to_path_buf())
        };

        let manifest = Manifest {
            version: VERSION.to_string(),
            config_hash: config.hash(),
            lock_file_hash,
            entry_points: entry_points
                .iter()
                .map(|e| ManifestEntry {
                    package_path: relative(&e.entry_point.package_path),
                    entry_point_path: relative(&e.entry_point.path),
                    dependencies: e.dep_info.dependencies.iter().map(|p| relative(p)).collect(),
                    missing: e.dep_info.missing.iter().cloned().collect(),
                    deep_imports: e.dep_info.deep_imports.iter().map(|p| relative(p)).collect(),
                })
                .collect(),
        };

        let manifest_path = Self::manifest_path(base_path);
        let serialized = bincode::serialize(&manifest).map_err(|e| Error::Manifest {
            path: manifest_path.clone(),
            message: format!("failed to serialize: {}", e),
        })?;
        let compressed = zstd::encode_all(&serialized[..], 3).map_err(|e| Error::Manifest {
            path: manifest_path.clone(),
            message: format!("failed to compress: {}", e),
        })?;
        fs::write(&manifest_path, compressed)?;

        debug!(
            "Wrote entry-point manifest for {} ({} entry points)",
            base_path.display(),
            entry_points.len()
        );
        Ok(())
    }
}

fn is_node_modules(base_path: &Path) -> bool {
    base_path.file_name().is_some_and(|name| name == "node_modules")
}

/// Hash of the first lock file found in the directory above `base_path`.
fn compute_lock_file_hash(base_path: &Path) -> Option<u64> {
    let directory = base_path.parent()?;
    LOCK_FILES.iter().find_map(|name| {
        let contents = fs::read(directory.join(name)).ok()?;
        Some(xxh3_64(&contents))
    })
}
