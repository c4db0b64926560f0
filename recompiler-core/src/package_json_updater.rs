//! Serialized writes to package metadata files.
//!
//! Every write for a run goes through one [`PackageJsonUpdater`]. The direct
//! updater applies changes in-process; cluster workers use a proxy that
//! forwards the same [`PackageJsonChange`] list to the coordinator.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::trace;

use crate::error::{Error, Result};
use crate::package_json::PackageJson;

/// One property write. A `None` value removes the property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageJsonChange {
    pub property_path: Vec<String>,
    pub value: Option<Value>,
}

/// Applies batches of changes to a `package.json` file.
pub trait PackageJsonUpdater: Send + Sync {
    fn write_changes(&self, changes: &[PackageJsonChange], package_json_path: &Path)
        -> Result<()>;
}

/// Collects changes and writes them in a single batch.
pub struct PackageJsonUpdate<'a> {
    updater: &'a dyn PackageJsonUpdater,
    changes: Vec<PackageJsonChange>,
}

impl<'a> PackageJsonUpdate<'a> {
    pub fn new(updater: &'a dyn PackageJsonUpdater) -> Self {
        Self {
            updater,
            changes: Vec::new(),
        }
    }

    pub fn add_change(&mut self, property_path: &[&str], value: Value) -> &mut Self {
        self.changes.push(PackageJsonChange {
            property_path: property_path.iter().map(|s| s.to_string()).collect(),
            value: Some(value),
        });
        self
    }

    pub fn remove_property(&mut self, property_path: &[&str]) -> &mut Self {
        self.changes.push(PackageJsonChange {
            property_path: property_path.iter().map(|s| s.to_string()).collect(),
            value: None,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn write_changes(self, package_json_path: &Path) -> Result<()> {
        if self.changes.is_empty() {
            return Ok(());
        }
        self.updater.write_changes(&self.changes, package_json_path)
    }
}

/// Applies changes to a metadata object in memory.
pub fn apply_changes(
    fields: &mut Map<String, Value>,
    changes: &[PackageJsonChange],
    package_json_path: &Path,
) -> Result<()> {
    for change in changes {
        let Some((last, parents)) = change.property_path.split_last() else {
            return Err(Error::PackageJsonUpdate {
                path: package_json_path.to_path_buf(),
                message: "empty property path".to_string(),
            });
        };

        let mut target = &mut *fields;
        for (depth, key) in parents.iter().enumerate() {
            let entry = target
                .entry(key.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            target = match entry {
                Value::Object(map) => map,
                _ => {
                    return Err(Error::PackageJsonUpdate {
                        path: package_json_path.to_path_buf(),
                        message: format!(
                            "property path {} is not an object",
                            change.property_path[..=depth].join(".")
                        ),
                    })
                }
            };
        }

        match &change.value {
            Some(value) => {
                target.insert(last.clone(), value.clone());
            }
            None => {
                target.remove(last);
            }
        }
    }
    Ok(())
}

/// Writes changes straight to disk, one file at a time.
///
/// Each write reads the current file, merges the changes and replaces the
/// file atomically. Writes to the same path are serialized.
#[derive(Default)]
pub struct DirectPackageJsonUpdater {
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl DirectPackageJsonUpdater {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }
}

impl PackageJsonUpdater for DirectPackageJsonUpdater {
    fn write_changes(
        &self,
        changes: &[PackageJsonChange],
        package_json_path: &Path,
    ) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let lock = self.lock_for(package_json_path);
        let _guard = lock
            .lock()
            .map_err(|e| Error::MutexLock(format!("package.json lock poisoned: {}", e)))?;

        let mut package_json = if package_json_path.exists() {
            PackageJson::load(package_json_path)?
        } else {
            PackageJson::default()
        };
        apply_changes(package_json.fields_mut(), changes, package_json_path)?;

        let dir = package_json_path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;
        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(package_json.to_pretty_string()?.as_bytes())?;
        temp.persist(package_json_path)
            .map_err(|e| Error::Io(e.error))?;

        trace!(
            "Wrote {} change(s) to {}",
            changes.len(),
            package_json_path.display()
        );
        Ok(())
    }
}
