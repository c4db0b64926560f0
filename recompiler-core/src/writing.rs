//! Writers that put compiled files on disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::error;

use crate::build_marker::RECOMPILED_PROPERTY_SUFFIX;
use crate::compiler::{EntryPointBundle, FileToWrite};
use crate::entry_point_finder::RECOMPILED_DIRECTORY;
use crate::error::{Error, Result};
use crate::package_json_updater::{PackageJsonUpdate, PackageJsonUpdater};
use crate::path_utils::{normalize, relative_path};
use crate::tasks::DtsProcessing;

/// Extension appended to the original of an overwritten file.
pub const BACKUP_EXTENSION: &str = ".bak";

/// Writes the output of one compiled bundle.
pub trait FileWriter: Send {
    fn write_bundle(
        &self,
        bundle: &EntryPointBundle,
        files: &[FileToWrite],
        format_properties: &[String],
    ) -> Result<()>;
}

/// Path of the backup kept for `path`.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut backup = path.as_os_str().to_os_string();
    backup.push(BACKUP_EXTENSION);
    PathBuf::from(backup)
}

fn is_typings_file(path: &Path) -> bool {
    path.to_string_lossy().ends_with(".d.ts")
}

/// Only typings are written for typings-only tasks.
fn should_write(bundle: &EntryPointBundle, file: &FileToWrite) -> bool {
    bundle.process_dts != DtsProcessing::Only || is_typings_file(&file.path)
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(())
}

/// Overwrites the original files.
pub struct InPlaceFileWriter {
    backup_originals: bool,
    error_on_failed_entry_point: bool,
}

impl InPlaceFileWriter {
    pub fn new(backup_originals: bool, error_on_failed_entry_point: bool) -> Self {
        Self {
            backup_originals,
            error_on_failed_entry_point,
        }
    }

    /// Writes `file`, first moving an existing original to its backup path.
    ///
    /// An existing backup is never overwritten: it holds the pristine file.
    fn write_file_and_backup(&self, file: &FileToWrite) -> Result<()> {
        if self.backup_originals {
            let backup = backup_path(&file.path);
            if backup.exists() {
                let message = format!(
                    "Tried to overwrite {} with a recompiler back up file, which is disallowed.",
                    backup.display()
                );
                if self.error_on_failed_entry_point {
                    return Err(Error::Invariant(message));
                }
                error!("{}", message);
            } else if file.path.exists() {
                fs::rename(&file.path, &backup)?;
            }
        }
        write_file(&file.path, &file.contents)
    }
}

impl FileWriter for InPlaceFileWriter {
    fn write_bundle(
        &self,
        bundle: &EntryPointBundle,
        files: &[FileToWrite],
        _format_properties: &[String],
    ) -> Result<()> {
        files
            .iter()
            .filter(|file| should_write(bundle, file))
            .try_for_each(|file| self.write_file_and_backup(file))
    }
}

/// Writes compiled bundles under `__recompiled__` in the package and points
/// new `<property>_recompiled` properties at them.
///
/// Typings are still written in place.
pub struct NewEntryPointFileWriter {
    updater: Arc<dyn PackageJsonUpdater>,
    in_place: InPlaceFileWriter,
}

impl NewEntryPointFileWriter {
    pub fn new(
        updater: Arc<dyn PackageJsonUpdater>,
        backup_originals: bool,
        error_on_failed_entry_point: bool,
    ) -> Self {
        Self {
            updater,
            in_place: InPlaceFileWriter::new(backup_originals, error_on_failed_entry_point),
        }
    }

    fn relocated(package_path: &Path, path: &Path) -> PathBuf {
        let relative = path.strip_prefix(package_path).unwrap_or(path);
        package_path.join(RECOMPILED_DIRECTORY).join(relative)
    }

    fn update_package_json(
        &self,
        bundle: &EntryPointBundle,
        format_properties: &[String],
    ) -> Result<()> {
        let entry_point = &bundle.entry_point;
        let mut update = PackageJsonUpdate::new(self.updater.as_ref());

        for property in format_properties {
            let Some(format_path) = entry_point.format_path(property) else {
                continue;
            };
            let format_path = normalize(&entry_point.path.join(format_path));
            let new_format_path = Self::relocated(&entry_point.package_path, &format_path);
            let new_property = format!("{}{}", property, RECOMPILED_PROPERTY_SUFFIX);
            update.add_change(
                &[new_property.as_str()],
                Value::String(relative_path(&entry_point.path, &new_format_path)),
            );
        }

        update.write_changes(&entry_point.package_json_path())
    }
}

impl FileWriter for NewEntryPointFileWriter {
    fn write_bundle(
        &self,
        bundle: &EntryPointBundle,
        files: &[FileToWrite],
        format_properties: &[String],
    ) -> Result<()> {
        let package_path = &bundle.entry_point.package_path;
        for file in files.iter().filter(|file| should_write(bundle, file)) {
            if is_typings_file(&file.path) {
                self.in_place.write_file_and_backup(file)?;
            } else {
                write_file(&Self::relocated(package_path, &file.path), &file.contents)?;
            }
        }

        if bundle.process_dts != DtsProcessing::Only {
            self.update_package_json(bundle, format_properties)?;
        }
        Ok(())
    }
}
