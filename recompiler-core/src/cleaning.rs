//! Reverting packages processed by a different version of the tool.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::build_marker::{clean_package_json, needs_cleaning};
use crate::entry_point::EntryPoint;
use crate::entry_point_finder::RECOMPILED_DIRECTORY;
use crate::error::Result;
use crate::package_json::{PackageJson, PACKAGE_JSON};
use crate::package_json_updater::PackageJsonUpdater;
use crate::writing::BACKUP_EXTENSION;

/// Cleans every package containing an entry point with stale markers.
///
/// Returns `true` if any package was cleaned, in which case entry points
/// must be found again.
pub fn clean_outdated_packages(
    entry_points: &[Arc<EntryPoint>],
    updater: &dyn PackageJsonUpdater,
) -> Result<bool> {
    let packages: BTreeSet<&Path> = entry_points
        .iter()
        .filter(|ep| needs_cleaning(&ep.package_json))
        .map(|ep| ep.package_path.as_path())
        .collect();

    for package_path in &packages {
        info!("Cleaning outdated package {}", package_path.display());
        clean_package(package_path, updater)?;
    }

    Ok(!packages.is_empty())
}

enum CleanAction {
    PackageJson(PathBuf),
    RemoveDirectory(PathBuf),
    RestoreBackup { backup: PathBuf, original: PathBuf },
}

/// Strips markers, removes relocated output and restores backed-up files.
///
/// Nested `node_modules` directories belong to other packages and are left
/// alone.
pub fn clean_package(package_path: &Path, updater: &dyn PackageJsonUpdater) -> Result<()> {
    let mut actions = Vec::new();

    let mut walker = WalkDir::new(package_path)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.file_name() != "node_modules");

    while let Some(entry) = walker.next() {
        let entry = entry.map_err(std::io::Error::from)?;
        let path = entry.path();
        let file_type = entry.file_type();

        if file_type.is_dir() && entry.file_name() == RECOMPILED_DIRECTORY {
            actions.push(CleanAction::RemoveDirectory(path.to_path_buf()));
            walker.skip_current_dir();
        } else if file_type.is_file() && entry.file_name() == PACKAGE_JSON {
            actions.push(CleanAction::PackageJson(path.to_path_buf()));
        } else if file_type.is_file() {
            if let Some(original) = original_of_backup(path) {
                actions.push(CleanAction::RestoreBackup {
                    backup: path.to_path_buf(),
                    original,
                });
            }
        }
    }

    for action in actions {
        match action {
            CleanAction::PackageJson(path) => {
                let package_json = PackageJson::load(&path)?;
                if clean_package_json(updater, &package_json, &path)? {
                    debug!("Cleaned {}", path.display());
                }
            }
            CleanAction::RemoveDirectory(path) => {
                debug!("Removing {}", path.display());
                fs::remove_dir_all(&path)?;
            }
            CleanAction::RestoreBackup { backup, original } => {
                debug!("Restoring {}", original.display());
                fs::rename(&backup, &original)?;
            }
        }
    }

    Ok(())
}

/// The original a backup file belongs to, if that original still exists.
fn original_of_backup(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let original_name = name.strip_suffix(BACKUP_EXTENSION)?;
    if original_name.is_empty() {
        return None;
    }
    let original = path.with_file_name(original_name);
    original.is_file().then_some(original)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_marker::PROCESSED_MARKER_KEY;
    use crate::package_json_updater::DirectPackageJsonUpdater;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_clean_package_reverts_processing() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(
            root.join(PACKAGE_JSON),
            json!({
                "name": "lib",
                "fesm2015": "./lib.js",
                "fesm2015_recompiled": "./__recompiled__/lib.js",
                PROCESSED_MARKER_KEY: { "fesm2015": "0.0.0-old" }
            })
            .to_string(),
        )
        .unwrap();
        fs::write(root.join("lib.js"), "compiled").unwrap();
        fs::write(root.join("lib.js.bak"), "original").unwrap();
        fs::create_dir_all(root.join(RECOMPILED_DIRECTORY)).unwrap();
        fs::write(root.join(RECOMPILED_DIRECTORY).join("lib.js"), "compiled").unwrap();
        fs::create_dir_all(root.join("node_modules/dep")).unwrap();
        fs::write(root.join("node_modules/dep/x.js.bak"), "untouched").unwrap();
        fs::write(root.join("node_modules/dep/x.js"), "untouched").unwrap();

        clean_package(root, &DirectPackageJsonUpdater::new()).unwrap();

        assert_eq!(fs::read_to_string(root.join("lib.js")).unwrap(), "original");
        assert!(!root.join("lib.js.bak").exists());
        assert!(!root.join(RECOMPILED_DIRECTORY).exists());
        assert!(root.join("node_modules/dep/x.js.bak").exists());

        let pj = PackageJson::load(&root.join(PACKAGE_JSON)).unwrap();
        assert!(pj.get(PROCESSED_MARKER_KEY).is_none());
        assert!(pj.get("fesm2015_recompiled").is_none());
        assert_eq!(pj.get_str("fesm2015"), Some("./lib.js"));
    }
}
