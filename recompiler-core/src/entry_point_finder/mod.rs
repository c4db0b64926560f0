//! Strategies for discovering the entry points to process.

mod directory_walker;
mod targeted;

pub use directory_walker::DirectoryWalkerEntryPointFinder;
pub use targeted::TargetedEntryPointFinder;

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::dependency_resolver::SortedEntryPointsInfo;
use crate::error::Result;
use crate::options::PathMappings;

/// Name of the directory holding output written next to original bundles.
pub const RECOMPILED_DIRECTORY: &str = "__recompiled__";

/// Finds entry points and sorts them by dependency.
pub trait EntryPointFinder {
    fn find_entry_points(&self) -> Result<SortedEntryPointsInfo>;
}

/// Directory names that never contain entry points.
pub(crate) fn is_ignorable_path(name: &str) -> bool {
    name.starts_with('.') || name == "node_modules" || name == RECOMPILED_DIRECTORY
}

/// The base path plus the roots of any path mapping targets.
///
/// Paths nested inside another listed path are dropped.
pub fn get_base_paths(
    source_directory: &Path,
    path_mappings: Option<&PathMappings>,
) -> Vec<PathBuf> {
    let mut base_paths = vec![source_directory.to_path_buf()];

    if let Some(mappings) = path_mappings {
        for targets in mappings.paths.values() {
            for target in targets {
                let prefix = target.split('*').next().unwrap_or(target);
                let mut base_path = mappings.base_url.join(prefix);
                if (!prefix.is_empty() && !prefix.ends_with('/')) || base_path.is_file() {
                    // `dist/lib-*` lives in `dist`.
                    if let Some(parent) = base_path.parent() {
                        base_path = parent.to_path_buf();
                    }
                }
                let base_path = crate::path_utils::normalize(&base_path);
                if base_path.is_dir() {
                    base_paths.push(base_path);
                } else {
                    debug!(
                        "The basePath {} computed from path mappings does not exist",
                        base_path.display()
                    );
                }
            }
        }
    }

    base_paths.sort();
    base_paths.dedup();
    let mut deduped: Vec<PathBuf> = Vec::with_capacity(base_paths.len());
    for path in base_paths {
        if !deduped.iter().any(|existing| path.starts_with(existing)) {
            deduped.push(path);
        }
    }

    // Keep the source directory first.
    if let Some(index) = deduped.iter().position(|p| p == source_directory) {
        let source = deduped.remove(index);
        deduped.insert(0, source);
    }
    deduped
}
