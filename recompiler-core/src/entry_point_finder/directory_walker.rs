use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::config::Configuration;
use crate::dependency_resolver::{
    DependencyResolver, EntryPointWithDependencies, SortedEntryPointsInfo,
};
use crate::entry_point::{get_entry_point_info, EntryPointLookup};
use crate::error::Result;
use crate::manifest::EntryPointManifest;
use crate::options::PathMappings;

use super::{get_base_paths, is_ignorable_path, EntryPointFinder};

struct DirEntry {
    name: String,
    path: PathBuf,
    is_dir: bool,
}

/// Sorted, non-symlink children of a directory.
fn read_dir(directory: &Path) -> Vec<DirEntry> {
    WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| !e.path_is_symlink())
        .map(|e| DirEntry {
            name: e.file_name().to_string_lossy().to_string(),
            is_dir: e.file_type().is_dir(),
            path: e.into_path(),
        })
        .collect()
}

/// Finds every entry point below the base paths.
pub struct DirectoryWalkerEntryPointFinder<'a> {
    config: &'a Configuration,
    resolver: &'a DependencyResolver,
    manifest: EntryPointManifest,
    base_paths: Vec<PathBuf>,
}

impl<'a> DirectoryWalkerEntryPointFinder<'a> {
    pub fn new(
        config: &'a Configuration,
        resolver: &'a DependencyResolver,
        manifest: EntryPointManifest,
        source_directory: &Path,
        path_mappings: Option<&PathMappings>,
    ) -> Self {
        Self {
            config,
            resolver,
            manifest,
            base_paths: get_base_paths(source_directory, path_mappings),
        }
    }

    pub fn base_paths(&self) -> &[PathBuf] {
        &self.base_paths
    }

    /// Walks `base_path` and records the result in the manifest.
    pub fn walk_base_path(&self, base_path: &Path) -> Result<Vec<EntryPointWithDependencies>> {
        debug!(
            "No manifest found for {} so walking the directories for entry-points.",
            base_path.display()
        );
        let mut entry_points = Vec::new();
        self.walk_directory_for_packages(base_path, &mut entry_points)?;
        self.manifest
            .write_entry_points(base_path, self.config, &entry_points)?;
        Ok(entry_points)
    }

    fn walk_directory_for_packages(
        &self,
        source_directory: &Path,
        entry_points: &mut Vec<EntryPointWithDependencies>,
    ) -> Result<()> {
        let primary = get_entry_point_info(self.config, source_directory, source_directory)?;

        match primary {
            EntryPointLookup::Incompatible => Ok(()),
            EntryPointLookup::NoEntryPoint => {
                // Not a package: look for packages in sub-directories.
                for child in read_dir(source_directory) {
                    if child.is_dir && !is_ignorable_path(&child.name) {
                        self.walk_directory_for_packages(&child.path, entry_points)?;
                    }
                }
                Ok(())
            }
            lookup => {
                let first = entry_points.len();
                if let EntryPointLookup::Found(entry_point) = lookup {
                    entry_points
                        .push(self.resolver.get_entry_point_with_dependencies(*entry_point)?);
                }
                self.collect_secondary_entry_points(
                    entry_points,
                    source_directory,
                    source_directory,
                    read_dir(source_directory),
                )?;

                let any_compiled = entry_points[first..]
                    .iter()
                    .any(|e| e.entry_point.compiled_by_target);
                let nested = source_directory.join("node_modules");
                if any_compiled && nested.is_dir() {
                    self.walk_directory_for_packages(&nested, entry_points)?;
                }
                Ok(())
            }
        }
    }

    fn collect_secondary_entry_points(
        &self,
        entry_points: &mut Vec<EntryPointWithDependencies>,
        package_path: &Path,
        directory: &Path,
        children: Vec<DirEntry>,
    ) -> Result<()> {
        for child in children {
            if is_ignorable_path(&child.name) {
                continue;
            }
            if !child.is_dir && !child.name.ends_with(".js") {
                continue;
            }

            // `foo.js` may stand for a `foo` entry point described by configuration.
            let possible_entry_point = if child.is_dir {
                child.path.clone()
            } else {
                directory.join(child.name.trim_end_matches(".js"))
            };

            let lookup = get_entry_point_info(self.config, package_path, &possible_entry_point)?;
            let is_entry_point = lookup.is_entry_point();
            if let EntryPointLookup::Found(entry_point) = lookup {
                entry_points.push(self.resolver.get_entry_point_with_dependencies(*entry_point)?);
            }

            if !child.is_dir {
                continue;
            }

            let grandchildren = read_dir(&child.path);
            // Directories of plain JS files rarely hold entry points.
            let has_js_files = grandchildren
                .iter()
                .any(|g| !g.is_dir && g.name.ends_with(".js"));
            if !is_entry_point && has_js_files {
                continue;
            }
            self.collect_secondary_entry_points(
                entry_points,
                package_path,
                &child.path,
                grandchildren,
            )?;
        }
        Ok(())
    }
}

impl EntryPointFinder for DirectoryWalkerEntryPointFinder<'_> {
    fn find_entry_points(&self) -> Result<SortedEntryPointsInfo> {
        let mut unsorted = Vec::new();
        for base_path in &self.base_paths {
            let entry_points = match self.manifest.read_entry_points(base_path, self.config) {
                Some(entry_points) => entry_points,
                None => self.walk_base_path(base_path)?,
            };
            unsorted.extend(entry_points);
        }
        self.resolver.sort_entry_points_by_dependency(unsorted, None)
    }
}
