use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::build_marker::has_been_processed;
use crate::config::Configuration;
use crate::dependency_resolver::{
    DependencyResolver, EntryPointWithDependencies, SortedEntryPointsInfo,
};
use crate::entry_point::{get_entry_point_info, EntryPoint, EntryPointLookup};
use crate::error::{Error, Result};
use crate::options::PathMappings;
use crate::path_utils::compute_package_path;

use super::{get_base_paths, EntryPointFinder};

/// Finds one target entry point and its transitive dependencies.
///
/// Unrelated packages are never read.
pub struct TargetedEntryPointFinder<'a> {
    config: &'a Configuration,
    resolver: &'a DependencyResolver,
    target_path: PathBuf,
    base_paths: Vec<PathBuf>,
}

impl<'a> TargetedEntryPointFinder<'a> {
    pub fn new(
        config: &'a Configuration,
        resolver: &'a DependencyResolver,
        source_directory: &Path,
        target_path: &Path,
        path_mappings: Option<&PathMappings>,
    ) -> Self {
        Self {
            config,
            resolver,
            target_path: target_path.to_path_buf(),
            base_paths: get_base_paths(source_directory, path_mappings),
        }
    }

    /// Whether the target has a requested property left to process.
    ///
    /// With `compile_all_formats` off, one processed property is enough.
    pub fn target_needs_processing(
        &self,
        properties_to_consider: &[String],
        compile_all_formats: bool,
    ) -> Result<bool> {
        let Some(entry_point) = self.get_entry_point(&self.target_path)? else {
            return Ok(false);
        };
        if !entry_point.compiled_by_target {
            return Ok(false);
        }

        for property in properties_to_consider {
            if entry_point.format_path(property).is_none() {
                continue;
            }
            if !has_been_processed(&entry_point.package_json, property) {
                return Ok(true);
            }
            if !compile_all_formats {
                return Ok(false);
            }
        }
        Ok(false)
    }

    fn get_entry_point(&self, entry_point_path: &Path) -> Result<Option<EntryPoint>> {
        let package_path = compute_package_path(entry_point_path, &self.base_paths);
        match get_entry_point_info(self.config, &package_path, entry_point_path)? {
            EntryPointLookup::Found(entry_point) => Ok(Some(*entry_point)),
            _ => Ok(None),
        }
    }
}

impl EntryPointFinder for TargetedEntryPointFinder<'_> {
    fn find_entry_points(&self) -> Result<SortedEntryPointsInfo> {
        let mut unprocessed: VecDeque<PathBuf> = VecDeque::from([self.target_path.clone()]);
        let mut unsorted: HashMap<PathBuf, usize> = HashMap::new();
        let mut entry_points: Vec<EntryPointWithDependencies> = Vec::new();

        while let Some(path) = unprocessed.pop_front() {
            if unsorted.contains_key(&path) {
                continue;
            }
            let Some(entry_point) = self.get_entry_point(&path)? else {
                continue;
            };
            if !entry_point.compiled_by_target {
                continue;
            }

            let with_deps = self.resolver.get_entry_point_with_dependencies(entry_point)?;
            for dependency in &with_deps.dep_info.dependencies {
                if !unsorted.contains_key(dependency) {
                    unprocessed.push_back(dependency.clone());
                }
            }
            unsorted.insert(with_deps.entry_point.path.clone(), entry_points.len());
            entry_points.push(with_deps);
        }
        debug!(
            "Targeted search from {} visited {} entry points",
            self.target_path.display(),
            entry_points.len()
        );

        let target = unsorted
            .contains_key(&self.target_path)
            .then_some(self.target_path.as_path());
        let sorted = self
            .resolver
            .sort_entry_points_by_dependency(entry_points, target)?;

        if let Some(invalid) = sorted
            .invalid_entry_points
            .iter()
            .find(|i| i.entry_point.path == self.target_path)
        {
            return Err(Error::InvalidTarget {
                name: invalid.entry_point.name.clone(),
                missing: invalid.missing_dependencies.clone(),
            });
        }

        Ok(sorted)
    }
}
