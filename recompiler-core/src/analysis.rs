//! Finding entry points and planning tasks for a run.

use tracing::debug;

use crate::cleaning::clean_outdated_packages;
use crate::dependency_resolver::{DependencyResolver, SortedEntryPointsInfo};
use crate::entry_point_finder::{
    DirectoryWalkerEntryPointFinder, EntryPointFinder, TargetedEntryPointFinder,
};
use crate::error::Result;
use crate::execution::{AnalyzeEntryPointsFn, AnalyzedEntryPoints};
use crate::manifest::EntryPointManifest;
use crate::options::ResolvedOptions;
use crate::package_json_updater::PackageJsonUpdater;
use crate::planner::{plan_tasks, PlanOptions};
use crate::tasks::create_task_queue;

/// Finds and sorts the entry points a run covers.
///
/// A target restricts the search to the target and its dependencies.
pub fn find_entry_points(
    options: &ResolvedOptions,
    resolver: &DependencyResolver,
    invalidate_manifest: bool,
) -> Result<SortedEntryPointsInfo> {
    match &options.target_entry_point_path {
        Some(target) => TargetedEntryPointFinder::new(
            &options.config,
            resolver,
            &options.base_path,
            target,
            options.path_mappings.as_ref(),
        )
        .find_entry_points(),
        None => DirectoryWalkerEntryPointFinder::new(
            &options.config,
            resolver,
            EntryPointManifest::new(invalidate_manifest),
            &options.base_path,
            options.path_mappings.as_ref(),
        )
        .find_entry_points(),
    }
}

/// Whether a targeted run has anything to do.
///
/// Untargeted runs always analyze.
pub fn target_needs_processing(
    options: &ResolvedOptions,
    resolver: &DependencyResolver,
) -> Result<bool> {
    let Some(target) = &options.target_entry_point_path else {
        return Ok(true);
    };
    let finder = TargetedEntryPointFinder::new(
        &options.config,
        resolver,
        &options.base_path,
        target,
        options.path_mappings.as_ref(),
    );
    finder.target_needs_processing(&options.properties_to_consider, options.compile_all_formats)
}

/// Finds entry points, cleans stale output and builds the task queue.
pub fn analyze_entry_points(
    options: &ResolvedOptions,
    resolver: &DependencyResolver,
    updater: &dyn PackageJsonUpdater,
) -> Result<AnalyzedEntryPoints> {
    let mut sorted = find_entry_points(options, resolver, options.invalidate_entry_point_manifest)?;
    if clean_outdated_packages(&sorted.entry_points, updater)? {
        debug!("Cleaned outdated packages; finding entry-points again.");
        sorted = find_entry_points(options, resolver, true)?;
    }

    let planned = plan_tasks(
        &sorted.entry_points,
        &PlanOptions {
            properties_to_consider: options.properties_to_consider.clone(),
            compile_all_formats: options.compile_all_formats,
            typings_only: options.typings_only,
        },
    );
    let queue = create_task_queue(options.in_parallel(), planned.tasks, &sorted.graph)?;

    Ok(AnalyzedEntryPoints {
        queue,
        unprocessable: planned.unprocessable,
        properties_to_consider: options.properties_to_consider.clone(),
    })
}

/// Defers [`analyze_entry_points`] until the executor holds the lock.
pub fn get_analyze_entry_points_fn(
    options: ResolvedOptions,
    resolver: DependencyResolver,
) -> AnalyzeEntryPointsFn {
    Box::new(move |updater| analyze_entry_points(&options, &resolver, updater))
}
