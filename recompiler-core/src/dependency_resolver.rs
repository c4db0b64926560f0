//! Builds the dependency graph of entry points and sorts them.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::dependency_host::{collect_dependencies, DependencyHost, DependencyInfo};
use crate::entry_point::{
    get_entry_point_format, EntryPoint, EntryPointFormat, SUPPORTED_FORMAT_PROPERTIES,
};
use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::module_resolver::ModuleResolver;
use crate::path_utils::normalize;

/// Picks the dependency host for a module format.
pub type HostFactory = dyn Fn(&EntryPointFormat) -> Box<dyn DependencyHost> + Send + Sync;

/// An entry point together with what it imports.
#[derive(Debug, Clone)]
pub struct EntryPointWithDependencies {
    pub entry_point: EntryPoint,
    pub dep_info: DependencyInfo,
}

/// An entry point excluded from processing.
#[derive(Debug, Clone)]
pub struct InvalidEntryPoint {
    pub entry_point: Arc<EntryPoint>,
    /// Missing specifiers, or the paths of invalid entry points depended on.
    pub missing_dependencies: Vec<String>,
}

/// A dependency on an entry point that is not part of the graph.
#[derive(Debug, Clone)]
pub struct IgnoredDependency {
    pub entry_point: Arc<EntryPoint>,
    pub dependency_path: PathBuf,
}

/// Result of dependency analysis.
#[derive(Debug, Clone, Default)]
pub struct SortedEntryPointsInfo {
    /// Processable entry points, dependencies first.
    pub entry_points: Vec<Arc<EntryPoint>>,
    pub invalid_entry_points: Vec<InvalidEntryPoint>,
    pub ignored_dependencies: Vec<IgnoredDependency>,
    pub graph: DependencyGraph,
}

/// Computes entry point dependencies with the configured hosts.
pub struct DependencyResolver {
    module_resolver: ModuleResolver,
    get_host: Box<HostFactory>,
    typings_host: Option<Box<dyn DependencyHost>>,
}

impl DependencyResolver {
    pub fn new<F>(
        module_resolver: ModuleResolver,
        get_host: F,
        typings_host: Option<Box<dyn DependencyHost>>,
    ) -> Self
    where
        F: Fn(&EntryPointFormat) -> Box<dyn DependencyHost> + Send + Sync + 'static,
    {
        Self {
            module_resolver,
            get_host: Box::new(get_host),
            typings_host,
        }
    }

    /// Collects the dependencies of `entry_point`.
    ///
    /// Entry points not compiled by the target system get no dependencies.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuitableFormat`] if no supported property points
    /// at a bundle whose format can be determined.
    pub fn get_entry_point_with_dependencies(
        &self,
        entry_point: EntryPoint,
    ) -> Result<EntryPointWithDependencies> {
        let mut dep_info = DependencyInfo::default();

        if entry_point.compiled_by_target {
            let (format, bundle) = entry_point_format_info(&entry_point)?;
            let host = (self.get_host)(&format);
            dep_info = collect_dependencies(
                host.as_ref(),
                &self.module_resolver,
                &normalize(&entry_point.path.join(bundle)),
            );

            if let Some(typings_host) = &self.typings_host {
                dep_info.merge(collect_dependencies(
                    typings_host.as_ref(),
                    &self.module_resolver,
                    &entry_point.typings,
                ));
            }
            // An entry point never depends on itself.
            dep_info.dependencies.remove(&entry_point.path);
        }

        Ok(EntryPointWithDependencies {
            entry_point,
            dep_info,
        })
    }

    /// Builds the graph and orders the processable entry points.
    ///
    /// With a `target`, only the target and its transitive dependencies are
    /// returned.
    pub fn sort_entry_points_by_dependency(
        &self,
        entry_points: Vec<EntryPointWithDependencies>,
        target: Option<&Path>,
    ) -> Result<SortedEntryPointsInfo> {
        let mut info = compute_dependency_graph(entry_points)?;

        let order = match target {
            Some(target) if info.graph.has_node(target) => info.graph.order_of(target)?,
            Some(_) => Vec::new(),
            None => info.graph.overall_order()?,
        };

        let by_path: HashMap<&Path, &Arc<EntryPoint>> = info
            .entry_points
            .iter()
            .map(|ep| (ep.path.as_path(), ep))
            .collect();
        let sorted = order
            .iter()
            .map(|path| {
                by_path.get(path.as_path()).map(|ep| Arc::clone(ep)).ok_or_else(|| {
                    Error::Invariant(format!("no entry point for node {}", path.display()))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        info.entry_points = sorted;

        debug!(
            "Sorted {} entry points ({} invalid, {} ignored dependencies)",
            info.entry_points.len(),
            info.invalid_entry_points.len(),
            info.ignored_dependencies.len()
        );
        Ok(info)
    }
}

/// The first supported property whose bundle format can be determined.
fn entry_point_format_info(entry_point: &EntryPoint) -> Result<(EntryPointFormat, String)> {
    SUPPORTED_FORMAT_PROPERTIES
        .iter()
        .find_map(|property| {
            let bundle = entry_point.format_path(property)?;
            let format = get_entry_point_format(entry_point, property)?;
            Some((format, bundle.to_string()))
        })
        .ok_or_else(|| Error::NoSuitableFormat(entry_point.path.clone()))
}

/// Graph construction state while invalid entry points are removed.
#[derive(Default)]
struct GraphBuilder {
    graph: DependencyGraph,
    invalid: Vec<InvalidEntryPoint>,
    invalid_paths: HashSet<PathBuf>,
    ignored: Vec<IgnoredDependency>,
}

impl GraphBuilder {
    /// Removes `root` and everything depending on it, marking them invalid.
    fn remove_nodes(
        &mut self,
        entry_points: &HashMap<PathBuf, Arc<EntryPoint>>,
        root: &Path,
        missing: Vec<String>,
    ) -> Result<()> {
        if !self.graph.has_node(root) {
            return Ok(());
        }
        let mut nodes = vec![root.to_path_buf()];
        nodes.extend(self.graph.dependants_of(root)?);

        for node in nodes {
            self.graph.remove_node(&node);
            if let Some(entry_point) = entry_points.get(&node) {
                self.invalid.push(InvalidEntryPoint {
                    entry_point: Arc::clone(entry_point),
                    missing_dependencies: missing.clone(),
                });
                self.invalid_paths.insert(node);
            }
        }
        Ok(())
    }
}

/// Adds every compiled entry point to a graph and removes invalid ones.
///
/// The returned `entry_points` are the graph's nodes in input order.
fn compute_dependency_graph(
    entry_points: Vec<EntryPointWithDependencies>,
) -> Result<SortedEntryPointsInfo> {
    let compiled: Vec<(Arc<EntryPoint>, DependencyInfo)> = entry_points
        .into_iter()
        .filter(|e| e.entry_point.compiled_by_target)
        .map(|e| (Arc::new(e.entry_point), e.dep_info))
        .collect();
    let by_path: HashMap<PathBuf, Arc<EntryPoint>> = compiled
        .iter()
        .map(|(ep, _)| (ep.path.clone(), Arc::clone(ep)))
        .collect();

    let mut builder = GraphBuilder::default();
    for (entry_point, _) in &compiled {
        builder.graph.add_node(&entry_point.path);
    }

    for (entry_point, dep_info) in &compiled {
        if !dep_info.missing.is_empty() && !entry_point.ignore_missing_dependencies {
            let missing: Vec<String> = dep_info.missing.iter().cloned().collect();
            warn!(
                "Entry point {} has missing dependencies:{}",
                entry_point.name,
                missing.iter().map(|m| format!("\n - {}", m)).collect::<String>()
            );
            builder.remove_nodes(&by_path, &entry_point.path, missing)?;
        } else {
            for dependency_path in &dep_info.dependencies {
                if !builder.graph.has_node(&entry_point.path) {
                    break;
                }
                if builder.graph.has_node(dependency_path) {
                    builder
                        .graph
                        .add_dependency(&entry_point.path, dependency_path)?;
                } else if builder.invalid_paths.contains(dependency_path) {
                    builder.remove_nodes(
                        &by_path,
                        &entry_point.path,
                        vec![dependency_path.display().to_string()],
                    )?;
                } else {
                    builder.ignored.push(IgnoredDependency {
                        entry_point: Arc::clone(entry_point),
                        dependency_path: dependency_path.clone(),
                    });
                }
            }
        }

        if !dep_info.deep_imports.is_empty() {
            let imports: Vec<String> = dep_info
                .deep_imports
                .iter()
                .map(|p| format!("'{}'", p.display()))
                .collect();
            warn!(
                "Entry point '{}' contains deep imports into {}. This is probably not a problem, but may cause the compilation of entry points to be out of order.",
                entry_point.name,
                imports.join(", ")
            );
        }
    }

    let entry_points = compiled
        .iter()
        .filter(|(ep, _)| builder.graph.has_node(&ep.path))
        .map(|(ep, _)| Arc::clone(ep))
        .collect();

    Ok(SortedEntryPointsInfo {
        entry_points,
        invalid_entry_points: builder.invalid,
        ignored_dependencies: builder.ignored,
        graph: builder.graph,
    })
}
