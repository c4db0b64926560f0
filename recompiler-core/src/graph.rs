//! Dependency graph of entry points using petgraph.
//!
//! Edges point from an entry point to the entry points it depends on.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::{Path, PathBuf};

use petgraph::algo::tarjan_scc;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{Dfs, DfsPostOrder, Reversed};
use petgraph::Direction;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use crate::error::{Error, Result};

/// Directed graph of entry point paths.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: StableDiGraph<PathBuf, ()>,
    node_map: FxHashMap<PathBuf, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node, returning the existing index if the path is known.
    pub fn add_node(&mut self, path: &Path) -> NodeIndex {
        if let Some(&index) = self.node_map.get(path) {
            return index;
        }
        let index = self.graph.add_node(path.to_path_buf());
        self.node_map.insert(path.to_path_buf(), index);
        index
    }

    #[inline]
    pub fn has_node(&self, path: &Path) -> bool {
        self.node_map.contains_key(path)
    }

    /// Removes a node and its edges. Other indices stay stable.
    pub fn remove_node(&mut self, path: &Path) -> Option<PathBuf> {
        let index = self.node_map.remove(path)?;
        trace!("Removing {} from the dependency graph", path.display());
        self.graph.remove_node(index)
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Records that `from` depends on `to`. Both nodes must exist.
    pub fn add_dependency(&mut self, from: &Path, to: &Path) -> Result<()> {
        let from_index = self.index_of(from)?;
        let to_index = self.index_of(to)?;
        if !self.graph.contains_edge(from_index, to_index) {
            self.graph.add_edge(from_index, to_index, ());
        }
        Ok(())
    }

    fn index_of(&self, path: &Path) -> Result<NodeIndex> {
        self.node_map.get(path).copied().ok_or_else(|| {
            Error::Invariant(format!("{} is not in the dependency graph", path.display()))
        })
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Path> {
        self.graph.node_indices().map(move |i| self.graph[i].as_path())
    }

    /// Direct dependencies of `path`, in insertion order.
    pub fn direct_dependencies(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let index = self.index_of(path)?;
        let mut deps: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(index, Direction::Outgoing)
            .collect();
        deps.sort();
        Ok(deps.into_iter().map(|i| self.graph[i].clone()).collect())
    }

    /// All transitive dependencies of `path`, dependencies before dependants.
    pub fn dependencies_of(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let start = self.index_of(path)?;
        let mut dfs = DfsPostOrder::new(&self.graph, start);
        let mut result = Vec::new();
        while let Some(index) = dfs.next(&self.graph) {
            if index != start {
                result.push(self.graph[index].clone());
            }
        }
        Ok(result)
    }

    /// All entry points that transitively depend on `path`.
    pub fn dependants_of(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let start = self.index_of(path)?;
        let reversed = Reversed(&self.graph);
        let mut dfs = Dfs::new(reversed, start);
        let mut result = Vec::new();
        while let Some(index) = dfs.next(reversed) {
            if index != start {
                result.push(self.graph[index].clone());
            }
        }
        result.sort_by_key(|p| self.node_map.get(p).copied());
        Ok(result)
    }

    /// Orders every node so that dependencies come first.
    ///
    /// Nodes with no ordering constraint between them keep insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CircularDependency`] naming the nodes of a cycle.
    pub fn overall_order(&self) -> Result<Vec<PathBuf>> {
        self.order_nodes(self.graph.node_indices().collect())
    }

    /// Orders `path` and its transitive dependencies, `path` last.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CircularDependency`] if a cycle is reachable from
    /// `path`.
    pub fn order_of(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let start = self.index_of(path)?;
        let mut dfs = Dfs::new(&self.graph, start);
        let mut closure = FxHashSet::default();
        while let Some(index) = dfs.next(&self.graph) {
            closure.insert(index);
        }
        self.order_nodes(closure)
    }

    /// Kahn's algorithm over `nodes`, taking the lowest index first.
    fn order_nodes(&self, nodes: FxHashSet<NodeIndex>) -> Result<Vec<PathBuf>> {
        let mut pending: FxHashMap<NodeIndex, usize> = nodes
            .iter()
            .map(|&i| {
                let deps = self
                    .graph
                    .neighbors_directed(i, Direction::Outgoing)
                    .filter(|dep| nodes.contains(dep))
                    .count();
                (i, deps)
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<NodeIndex>> = pending
            .iter()
            .filter(|(_, deps)| **deps == 0)
            .map(|(&i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(nodes.len());
        while let Some(Reverse(index)) = ready.pop() {
            order.push(self.graph[index].clone());
            for dependant in self.graph.neighbors_directed(index, Direction::Incoming) {
                if let Some(deps) = pending.get_mut(&dependant) {
                    *deps -= 1;
                    if *deps == 0 {
                        ready.push(Reverse(dependant));
                    }
                }
            }
        }

        if order.len() < nodes.len() {
            return Err(Error::CircularDependency(self.find_cycle(&nodes)));
        }
        Ok(order)
    }

    fn find_cycle(&self, nodes: &FxHashSet<NodeIndex>) -> Vec<PathBuf> {
        tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| nodes.contains(&scc[0]))
            .find(|scc| scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]))
            .map(|mut scc| {
                scc.sort();
                scc.into_iter().map(|i| self.graph[i].clone()).collect()
            })
            .unwrap_or_default()
    }
}
