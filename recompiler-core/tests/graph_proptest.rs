use std::collections::HashSet;
use std::path::PathBuf;

use proptest::prelude::*;
use recompiler_core::graph::DependencyGraph;

/// Node count plus edges that only point at lower indices, so never a cycle.
fn gen_dag() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (1usize..12).prop_flat_map(|count| {
        let edges = prop::collection::vec((0..count, 0..count), 0..count * 2).prop_map(|pairs| {
            pairs
                .into_iter()
                .filter(|(from, to)| from > to)
                .collect::<Vec<_>>()
        });
        (Just(count), edges)
    })
}

fn node(index: usize) -> PathBuf {
    PathBuf::from(format!("/nm/pkg-{}", index))
}

proptest! {
    #[test]
    fn test_order_contains_every_node_once((count, edges) in gen_dag()) {
        let mut graph = DependencyGraph::new();
        for i in 0..count {
            graph.add_node(&node(i));
        }
        for (from, to) in &edges {
            graph.add_dependency(&node(*from), &node(*to)).unwrap();
        }

        let order = graph.overall_order().unwrap();
        prop_assert_eq!(order.len(), count);
        let mut seen = HashSet::new();
        for path in &order {
            prop_assert!(seen.insert(path.clone()), "Duplicate node in order: {}", path.display());
        }
    }

    #[test]
    fn test_order_respects_every_edge((count, edges) in gen_dag()) {
        let mut graph = DependencyGraph::new();
        for i in 0..count {
            graph.add_node(&node(i));
        }
        for (from, to) in &edges {
            graph.add_dependency(&node(*from), &node(*to)).unwrap();
        }

        let order = graph.overall_order().unwrap();
        let position = |path: &PathBuf| order.iter().position(|x| x == path).unwrap();
        for (from, to) in &edges {
            prop_assert!(position(&node(*to)) < position(&node(*from)));
        }
    }
}
