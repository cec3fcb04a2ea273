//! Structural comparison of an estimated graph against a reference.
//!
//! Nodes are matched by name, so the two graphs may order their nodes
//! differently. Adjacencies are compared as unordered pairs; arrowheads are
//! compared per (edge, endpoint) and counted only where both graphs have the
//! adjacency, so a missing edge is not also reported as missing arrowheads.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::search::SearchError;
use crate::types::{Endpoint, Graph};

/// Confusion counts for adjacencies and arrowheads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphComparison {
    /// Adjacencies in both graphs.
    pub adjacency_tp: usize,
    /// Adjacencies only in the target.
    pub adjacency_fp: usize,
    /// Adjacencies only in the reference.
    pub adjacency_fn: usize,
    /// Arrowheads in both graphs, on shared adjacencies.
    pub arrowhead_tp: usize,
    /// Arrowheads only in the target, on shared adjacencies.
    pub arrowhead_fp: usize,
    /// Arrowheads only in the reference, on shared adjacencies.
    pub arrowhead_fn: usize,
    /// Edges added relative to the reference, as `A o-> B` strings.
    pub edges_added: Vec<String>,
    /// Edges of the reference missing from the target.
    pub edges_removed: Vec<String>,
}

type Pair = (String, String);

fn pair(a: &str, b: &str) -> Pair {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Arrowheads as (edge pair, node carrying the arrowhead).
fn arrowheads(graph: &Graph) -> BTreeSet<(Pair, String)> {
    let mut heads = BTreeSet::new();
    for e in graph.edges() {
        let (a, b) = (graph.name(e.node1), graph.name(e.node2));
        if e.endpoint1 == Endpoint::Arrow {
            heads.insert((pair(a, b), a.to_string()));
        }
        if e.endpoint2 == Endpoint::Arrow {
            heads.insert((pair(a, b), b.to_string()));
        }
    }
    heads
}

fn adjacencies(graph: &Graph) -> BTreeSet<Pair> {
    graph
        .edges()
        .map(|e| pair(graph.name(e.node1), graph.name(e.node2)))
        .collect()
}

fn ratio(num: usize, den: usize) -> Option<f64> {
    (den > 0).then(|| num as f64 / den as f64)
}

impl GraphComparison {
    /// Compare `target` against `reference`.
    ///
    /// Fails if the graphs do not have the same node names.
    pub fn compare(target: &Graph, reference: &Graph) -> Result<Self, SearchError> {
        let names = |g: &Graph| -> BTreeSet<String> { g.nodes().iter().map(|n| n.name.clone()).collect() };
        if names(target) != names(reference) {
            return Err(SearchError::Configuration(
                "compared graphs must have the same node names".to_string(),
            ));
        }

        let target_adj = adjacencies(target);
        let reference_adj = adjacencies(reference);
        let shared: BTreeSet<&Pair> = target_adj.intersection(&reference_adj).collect();

        let on_shared = |heads: BTreeSet<(Pair, String)>| -> BTreeSet<(Pair, String)> {
            heads.into_iter().filter(|(p, _)| shared.contains(p)).collect()
        };
        let target_heads = on_shared(arrowheads(target));
        let reference_heads = on_shared(arrowheads(reference));

        let rendered = |g: &Graph, missing_from: &BTreeSet<Pair>| -> Vec<String> {
            g.edges()
                .filter(|e| !missing_from.contains(&pair(g.name(e.node1), g.name(e.node2))))
                .map(|e| g.edge_string(e))
                .collect()
        };

        Ok(Self {
            adjacency_tp: shared.len(),
            adjacency_fp: target_adj.difference(&reference_adj).count(),
            adjacency_fn: reference_adj.difference(&target_adj).count(),
            arrowhead_tp: target_heads.intersection(&reference_heads).count(),
            arrowhead_fp: target_heads.difference(&reference_heads).count(),
            arrowhead_fn: reference_heads.difference(&target_heads).count(),
            edges_added: rendered(target, &reference_adj),
            edges_removed: rendered(reference, &target_adj),
        })
    }

    /// Share of target adjacencies present in the reference.
    pub fn adjacency_precision(&self) -> Option<f64> {
        ratio(self.adjacency_tp, self.adjacency_tp + self.adjacency_fp)
    }

    /// Share of reference adjacencies found in the target.
    pub fn adjacency_recall(&self) -> Option<f64> {
        ratio(self.adjacency_tp, self.adjacency_tp + self.adjacency_fn)
    }

    /// Share of target arrowheads present in the reference.
    pub fn arrowhead_precision(&self) -> Option<f64> {
        ratio(self.arrowhead_tp, self.arrowhead_tp + self.arrowhead_fp)
    }

    /// Share of reference arrowheads found in the target.
    pub fn arrowhead_recall(&self) -> Option<f64> {
        ratio(self.arrowhead_tp, self.arrowhead_tp + self.arrowhead_fn)
    }

    /// Check if both graphs have the same adjacencies and arrowheads.
    pub fn is_exact(&self) -> bool {
        self.adjacency_fp == 0 && self.adjacency_fn == 0 && self.arrowhead_fp == 0 && self.arrowhead_fn == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Endpoint::{Arrow, Circle, Tail};

    #[test]
    fn test_identical_graphs() {
        let mut g = Graph::from_names(&["A", "B", "C"]).unwrap();
        g.add_edge_by_name("A", "B", Circle, Arrow).unwrap();
        let cmp = GraphComparison::compare(&g, &g).unwrap();
        assert!(cmp.is_exact());
        assert_eq!(cmp.adjacency_precision(), Some(1.0));
        assert_eq!(cmp.arrowhead_tp, 1);
    }

    #[test]
    fn test_matched_by_name() {
        let mut target = Graph::from_names(&["C", "B", "A"]).unwrap();
        target.add_edge_by_name("B", "A", Arrow, Circle).unwrap();
        target.add_edge_by_name("B", "C", Tail, Arrow).unwrap();

        let mut reference = Graph::from_names(&["A", "B", "C"]).unwrap();
        reference.add_edge_by_name("A", "B", Circle, Arrow).unwrap();
        reference.add_edge_by_name("A", "C", Circle, Circle).unwrap();

        let cmp = GraphComparison::compare(&target, &reference).unwrap();
        assert_eq!((cmp.adjacency_tp, cmp.adjacency_fp, cmp.adjacency_fn), (1, 1, 1));
        assert_eq!((cmp.arrowhead_tp, cmp.arrowhead_fp, cmp.arrowhead_fn), (1, 0, 0));
        assert_eq!(cmp.edges_added, vec!["C <-- B".to_string()]);
        assert_eq!(cmp.edges_removed, vec!["A o-o C".to_string()]);
        assert_eq!(cmp.adjacency_recall(), Some(0.5));
    }

    #[test]
    fn test_empty_ratios_undefined() {
        let g = Graph::from_names(&["A", "B"]).unwrap();
        let cmp = GraphComparison::compare(&g, &g).unwrap();
        assert_eq!(cmp.adjacency_precision(), None);
        assert_eq!(cmp.arrowhead_recall(), None);
    }

    #[test]
    fn test_different_nodes_rejected() {
        let a = Graph::from_names(&["A", "B"]).unwrap();
        let b = Graph::from_names(&["A", "C"]).unwrap();
        assert!(GraphComparison::compare(&a, &b).is_err());
    }
}
