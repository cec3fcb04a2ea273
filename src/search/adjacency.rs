//! Adjacency (skeleton) search.
//!
//! ## Algorithm
//!
//! 1. Start from the given o-o graph (complete, or a restricted initial graph)
//! 2. For d = 0, 1, 2, ... up to the depth bound:
//!    - Freeze the adjacency of every node
//!    - For each edge x - y, test `x _||_ y | Z` for every subset `Z` of size d
//!      of adj(x) \ {y}, then of adj(y) \ {x}, in lexicographic order
//!    - The first independence found decides the edge's removal and its sepset
//!    - Apply all removals in pair order, then move to d + 1
//! 3. Stop once no edge has at least d eligible neighbors
//!
//! Decisions at one depth only read the frozen adjacency, so edges are
//! tested in parallel and the outcome does not depend on scheduling.

use rayon::prelude::*;

use crate::types::{Graph, NodeId, ResolvedKnowledge, SepsetMap};
use super::runner::{combinations, TestRunner};
use super::SearchError;

/// Pruned skeleton and the sepsets that justified each removal.
#[derive(Debug, Clone)]
pub(crate) struct Skeleton {
    pub graph: Graph,
    pub sepsets: SepsetMap,
    /// Some edge could still have been tested at the first depth past the bound.
    pub depth_bound_reached: bool,
}

/// Edge removal decided at one depth.
struct Removal {
    pair: (NodeId, NodeId),
    sepset: Vec<NodeId>,
}

/// Prune `graph` by conditional independence.
pub(crate) fn search(
    mut graph: Graph,
    knowledge: &ResolvedKnowledge,
    runner: &TestRunner<'_>,
    depth_limit: Option<usize>,
) -> Result<Skeleton, SearchError> {
    let mut sepsets = SepsetMap::new();
    let mut depth_bound_reached = false;
    let mut depth = 0usize;

    loop {
        runner.check_cancelled()?;

        let adjacency: Vec<Vec<NodeId>> = graph.node_ids().map(|n| graph.adjacent_nodes(n)).collect();
        let candidates: Vec<(NodeId, NodeId)> = graph
            .edges()
            .map(|e| e.pair())
            .filter(|&(x, y)| !knowledge.is_pair_required(x, y))
            .filter(|&(x, y)| eligible(&adjacency, x) >= depth || eligible(&adjacency, y) >= depth)
            .collect();

        if candidates.is_empty() {
            break;
        }
        if depth_limit.map(|limit| depth > limit).unwrap_or(false) {
            depth_bound_reached = true;
            break;
        }

        let decisions = candidates
            .par_iter()
            .map(|&(x, y)| find_sepset(x, y, &adjacency, depth, runner))
            .collect::<Result<Vec<_>, _>>()?;

        let mut removed = 0usize;
        for removal in decisions.into_iter().flatten() {
            let (x, y) = removal.pair;
            graph.remove_edge(x, y);
            tracing::trace!(
                x = %graph.name(x),
                y = %graph.name(y),
                depth,
                sepset = ?removal.sepset.iter().map(|&z| graph.name(z)).collect::<Vec<_>>(),
                "Removed edge"
            );
            sepsets.set(x, y, removal.sepset);
            removed += 1;
        }

        tracing::debug!(
            depth,
            tested_edges = candidates.len(),
            removed,
            remaining = graph.num_edges(),
            "Adjacency depth complete"
        );
        depth += 1;
    }

    Ok(Skeleton {
        graph,
        sepsets,
        depth_bound_reached,
    })
}

/// Neighbors of `x` available for conditioning against its partner.
fn eligible(adjacency: &[Vec<NodeId>], x: NodeId) -> usize {
    adjacency[x.index()].len().saturating_sub(1)
}

/// First separating set of size `depth` for `x - y`, if any.
fn find_sepset(
    x: NodeId,
    y: NodeId,
    adjacency: &[Vec<NodeId>],
    depth: usize,
    runner: &TestRunner<'_>,
) -> Result<Option<Removal>, SearchError> {
    let sides = [(x, y), (y, x)];
    for (i, &(from, other)) in sides.iter().enumerate() {
        if depth == 0 && i > 0 {
            break;
        }
        let pool: Vec<NodeId> = adjacency[from.index()]
            .iter()
            .copied()
            .filter(|&n| n != other)
            .collect();
        for z in combinations(&pool, depth) {
            if runner.is_independent(x, y, &z)? {
                return Ok(Some(Removal { pair: (x, y), sepset: z }));
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{DSeparationTest, IndependenceTest};
    use crate::search::CancellationToken;

    // ─── Test Helpers ───

    /// X1 -> X2 -> X3 <- X4 -> X5
    fn chain_oracle() -> DSeparationTest {
        let mut g = Graph::from_names(&["X1", "X2", "X3", "X4", "X5"]).unwrap();
        g.add_directed_by_name("X1", "X2").unwrap();
        g.add_directed_by_name("X2", "X3").unwrap();
        g.add_directed_by_name("X4", "X3").unwrap();
        g.add_directed_by_name("X4", "X5").unwrap();
        DSeparationTest::new(g).unwrap()
    }

    fn run(test: &DSeparationTest, depth: Option<usize>) -> Skeleton {
        let cancel = CancellationToken::new();
        let runner = TestRunner::new(test, false, &cancel);
        let start = Graph::complete(test.variables().to_vec()).unwrap();
        let knowledge = ResolvedKnowledge::empty(start.num_nodes());
        search(start, &knowledge, &runner, depth).unwrap()
    }

    fn has(g: &Graph, a: &str, b: &str) -> bool {
        g.edge_by_name(a, b).is_some()
    }

    // ─── Tests ───

    #[test]
    fn test_chain_skeleton() {
        let test = chain_oracle();
        let skeleton = run(&test, None);
        let g = &skeleton.graph;

        assert_eq!(g.num_edges(), 4);
        assert!(has(g, "X1", "X2") && has(g, "X2", "X3") && has(g, "X3", "X4") && has(g, "X4", "X5"));
        assert!(!skeleton.depth_bound_reached);

        let (x2, x3, x4) = (NodeId::new(1), NodeId::new(2), NodeId::new(3));
        assert_eq!(skeleton.sepsets.is_in_sepset(x3, x2, x4), Some(false));
    }

    #[test]
    fn test_depth_zero_is_marginal_only() {
        let test = chain_oracle();
        let skeleton = run(&test, Some(0));
        let g = &skeleton.graph;

        // Only marginally independent pairs are gone: the two sides of the collider
        assert!(!has(g, "X1", "X4") && !has(g, "X2", "X4") && !has(g, "X1", "X5") && !has(g, "X2", "X5"));
        assert!(has(g, "X1", "X3"));
        assert!(skeleton.sepsets.iter().all(|(_, z)| z.is_empty()));
        assert!(skeleton.depth_bound_reached);
    }

    #[test]
    fn test_required_edge_survives() {
        let test = chain_oracle();
        let cancel = CancellationToken::new();
        let runner = TestRunner::new(&test, false, &cancel);
        let start = Graph::complete(test.variables().to_vec()).unwrap();
        let knowledge = crate::types::Knowledge::new()
            .require("X1", "X5")
            .resolve(&start)
            .unwrap();

        let skeleton = search(start, &knowledge, &runner, None).unwrap();
        assert!(has(&skeleton.graph, "X1", "X5"));
        assert!(!skeleton.sepsets.contains(NodeId::new(0), NodeId::new(4)));
    }

    #[test]
    fn test_cancelled_before_start() {
        let test = chain_oracle();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let runner = TestRunner::new(&test, false, &cancel);
        let start = Graph::complete(test.variables().to_vec()).unwrap();
        let knowledge = ResolvedKnowledge::empty(start.num_nodes());
        assert!(matches!(
            search(start, &knowledge, &runner, None),
            Err(SearchError::Cancelled)
        ));
    }
}
