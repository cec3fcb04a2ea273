//! Possible-d-sep pruning pass.
//!
//! Conditioning only on adjacent nodes misses separating sets that contain
//! non-neighbors reachable through colliders. After collider detection, this
//! pass tests each remaining edge against subsets of its possible-d-sep set
//! and removes the edges that become independent.
//!
//! A node `w` is in possible-d-sep(x, y) if some path from `x` to `w` has
//! every interior node either a collider on the path or part of a triangle
//! with its two path neighbors. Paths longer than `max_path_length` edges
//! are not followed.

use rayon::prelude::*;
use std::collections::{BTreeSet, VecDeque};

use crate::orient::FciOrient;
use crate::types::{Endpoint, Graph, NodeId, ResolvedKnowledge, SepsetMap};
use super::runner::{combinations, TestRunner};
use super::SearchError;

/// Outcome of the pass.
#[derive(Debug, Clone, Default)]
pub(crate) struct PossibleDsepOutcome {
    pub removed: usize,
    pub path_bound_reached: bool,
}

struct Decision {
    pair: (NodeId, NodeId),
    sepset: Option<Vec<NodeId>>,
    path_bound_reached: bool,
}

/// Run the pass on `graph` (an o-o skeleton) and update `sepsets`.
///
/// Removed edges get the separating set that was found. The graph stays
/// o-o; callers redo collider detection afterwards.
pub(crate) fn prune(
    graph: &mut Graph,
    sepsets: &mut SepsetMap,
    knowledge: &ResolvedKnowledge,
    runner: &TestRunner<'_>,
    depth_limit: Option<usize>,
    max_path_length: Option<usize>,
) -> Result<PossibleDsepOutcome, SearchError> {
    runner.check_cancelled()?;

    let mut oriented = graph.skeleton();
    FciOrient::new(sepsets, knowledge).apply_colliders(&mut oriented);

    let candidates: Vec<(NodeId, NodeId)> = oriented
        .edges()
        .map(|e| e.pair())
        .filter(|&(x, y)| !knowledge.is_pair_required(x, y))
        .collect();

    let decisions = candidates
        .par_iter()
        .map(|&(x, y)| decide(&oriented, x, y, runner, depth_limit, max_path_length))
        .collect::<Result<Vec<_>, _>>()?;

    let mut outcome = PossibleDsepOutcome::default();
    for decision in decisions {
        outcome.path_bound_reached |= decision.path_bound_reached;
        let (x, y) = decision.pair;
        if let Some(sepset) = decision.sepset {
            graph.remove_edge(x, y);
            tracing::trace!(
                x = %graph.name(x),
                y = %graph.name(y),
                sepset = ?sepset.iter().map(|&z| graph.name(z)).collect::<Vec<_>>(),
                "Removed edge by possible-d-sep"
            );
            sepsets.set(x, y, sepset);
            outcome.removed += 1;
        }
    }

    tracing::debug!(
        tested_edges = candidates.len(),
        removed = outcome.removed,
        remaining = graph.num_edges(),
        "Possible-d-sep pass complete"
    );
    Ok(outcome)
}

fn decide(
    graph: &Graph,
    x: NodeId,
    y: NodeId,
    runner: &TestRunner<'_>,
    depth_limit: Option<usize>,
    max_path_length: Option<usize>,
) -> Result<Decision, SearchError> {
    let mut path_bound_reached = false;
    for (from, other) in [(x, y), (y, x)] {
        let (pool, bound_hit) = possible_dsep(graph, from, other, max_path_length);
        path_bound_reached |= bound_hit;
        let pool: Vec<NodeId> = pool.into_iter().collect();

        let max_size = depth_limit.map(|d| d.min(pool.len())).unwrap_or(pool.len());
        for size in 1..=max_size {
            for z in combinations(&pool, size) {
                if runner.is_independent(x, y, &z)? {
                    return Ok(Decision { pair: (x, y), sepset: Some(z), path_bound_reached });
                }
            }
        }
    }
    Ok(Decision { pair: (x, y), sepset: None, path_bound_reached })
}

/// Possible-d-sep set of `x` relative to `y`, and whether the length bound cut a path.
pub(crate) fn possible_dsep(
    graph: &Graph,
    x: NodeId,
    y: NodeId,
    max_path_length: Option<usize>,
) -> (BTreeSet<NodeId>, bool) {
    let mut found = BTreeSet::new();
    let mut visited = BTreeSet::new();
    let mut queue = VecDeque::new();
    let mut bound_hit = false;

    for b in graph.adjacent(x) {
        visited.insert((x, b));
        found.insert(b);
        queue.push_back((x, b, 1usize));
    }

    while let Some((a, b, length)) = queue.pop_front() {
        for c in graph.adjacent(b) {
            if c == a || c == x {
                continue;
            }
            if !is_legal(graph, a, b, c) {
                continue;
            }
            if max_path_length.map(|limit| length >= limit).unwrap_or(false) {
                bound_hit = true;
                continue;
            }
            if visited.insert((b, c)) {
                found.insert(c);
                queue.push_back((b, c, length + 1));
            }
        }
    }

    found.remove(&x);
    found.remove(&y);
    (found, bound_hit)
}

/// Check that `b` may be an interior node of a possible-d-sep path `a, b, c`.
fn is_legal(graph: &Graph, a: NodeId, b: NodeId, c: NodeId) -> bool {
    let collider = graph.endpoint(a, b) == Some(Endpoint::Arrow) && graph.endpoint(c, b) == Some(Endpoint::Arrow);
    collider || graph.is_adjacent(a, c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{DSeparationTest, IndependenceTest};
    use crate::search::{adjacency, CancellationToken};
    use crate::types::Node;

    // ─── Test Helpers ───

    fn id(g: &Graph, name: &str) -> NodeId {
        g.node_id(name).unwrap()
    }

    /// A -> B -> D, A -> C -> D, with B <-> D and C <-> D confounded.
    ///
    /// A and D are joined by an inducing path through B, so every measured
    /// adjacency survives.
    fn latent_dag() -> Graph {
        let mut g = Graph::new(vec![
            Node::measured("A"),
            Node::measured("B"),
            Node::measured("C"),
            Node::measured("D"),
            Node::latent("L1"),
            Node::latent("L2"),
        ])
        .unwrap();
        g.add_directed_by_name("A", "B").unwrap();
        g.add_directed_by_name("A", "C").unwrap();
        g.add_directed_by_name("B", "D").unwrap();
        g.add_directed_by_name("C", "D").unwrap();
        g.add_directed_by_name("L1", "B").unwrap();
        g.add_directed_by_name("L1", "D").unwrap();
        g.add_directed_by_name("L2", "C").unwrap();
        g.add_directed_by_name("L2", "D").unwrap();
        g
    }

    /// X <- L1 -> A -> Y, Y <- L2 -> B -> X, A <- W -> B.
    ///
    /// X and Y are separated only by {A, B, W}, and W is adjacent to neither.
    fn hidden_sepset_dag() -> Graph {
        let mut g = Graph::new(vec![
            Node::measured("X"),
            Node::measured("A"),
            Node::measured("W"),
            Node::measured("B"),
            Node::measured("Y"),
            Node::latent("L1"),
            Node::latent("L2"),
        ])
        .unwrap();
        g.add_directed_by_name("L1", "X").unwrap();
        g.add_directed_by_name("L1", "A").unwrap();
        g.add_directed_by_name("A", "Y").unwrap();
        g.add_directed_by_name("L2", "Y").unwrap();
        g.add_directed_by_name("L2", "B").unwrap();
        g.add_directed_by_name("B", "X").unwrap();
        g.add_directed_by_name("W", "A").unwrap();
        g.add_directed_by_name("W", "B").unwrap();
        g
    }

    // ─── Tests ───

    #[test]
    fn test_collider_paths_followed() {
        let mut g = Graph::from_names(&["A", "B", "C", "D"]).unwrap();
        // A *-> B <-* C, B - D
        g.add_edge_by_name("A", "B", Endpoint::Circle, Endpoint::Arrow).unwrap();
        g.add_edge_by_name("C", "B", Endpoint::Circle, Endpoint::Arrow).unwrap();
        g.add_edge_by_name("B", "D", Endpoint::Circle, Endpoint::Circle).unwrap();
        let (a, b, c, d) = (id(&g, "A"), id(&g, "B"), id(&g, "C"), id(&g, "D"));

        let (pdsep, bound_hit) = possible_dsep(&g, a, d, None);
        // B is a collider on A - B - C; B is not a collider on A - B - D
        assert_eq!(pdsep, BTreeSet::from([b, c]));
        assert!(!bound_hit);
    }

    #[test]
    fn test_path_bound() {
        let mut g = Graph::from_names(&["A", "B", "C"]).unwrap();
        g.add_edge_by_name("A", "B", Endpoint::Circle, Endpoint::Arrow).unwrap();
        g.add_edge_by_name("C", "B", Endpoint::Circle, Endpoint::Arrow).unwrap();
        let (a, b) = (id(&g, "A"), id(&g, "B"));

        let (pdsep, bound_hit) = possible_dsep(&g, a, b, Some(1));
        assert!(pdsep.is_empty());
        assert!(bound_hit);
    }

    #[test]
    fn test_prune_keeps_true_adjacencies() {
        let test = DSeparationTest::new(latent_dag()).unwrap();
        let cancel = CancellationToken::new();
        let runner = TestRunner::new(&test, false, &cancel);
        let start = Graph::complete(test.variables().to_vec()).unwrap();
        let knowledge = ResolvedKnowledge::empty(start.num_nodes());

        let mut skeleton = adjacency::search(start, &knowledge, &runner, None).unwrap();
        let before = skeleton.graph.num_edges();
        let outcome = prune(&mut skeleton.graph, &mut skeleton.sepsets, &knowledge, &runner, None, None).unwrap();

        // Every adjacency here is a true one, so the pass removes nothing
        assert_eq!(outcome.removed, 0);
        assert_eq!(skeleton.graph.num_edges(), before);
        assert!(skeleton.graph.edges().all(|e| e.marks() == (Endpoint::Circle, Endpoint::Circle)));
    }

    #[test]
    fn test_prune_removes_edge_needing_distant_node() {
        let test = DSeparationTest::new(hidden_sepset_dag()).unwrap();
        let cancel = CancellationToken::new();
        let runner = TestRunner::new(&test, false, &cancel);
        let start = Graph::complete(test.variables().to_vec()).unwrap();
        let knowledge = ResolvedKnowledge::empty(start.num_nodes());
        let (x, a, w, b, y) = (id(&start, "X"), id(&start, "A"), id(&start, "W"), id(&start, "B"), id(&start, "Y"));

        let mut skeleton = adjacency::search(start, &knowledge, &runner, None).unwrap();
        // No subset of adj(X) or adj(Y) separates the pair
        assert!(skeleton.graph.is_adjacent(x, y));
        assert!(!skeleton.sepsets.contains(x, y));
        assert_eq!(skeleton.graph.num_edges(), 7);

        let (pdsep, _) = possible_dsep(&skeleton.graph.skeleton(), x, y, None);
        assert!(!pdsep.contains(&w), "W is only reachable through the collider at A");

        let outcome = prune(&mut skeleton.graph, &mut skeleton.sepsets, &knowledge, &runner, None, None).unwrap();
        assert_eq!(outcome.removed, 1);
        assert!(!outcome.path_bound_reached);
        assert!(!skeleton.graph.is_adjacent(x, y));
        assert_eq!(skeleton.sepsets.get(x, y), Some(&BTreeSet::from([a, w, b])));
        assert_eq!(skeleton.graph.num_edges(), 6);
    }

    #[test]
    fn test_prune_respects_path_bound() {
        let test = DSeparationTest::new(hidden_sepset_dag()).unwrap();
        let cancel = CancellationToken::new();
        let runner = TestRunner::new(&test, false, &cancel);
        let start = Graph::complete(test.variables().to_vec()).unwrap();
        let knowledge = ResolvedKnowledge::empty(start.num_nodes());
        let (x, y) = (id(&start, "X"), id(&start, "Y"));

        let mut skeleton = adjacency::search(start, &knowledge, &runner, None).unwrap();
        let outcome = prune(&mut skeleton.graph, &mut skeleton.sepsets, &knowledge, &runner, None, Some(1)).unwrap();

        // W sits two edges away from X and Y
        assert_eq!(outcome.removed, 0);
        assert!(outcome.path_bound_reached);
        assert!(skeleton.graph.is_adjacent(x, y));
    }
}
