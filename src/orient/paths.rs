//! Path-based orientation rules.
//!
//! R4 follows discriminating paths and is the only rule after collider
//! detection that reads sepsets. R5, R9 and R10 search uncovered paths.
//! All of them honor the path length bound, counted in edges.
//!
//! Uncovered path searches enumerate simple paths depth-first. Without a
//! bound, each `(previous, current)` step is expanded once per search, which
//! keeps the search polynomial but may miss a path that revisits a step
//! with a different prefix.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::types::{Endpoint, Graph, NodeId, SepsetMap, Triple, TripleKind};
use super::Marker;

use Endpoint::{Arrow, Circle, Tail};

fn exceeds(limit: Option<usize>, length: usize) -> bool {
    limit.map(|l| length > l).unwrap_or(false)
}

/// R4: discriminating path `d, ..., a, b, c` for `b` with `b o-* c`.
///
/// If `b` is in sepset(d, c) then `b --> c`, otherwise `a <-> b <-> c`.
/// Skipped when sepset(d, c) was never recorded.
pub(crate) fn rule_r4(m: &mut Marker<'_>, sepsets: &SepsetMap, limit: Option<usize>) {
    let nodes: Vec<NodeId> = m.graph.node_ids().collect();
    for b in nodes {
        let adjacent = m.graph.adjacent_nodes(b);
        for &c in &adjacent {
            if m.mark(c, b) != Some(Circle) {
                continue;
            }
            for &a in &adjacent {
                if a == c {
                    continue;
                }
                // a must be a collider on the path and a parent of c
                if m.mark(b, a) != Some(Arrow) || !m.graph.is_parent_of(a, c) {
                    continue;
                }
                if let Some(d) = find_discriminating_start(m, a, b, c, limit) {
                    orient_discriminated(m, sepsets, d, a, b, c);
                }
            }
        }
    }
}

/// Breadth-first search backwards from `a` for the far end of a discriminating path.
fn find_discriminating_start(
    m: &mut Marker<'_>,
    a: NodeId,
    b: NodeId,
    c: NodeId,
    limit: Option<usize>,
) -> Option<NodeId> {
    let mut previous: BTreeMap<NodeId, NodeId> = BTreeMap::from([(a, b)]);
    let mut length: BTreeMap<NodeId, usize> = BTreeMap::from([(a, 2)]);
    let mut visited: BTreeSet<NodeId> = BTreeSet::from([a, b, c]);
    let mut queue = VecDeque::from([a]);

    while let Some(t) = queue.pop_front() {
        let before_t = previous.get(&t).copied()?;
        let t_length = length.get(&t).copied().unwrap_or(0);

        for d in m.graph.adjacent_nodes(t) {
            if visited.contains(&d) || m.mark(d, t) != Some(Arrow) {
                continue;
            }
            // t must be a collider on d, t, before_t
            if m.mark(before_t, t) != Some(Arrow) {
                continue;
            }
            if exceeds(limit, t_length + 1) {
                m.path_bound_reached = true;
                continue;
            }
            if !m.graph.is_adjacent(d, c) {
                return Some(d);
            }
            if m.graph.is_parent_of(d, c) {
                visited.insert(d);
                previous.insert(d, t);
                length.insert(d, t_length + 1);
                queue.push_back(d);
            }
        }
    }
    None
}

/// Orient `b - c` and record the decided triple `a, b, c`.
fn orient_discriminated(m: &mut Marker<'_>, sepsets: &SepsetMap, d: NodeId, a: NodeId, b: NodeId, c: NodeId) {
    match sepsets.is_in_sepset(b, d, c) {
        Some(true) => {
            m.set(c, b, Tail, "R4");
            m.set(b, c, Arrow, "R4");
            m.triples.insert(Triple::new(a, b, c), TripleKind::Noncollider);
        }
        Some(false) => {
            m.set(a, b, Arrow, "R4");
            m.set(c, b, Arrow, "R4");
            m.set(b, c, Arrow, "R4");
            m.triples.insert(Triple::new(a, b, c), TripleKind::Collider);
        }
        None => {}
    }
}

/// Depth-first search for an uncovered path ending at `target`.
///
/// `path` holds the prefix, at least `[start, first]`. `step` decides
/// whether the path may continue from one node to the next.
fn uncovered_path<F>(
    graph: &Graph,
    path: &mut Vec<NodeId>,
    target: NodeId,
    limit: Option<usize>,
    step: &F,
    expanded: &mut BTreeSet<(NodeId, NodeId)>,
    bound_hit: &mut bool,
) -> bool
where
    F: Fn(NodeId, NodeId) -> bool,
{
    let len = path.len();
    let current = path[len - 1];
    if current == target {
        return true;
    }
    let prev = path[len - 2];
    if limit.is_none() && !expanded.insert((prev, current)) {
        return false;
    }

    for next in graph.adjacent_nodes(current) {
        if path.contains(&next) || graph.is_adjacent(prev, next) || !step(current, next) {
            continue;
        }
        if exceeds(limit, len) {
            *bound_hit = true;
            continue;
        }
        path.push(next);
        if uncovered_path(graph, path, target, limit, step, expanded, bound_hit) {
            return true;
        }
        path.pop();
    }
    false
}

/// Edge `u - v` could be oriented `u --> v`.
fn potentially_directed(graph: &Graph, u: NodeId, v: NodeId) -> bool {
    graph.endpoint(v, u) != Some(Arrow) && graph.endpoint(u, v) != Some(Tail)
}

fn circle_edge(graph: &Graph, u: NodeId, v: NodeId) -> bool {
    graph.endpoint(u, v) == Some(Circle) && graph.endpoint(v, u) == Some(Circle)
}

/// R5: `a o-o b` closed by an uncovered circle path `a, c, ..., d, b`
/// with `a`, `d` and `b`, `c` not adjacent ⇒ every edge involved becomes `---`.
pub(crate) fn rule_r5(m: &mut Marker<'_>, limit: Option<usize>) {
    let pairs: Vec<(NodeId, NodeId)> = m.graph.edges().map(|e| e.pair()).collect();
    for (a, b) in pairs {
        if !circle_edge(m.graph, a, b) {
            continue;
        }
        let Some(path) = find_r5_path(m, a, b, limit) else {
            continue;
        };
        m.set(a, b, Tail, "R5");
        m.set(b, a, Tail, "R5");
        for window in path.windows(2) {
            m.set(window[0], window[1], Tail, "R5");
            m.set(window[1], window[0], Tail, "R5");
        }
    }
}

fn find_r5_path(m: &mut Marker<'_>, a: NodeId, b: NodeId, limit: Option<usize>) -> Option<Vec<NodeId>> {
    let graph: &Graph = &*m.graph;
    let mut bound_hit = false;
    let mut found = None;

    for c in graph.adjacent_nodes(a) {
        if c == b || graph.is_adjacent(c, b) || !circle_edge(graph, a, c) {
            continue;
        }
        let mut path = vec![a, c];
        let mut expanded = BTreeSet::new();
        let step = |u: NodeId, v: NodeId| {
            circle_edge(graph, u, v) && (v != b || !graph.is_adjacent(a, u))
        };
        if uncovered_path(graph, &mut path, b, limit, &step, &mut expanded, &mut bound_hit) {
            found = Some(path);
            break;
        }
    }
    m.path_bound_reached |= bound_hit;
    found
}

/// R9: `a o-> c` with an uncovered potentially directed path `a, b, ..., c`,
/// `b` and `c` not adjacent ⇒ `a --> c`.
pub(crate) fn rule_r9(m: &mut Marker<'_>, limit: Option<usize>) {
    for (a, c) in circle_arrow_edges(m.graph) {
        let graph: &Graph = &*m.graph;
        let mut bound_hit = false;
        let mut found = false;

        for b in graph.adjacent_nodes(a) {
            if b == c || graph.is_adjacent(b, c) || !potentially_directed(graph, a, b) {
                continue;
            }
            let mut path = vec![a, b];
            let mut expanded = BTreeSet::new();
            let step = |u: NodeId, v: NodeId| potentially_directed(graph, u, v);
            if uncovered_path(graph, &mut path, c, limit, &step, &mut expanded, &mut bound_hit) {
                found = true;
                break;
            }
        }

        m.path_bound_reached |= bound_hit;
        if found {
            m.set(c, a, Tail, "R9");
        }
    }
}

/// R10: `a o-> c`, `b --> c <-- d`, uncovered potentially directed paths
/// from `a` to `b` and from `a` to `d` whose second nodes differ and are not
/// adjacent ⇒ `a --> c`.
pub(crate) fn rule_r10(m: &mut Marker<'_>, limit: Option<usize>) {
    for (a, c) in circle_arrow_edges(m.graph) {
        let graph: &Graph = &*m.graph;
        let parents: Vec<NodeId> = graph.parents(c).into_iter().filter(|&p| p != a).collect();
        if parents.len() < 2 {
            continue;
        }
        let mut bound_hit = false;
        let starts: Vec<BTreeSet<NodeId>> = parents
            .iter()
            .map(|&p| second_nodes(graph, a, p, c, limit, &mut bound_hit))
            .collect();

        let mut found = false;
        'pairs: for i in 0..parents.len() {
            for j in (i + 1)..parents.len() {
                for &mu in &starts[i] {
                    for &omega in &starts[j] {
                        if mu != omega && !graph.is_adjacent(mu, omega) {
                            found = true;
                            break 'pairs;
                        }
                    }
                }
            }
        }

        m.path_bound_reached |= bound_hit;
        if found {
            m.set(c, a, Tail, "R10");
        }
    }
}

/// Second nodes of uncovered potentially directed paths from `a` to `target` avoiding `c`.
fn second_nodes(
    graph: &Graph,
    a: NodeId,
    target: NodeId,
    c: NodeId,
    limit: Option<usize>,
    bound_hit: &mut bool,
) -> BTreeSet<NodeId> {
    let mut result = BTreeSet::new();
    for mu in graph.adjacent_nodes(a) {
        if mu == c || !potentially_directed(graph, a, mu) {
            continue;
        }
        if mu == target {
            result.insert(mu);
            continue;
        }
        let mut path = vec![a, mu];
        let mut expanded = BTreeSet::new();
        let step = |u: NodeId, v: NodeId| v != c && potentially_directed(graph, u, v);
        if uncovered_path(graph, &mut path, target, limit, &step, &mut expanded, bound_hit) {
            result.insert(mu);
        }
    }
    result
}

/// Edges `a o-> c`, as `(a, c)`.
fn circle_arrow_edges(graph: &Graph) -> Vec<(NodeId, NodeId)> {
    graph
        .edges()
        .filter_map(|e| match e.marks() {
            (Circle, Arrow) => Some((e.node1, e.node2)),
            (Arrow, Circle) => Some((e.node2, e.node1)),
            _ => None,
        })
        .collect()
}
