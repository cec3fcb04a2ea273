//! Conversion of a DAG to its pattern.
//!
//! The pattern keeps the DAG's adjacencies, directs the edges of every
//! unshielded collider, leaves the rest undirected, then propagates
//! directions with Meek's rules until nothing changes.

use crate::types::{Edge, Endpoint, Graph, NodeId};

/// Pattern (CPDAG) of a DAG. Undirected edges are `---`.
pub fn dag_to_pattern(dag: &Graph) -> Graph {
    let mut pattern = dag.empty_like();
    for edge in dag.edges() {
        // Adding to a graph with the same node set cannot fail
        let _ = pattern.add_edge(Edge::undirected(edge.node1, edge.node2));
    }

    for y in dag.node_ids() {
        let parents = dag.parents(y);
        for (i, &x) in parents.iter().enumerate() {
            for &z in &parents[i + 1..] {
                if !dag.is_adjacent(x, z) {
                    direct(&mut pattern, x, y);
                    direct(&mut pattern, z, y);
                }
            }
        }
    }

    while meek_pass(&mut pattern) {}
    pattern
}

fn direct(pattern: &mut Graph, from: NodeId, to: NodeId) {
    pattern.set_endpoint(to, from, Endpoint::Tail);
    pattern.set_endpoint(from, to, Endpoint::Arrow);
}

fn is_undirected(g: &Graph, a: NodeId, b: NodeId) -> bool {
    g.endpoint(a, b) == Some(Endpoint::Tail) && g.endpoint(b, a) == Some(Endpoint::Tail)
}

/// One pass of Meek rules 1-3. Returns true if any edge was directed.
fn meek_pass(g: &mut Graph) -> bool {
    let mut changed = false;
    let nodes: Vec<NodeId> = g.node_ids().collect();

    for b in nodes {
        let adjacent = g.adjacent_nodes(b);
        for &a in &adjacent {
            for &c in &adjacent {
                if a == c || !is_undirected(g, b, c) {
                    continue;
                }
                // a --> b --- c, a and c not adjacent
                if g.is_parent_of(a, b) && !g.is_adjacent(a, c) {
                    direct(g, b, c);
                    changed = true;
                    continue;
                }
                // b --> a --> c with b --- c
                if g.is_parent_of(b, a) && g.is_parent_of(a, c) {
                    direct(g, b, c);
                    changed = true;
                }
            }
        }

        // b --- a, b --- c, b --- d, c --> a <-- d, c and d not adjacent
        for &a in &adjacent {
            if !is_undirected(g, b, a) {
                continue;
            }
            let into_a: Vec<NodeId> = adjacent
                .iter()
                .copied()
                .filter(|&x| x != a && is_undirected(g, b, x) && g.is_parent_of(x, a))
                .collect();
            let fires = into_a
                .iter()
                .enumerate()
                .any(|(i, &c)| into_a[i + 1..].iter().any(|&d| !g.is_adjacent(c, d)));
            if fires {
                direct(g, b, a);
                changed = true;
            }
        }
    }
    changed
}
