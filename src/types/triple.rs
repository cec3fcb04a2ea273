//! Unshielded triples and their classification.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::graph::Graph;
use super::node::NodeId;

/// Triple `x - y - z` with `y` in the middle.
///
/// Stored with `x < z` so a triple and its mirror compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Triple {
    /// First outer node.
    pub x: NodeId,
    /// Middle node.
    pub y: NodeId,
    /// Second outer node.
    pub z: NodeId,
}

impl Triple {
    /// Create a triple, normalizing the outer nodes.
    pub fn new(x: NodeId, y: NodeId, z: NodeId) -> Self {
        if x <= z {
            Self { x, y, z }
        } else {
            Self { x: z, y, z: x }
        }
    }

    /// Check that `y` is adjacent to both outer nodes and the outer nodes are not adjacent.
    pub fn is_unshielded_in(&self, graph: &Graph) -> bool {
        graph.is_adjacent(self.x, self.y)
            && graph.is_adjacent(self.y, self.z)
            && !graph.is_adjacent(self.x, self.z)
    }
}

/// How an unshielded triple was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripleKind {
    /// `x *-> y <-* z`.
    Collider,
    /// Definite noncollider (underlined).
    Noncollider,
    /// Neither could be established (dotted underline).
    Ambiguous,
}

/// Classification of every unshielded triple found by collider detection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TripleClassification {
    kinds: BTreeMap<Triple, TripleKind>,
}

impl TripleClassification {
    /// Create an empty classification.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the kind of a triple.
    pub fn insert(&mut self, triple: Triple, kind: TripleKind) {
        self.kinds.insert(triple, kind);
    }

    /// Kind of a triple, if it was classified.
    pub fn get(&self, triple: &Triple) -> Option<TripleKind> {
        self.kinds.get(triple).copied()
    }

    /// All triples of a kind, in canonical order.
    pub fn of_kind(&self, kind: TripleKind) -> Vec<Triple> {
        self.kinds
            .iter()
            .filter(|(_, k)| **k == kind)
            .map(|(t, _)| *t)
            .collect()
    }

    /// Number of classified triples.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Check if nothing was classified.
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// All entries in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (&Triple, &TripleKind)> + '_ {
        self.kinds.iter()
    }

    /// Report for the triples centered on `node`.
    pub fn report_for(&self, graph: &Graph, node: NodeId) -> NodeTriples {
        let mut report = NodeTriples {
            node: graph.name(node).to_string(),
            ..NodeTriples::default()
        };
        for (triple, kind) in self.kinds.iter().filter(|(t, _)| t.y == node) {
            let named = NamedTriple::from_triple(graph, triple);
            match kind {
                TripleKind::Collider => report.colliders.push(named),
                TripleKind::Noncollider => report.underlines.push(named),
                TripleKind::Ambiguous => report.dotted_underlines.push(named),
            }
        }
        report
    }
}

/// Triple with node names, for reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedTriple {
    /// First outer node.
    pub x: String,
    /// Middle node.
    pub y: String,
    /// Second outer node.
    pub z: String,
}

impl NamedTriple {
    fn from_triple(graph: &Graph, triple: &Triple) -> Self {
        Self {
            x: graph.name(triple.x).to_string(),
            y: graph.name(triple.y).to_string(),
            z: graph.name(triple.z).to_string(),
        }
    }
}

impl std::fmt::Display for NamedTriple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}, {}, {}>", self.x, self.y, self.z)
    }
}

/// Triples centered on one node, grouped for display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTriples {
    /// Middle node name.
    pub node: String,
    /// Colliders at the node.
    pub colliders: Vec<NamedTriple>,
    /// Definite noncolliders.
    pub underlines: Vec<NamedTriple>,
    /// Ambiguous triples.
    pub dotted_underlines: Vec<NamedTriple>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triple_mirror_equality() {
        let (a, b, c) = (NodeId::new(0), NodeId::new(1), NodeId::new(2));
        assert_eq!(Triple::new(a, b, c), Triple::new(c, b, a));
        assert_ne!(Triple::new(a, b, c), Triple::new(b, a, c));
    }

    #[test]
    fn test_report_groups_by_kind() {
        let mut g = Graph::from_names(&["A", "B", "C", "D"]).unwrap();
        g.add_directed_by_name("A", "B").unwrap();
        g.add_directed_by_name("C", "B").unwrap();
        g.add_directed_by_name("B", "D").unwrap();
        let ids: Vec<NodeId> = g.node_ids().collect();

        let mut classification = TripleClassification::new();
        classification.insert(Triple::new(ids[0], ids[1], ids[2]), TripleKind::Collider);
        classification.insert(Triple::new(ids[0], ids[1], ids[3]), TripleKind::Noncollider);
        classification.insert(Triple::new(ids[2], ids[1], ids[3]), TripleKind::Ambiguous);

        let report = classification.report_for(&g, ids[1]);
        assert_eq!(report.node, "B");
        assert_eq!(report.colliders.len(), 1);
        assert_eq!(report.underlines.len(), 1);
        assert_eq!(report.dotted_underlines.len(), 1);
        assert_eq!(report.colliders[0].to_string(), "<A, B, C>");

        let empty = classification.report_for(&g, ids[0]);
        assert!(empty.colliders.is_empty());
    }
}
