//! Edge types for the search graph.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::node::{NodeId, ParseNameError};

/// Mark at one end of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    /// Undetermined mark (`o`).
    Circle,
    /// Tail (`-`): the node at this end is an ancestor of the other.
    Tail,
    /// Arrowhead (`>`): the node at this end is not an ancestor of the other.
    Arrow,
}

impl FromStr for Endpoint {
    type Err = ParseNameError;

    /// Parse a mark by name or by its symbol in `A o-> B`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "circle" | "o" => Ok(Self::Circle),
            "tail" | "-" => Ok(Self::Tail),
            "arrow" | ">" | "<" => Ok(Self::Arrow),
            _ => Err(ParseNameError::new("endpoint", s)),
        }
    }
}

impl Endpoint {
    /// Preference rank used to break ties between otherwise equal marks.
    ///
    /// Arrowhead beats tail beats circle.
    pub fn preference(&self) -> u8 {
        match self {
            Self::Arrow => 2,
            Self::Tail => 1,
            Self::Circle => 0,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Circle => write!(f, "circle"),
            Self::Tail => write!(f, "tail"),
            Self::Arrow => write!(f, "arrow"),
        }
    }
}

/// Edge between two nodes.
///
/// Stored in canonical form: `node1 < node2`, with `endpoint1` the mark at
/// `node1` and `endpoint2` the mark at `node2`. Implements `Ord` for
/// deterministic ordering: (node1, node2, endpoint1, endpoint2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// Smaller node id.
    pub node1: NodeId,
    /// Larger node id.
    pub node2: NodeId,
    /// Mark at `node1`.
    pub endpoint1: Endpoint,
    /// Mark at `node2`.
    pub endpoint2: Endpoint,
}

impl Edge {
    /// Create an edge, with `mark_a` at `a` and `mark_b` at `b`.
    ///
    /// The pair is normalized so `node1 < node2`.
    pub fn new(a: NodeId, b: NodeId, mark_a: Endpoint, mark_b: Endpoint) -> Self {
        if a <= b {
            Self { node1: a, node2: b, endpoint1: mark_a, endpoint2: mark_b }
        } else {
            Self { node1: b, node2: a, endpoint1: mark_b, endpoint2: mark_a }
        }
    }

    /// Create `a o-o b`.
    pub fn nondirected(a: NodeId, b: NodeId) -> Self {
        Self::new(a, b, Endpoint::Circle, Endpoint::Circle)
    }

    /// Create `a --> b`.
    pub fn directed(a: NodeId, b: NodeId) -> Self {
        Self::new(a, b, Endpoint::Tail, Endpoint::Arrow)
    }

    /// Create `a --- b`.
    pub fn undirected(a: NodeId, b: NodeId) -> Self {
        Self::new(a, b, Endpoint::Tail, Endpoint::Tail)
    }

    /// Create `a <-> b`.
    pub fn bidirected(a: NodeId, b: NodeId) -> Self {
        Self::new(a, b, Endpoint::Arrow, Endpoint::Arrow)
    }

    /// Canonical unordered pair key.
    pub fn pair(&self) -> (NodeId, NodeId) {
        (self.node1, self.node2)
    }

    /// Check whether the edge touches `node`.
    pub fn contains(&self, node: NodeId) -> bool {
        self.node1 == node || self.node2 == node
    }

    /// The node at the other end, if `node` is on this edge.
    pub fn other(&self, node: NodeId) -> Option<NodeId> {
        if self.node1 == node {
            Some(self.node2)
        } else if self.node2 == node {
            Some(self.node1)
        } else {
            None
        }
    }

    /// Mark at `node`, if `node` is on this edge.
    pub fn mark_at(&self, node: NodeId) -> Option<Endpoint> {
        if self.node1 == node {
            Some(self.endpoint1)
        } else if self.node2 == node {
            Some(self.endpoint2)
        } else {
            None
        }
    }

    /// Set the mark at `node`. Returns false if `node` is not on this edge.
    pub fn set_mark_at(&mut self, node: NodeId, mark: Endpoint) -> bool {
        if self.node1 == node {
            self.endpoint1 = mark;
            true
        } else if self.node2 == node {
            self.endpoint2 = mark;
            true
        } else {
            false
        }
    }

    /// Check whether this is `a --> b` in either direction.
    pub fn is_directed(&self) -> bool {
        matches!(
            (self.endpoint1, self.endpoint2),
            (Endpoint::Tail, Endpoint::Arrow) | (Endpoint::Arrow, Endpoint::Tail)
        )
    }

    /// Check whether the edge points from `from` into `to`.
    pub fn points_towards(&self, from: NodeId, to: NodeId) -> bool {
        self.mark_at(from) == Some(Endpoint::Tail) && self.mark_at(to) == Some(Endpoint::Arrow)
    }

    /// Both marks as (mark at node1, mark at node2).
    pub fn marks(&self) -> (Endpoint, Endpoint) {
        (self.endpoint1, self.endpoint2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_normalization() {
        let a = NodeId::new(3);
        let b = NodeId::new(1);

        let e = Edge::directed(a, b);
        assert_eq!(e.node1, b);
        assert_eq!(e.node2, a);
        // a --> b: tail stays with a, arrow with b
        assert_eq!(e.mark_at(a), Some(Endpoint::Tail));
        assert_eq!(e.mark_at(b), Some(Endpoint::Arrow));
        assert!(e.points_towards(a, b));
        assert!(!e.points_towards(b, a));
    }

    #[test]
    fn test_edge_ordering() {
        let id1 = NodeId::new(1);
        let id2 = NodeId::new(2);
        let id3 = NodeId::new(3);

        let e1 = Edge::nondirected(id1, id2);
        let e2 = Edge::nondirected(id1, id3);
        let e3 = Edge::nondirected(id2, id3);

        assert!(e1 < e2);
        assert!(e2 < e3);
    }

    #[test]
    fn test_set_mark() {
        let mut e = Edge::nondirected(NodeId::new(0), NodeId::new(1));
        assert!(e.set_mark_at(NodeId::new(1), Endpoint::Arrow));
        assert!(!e.set_mark_at(NodeId::new(5), Endpoint::Arrow));
        assert_eq!(e.marks(), (Endpoint::Circle, Endpoint::Arrow));
    }

    #[test]
    fn test_endpoint_parse() {
        let marks: Vec<Endpoint> = "o - >".split(' ').map(|m| m.parse().unwrap()).collect();
        assert_eq!(marks, vec![Endpoint::Circle, Endpoint::Tail, Endpoint::Arrow]);
        assert_eq!("Arrow".parse(), Ok(Endpoint::Arrow));
        assert!("o->".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_endpoint_preference() {
        assert!(Endpoint::Arrow.preference() > Endpoint::Tail.preference());
        assert!(Endpoint::Tail.preference() > Endpoint::Circle.preference());
    }
}
