//! Mutable graph of nodes and marked edges.
//!
//! ## Determinism
//!
//! Adjacency and edges live in `BTreeSet`/`BTreeMap`, so every iteration is
//! ordered by [`NodeId`]. Neighbor lists, edge lists and fingerprints are
//! therefore stable across runs and platforms.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use crate::canonical::canonical_hash_hex;
use super::edge::{Edge, Endpoint};
use super::node::{Node, NodeId};

/// Error type for graph construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Two nodes share a name.
    #[error("Duplicate node name: {0}")]
    DuplicateNode(String),
    /// A node name is not part of the graph.
    #[error("Unknown node: {0}")]
    UnknownNode(String),
    /// A node id is out of range.
    #[error("Node id out of range: {0}")]
    InvalidNodeId(NodeId),
    /// An edge would connect a node to itself.
    #[error("Self-loop on node: {0}")]
    SelfLoop(String),
}

/// Graph over a fixed node set with at most one edge per pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "GraphRepr", try_from = "GraphRepr")]
pub struct Graph {
    nodes: Vec<Node>,
    index: BTreeMap<String, NodeId>,
    edges: BTreeMap<(NodeId, NodeId), Edge>,
    adjacency: Vec<BTreeSet<NodeId>>,
}

/// Wire form of a graph: nodes in id order plus the canonical edge list.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GraphRepr {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl From<Graph> for GraphRepr {
    fn from(graph: Graph) -> Self {
        Self {
            edges: graph.edges.into_values().collect(),
            nodes: graph.nodes,
        }
    }
}

impl TryFrom<GraphRepr> for Graph {
    type Error = GraphError;

    fn try_from(repr: GraphRepr) -> Result<Self, Self::Error> {
        let mut graph = Graph::new(repr.nodes)?;
        for edge in repr.edges {
            graph.add_edge(edge)?;
        }
        Ok(graph)
    }
}

impl Graph {
    /// Create a graph with the given nodes and no edges.
    pub fn new(nodes: Vec<Node>) -> Result<Self, GraphError> {
        let mut index = BTreeMap::new();
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.name.clone(), NodeId::new(i)).is_some() {
                return Err(GraphError::DuplicateNode(node.name.clone()));
            }
        }
        let adjacency = vec![BTreeSet::new(); nodes.len()];
        Ok(Self {
            nodes,
            index,
            edges: BTreeMap::new(),
            adjacency,
        })
    }

    /// Create a graph of measured nodes from names.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, GraphError> {
        Self::new(names.iter().map(|n| Node::measured(n.as_ref())).collect())
    }

    /// Create the complete graph over `nodes` with every edge `o-o`.
    pub fn complete(nodes: Vec<Node>) -> Result<Self, GraphError> {
        let mut graph = Self::new(nodes)?;
        let n = graph.num_nodes();
        for i in 0..n {
            for j in (i + 1)..n {
                graph.insert_unchecked(Edge::nondirected(NodeId::new(i), NodeId::new(j)));
            }
        }
        Ok(graph)
    }

    /// Copy of this graph's node set with no edges.
    pub fn empty_like(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            index: self.index.clone(),
            edges: BTreeMap::new(),
            adjacency: vec![BTreeSet::new(); self.nodes.len()],
        }
    }

    /// Number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// All nodes in id order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// All node ids in order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId::new)
    }

    /// Get a node by id.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Name of a node, or `"?"` for an unknown id.
    pub fn name(&self, id: NodeId) -> &str {
        self.nodes.get(id.index()).map(|n| n.name.as_str()).unwrap_or("?")
    }

    /// Look up a node id by name.
    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.index.get(name).copied()
    }

    /// Look up a node id by name, failing on unknown names.
    pub fn require_id(&self, name: &str) -> Result<NodeId, GraphError> {
        self.node_id(name)
            .ok_or_else(|| GraphError::UnknownNode(name.to_string()))
    }

    fn check_id(&self, id: NodeId) -> Result<(), GraphError> {
        if id.index() < self.nodes.len() {
            Ok(())
        } else {
            Err(GraphError::InvalidNodeId(id))
        }
    }

    fn insert_unchecked(&mut self, edge: Edge) -> bool {
        self.adjacency[edge.node1.index()].insert(edge.node2);
        self.adjacency[edge.node2.index()].insert(edge.node1);
        self.edges.insert(edge.pair(), edge).is_none()
    }

    /// Add an edge, replacing the marks of an existing edge on the same pair.
    ///
    /// Returns true if the pair was not adjacent before.
    pub fn add_edge(&mut self, edge: Edge) -> Result<bool, GraphError> {
        self.check_id(edge.node1)?;
        self.check_id(edge.node2)?;
        if edge.node1 == edge.node2 {
            return Err(GraphError::SelfLoop(self.name(edge.node1).to_string()));
        }
        Ok(self.insert_unchecked(edge))
    }

    /// Add an edge between two named nodes with the given marks.
    pub fn add_edge_by_name(
        &mut self,
        a: &str,
        b: &str,
        mark_a: Endpoint,
        mark_b: Endpoint,
    ) -> Result<bool, GraphError> {
        let a = self.require_id(a)?;
        let b = self.require_id(b)?;
        self.add_edge(Edge::new(a, b, mark_a, mark_b))
    }

    /// Add `a --> b` between two named nodes.
    pub fn add_directed_by_name(&mut self, a: &str, b: &str) -> Result<bool, GraphError> {
        self.add_edge_by_name(a, b, Endpoint::Tail, Endpoint::Arrow)
    }

    /// Remove the edge between `a` and `b`, if any.
    pub fn remove_edge(&mut self, a: NodeId, b: NodeId) -> Option<Edge> {
        let removed = self.edges.remove(&ordered(a, b));
        if removed.is_some() {
            self.adjacency[a.index()].remove(&b);
            self.adjacency[b.index()].remove(&a);
        }
        removed
    }

    /// Get the edge between `a` and `b`.
    pub fn edge(&self, a: NodeId, b: NodeId) -> Option<&Edge> {
        self.edges.get(&ordered(a, b))
    }

    /// Get the edge between two named nodes.
    pub fn edge_by_name(&self, a: &str, b: &str) -> Option<&Edge> {
        let a = self.node_id(a)?;
        let b = self.node_id(b)?;
        self.edge(a, b)
    }

    /// All edges in canonical order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.values()
    }

    /// Check if `a` and `b` share an edge.
    pub fn is_adjacent(&self, a: NodeId, b: NodeId) -> bool {
        self.adjacency
            .get(a.index())
            .map(|set| set.contains(&b))
            .unwrap_or(false)
    }

    /// Neighbors of `a` in id order.
    pub fn adjacent(&self, a: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.adjacency
            .get(a.index())
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Neighbors of `a` collected into a vector.
    pub fn adjacent_nodes(&self, a: NodeId) -> Vec<NodeId> {
        self.adjacent(a).collect()
    }

    /// Number of neighbors of `a`.
    pub fn degree(&self, a: NodeId) -> usize {
        self.adjacency.get(a.index()).map(|s| s.len()).unwrap_or(0)
    }

    /// Mark at `b` on the edge between `a` and `b`.
    pub fn endpoint(&self, a: NodeId, b: NodeId) -> Option<Endpoint> {
        self.edge(a, b).and_then(|e| e.mark_at(b))
    }

    /// Set the mark at `b` on the edge between `a` and `b`.
    ///
    /// Returns false if the pair is not adjacent.
    pub fn set_endpoint(&mut self, a: NodeId, b: NodeId, mark: Endpoint) -> bool {
        match self.edges.get_mut(&ordered(a, b)) {
            Some(edge) => edge.set_mark_at(b, mark),
            None => false,
        }
    }

    /// Reset every mark in the graph to `mark`.
    pub fn reorient_all(&mut self, mark: Endpoint) {
        for edge in self.edges.values_mut() {
            edge.endpoint1 = mark;
            edge.endpoint2 = mark;
        }
    }

    /// Copy of the graph with every edge reset to `o-o`.
    pub fn skeleton(&self) -> Self {
        let mut copy = self.clone();
        copy.reorient_all(Endpoint::Circle);
        copy
    }

    /// Check for `a --> b`.
    pub fn is_parent_of(&self, a: NodeId, b: NodeId) -> bool {
        self.edge(a, b).map(|e| e.points_towards(a, b)).unwrap_or(false)
    }

    /// Nodes with a directed edge into `b`, in id order.
    pub fn parents(&self, b: NodeId) -> Vec<NodeId> {
        self.adjacent(b).filter(|&a| self.is_parent_of(a, b)).collect()
    }

    /// Nodes `b` points into, in id order.
    pub fn children(&self, a: NodeId) -> Vec<NodeId> {
        self.adjacent(a).filter(|&b| self.is_parent_of(a, b)).collect()
    }

    /// Check for `a *-> b <-* c`.
    pub fn is_def_collider(&self, a: NodeId, b: NodeId, c: NodeId) -> bool {
        self.endpoint(a, b) == Some(Endpoint::Arrow) && self.endpoint(c, b) == Some(Endpoint::Arrow)
    }

    /// Check for a directed path `from --> ... --> to` of length at least one.
    pub fn has_directed_path(&self, from: NodeId, to: NodeId) -> bool {
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            for child in self.children(current) {
                if child == to {
                    return true;
                }
                if visited.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        false
    }

    /// Render an edge as `A o-> B`.
    pub fn edge_string(&self, edge: &Edge) -> String {
        let left = match edge.endpoint1 {
            Endpoint::Circle => "o",
            Endpoint::Tail => "-",
            Endpoint::Arrow => "<",
        };
        let right = match edge.endpoint2 {
            Endpoint::Circle => "o",
            Endpoint::Tail => "-",
            Endpoint::Arrow => ">",
        };
        format!("{} {}-{} {}", self.name(edge.node1), left, right, self.name(edge.node2))
    }

    /// Deterministic fingerprint of nodes and marked edges.
    ///
    /// Edges are keyed by names, so two graphs with the same structure
    /// fingerprint identically even if their node ids differ.
    pub fn fingerprint(&self) -> String {
        let mut names: Vec<&str> = self.nodes.iter().map(|n| n.name.as_str()).collect();
        names.sort();
        let mut edges: Vec<(String, String, Endpoint, Endpoint)> = self
            .edges
            .values()
            .map(|e| {
                let (a, b) = (self.name(e.node1), self.name(e.node2));
                if a <= b {
                    (a.to_string(), b.to_string(), e.endpoint1, e.endpoint2)
                } else {
                    (b.to_string(), a.to_string(), e.endpoint2, e.endpoint1)
                }
            })
            .collect();
        edges.sort();
        canonical_hash_hex(&(names, edges))
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for edge in self.edges.values() {
            writeln!(f, "{}", self.edge_string(edge))?;
        }
        Ok(())
    }
}

/// Canonical unordered key for a node pair.
pub(crate) fn ordered(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
