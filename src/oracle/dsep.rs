//! Oracles that read answers off a known causal DAG.
//!
//! [`DSeparationTest`] answers independence queries by d-separation, so a
//! search run against it recovers the true equivalence class. Latent nodes
//! in the DAG are hidden from the oracle's variable list, which is how
//! bidirected edges and possibly-d-sep removals show up in tests.
//!
//! [`GraphScore`] turns the same answers into a score: adding a parent that
//! is d-separated from the child costs one point, adding one that is not
//! gains one.

use std::collections::{BTreeSet, VecDeque};

use crate::types::{Graph, Node, NodeId};
use super::{IndependenceTest, OracleError, Score, TestOutcome};

/// Direction a trail enters a node from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Travel {
    /// Arrived from a child, moving against the edge.
    Up,
    /// Arrived from a parent, moving along the edge.
    Down,
}

/// Independence oracle answering by d-separation in a DAG.
#[derive(Debug, Clone)]
pub struct DSeparationTest {
    dag: Graph,
    variables: Vec<Node>,
    /// Position in `variables` -> node id in `dag`.
    to_dag: Vec<NodeId>,
}

impl DSeparationTest {
    /// Create an oracle over the measured nodes of `dag`.
    ///
    /// Fails if any edge is not directed or the graph has a cycle.
    pub fn new(dag: Graph) -> Result<Self, OracleError> {
        for edge in dag.edges() {
            if !edge.is_directed() {
                return Err(OracleError::Failed(format!(
                    "edge {} is not directed",
                    dag.edge_string(edge)
                )));
            }
        }
        for id in dag.node_ids() {
            if dag.has_directed_path(id, id) {
                return Err(OracleError::Failed(format!(
                    "graph has a cycle through {}",
                    dag.name(id)
                )));
            }
        }

        let to_dag: Vec<NodeId> = dag
            .node_ids()
            .filter(|&id| dag.node(id).map(|n| n.is_measured()).unwrap_or(false))
            .collect();
        let variables = to_dag
            .iter()
            .filter_map(|&id| dag.node(id).cloned())
            .collect();

        Ok(Self { dag, variables, to_dag })
    }

    /// The underlying DAG, latent nodes included.
    pub fn dag(&self) -> &Graph {
        &self.dag
    }

    fn dag_id(&self, id: NodeId) -> Result<NodeId, OracleError> {
        self.to_dag
            .get(id.index())
            .copied()
            .ok_or(OracleError::UnknownVariable(id))
    }

    /// Check whether `x` and `y` are d-separated by `z` in the DAG.
    pub fn is_d_separated(&self, x: NodeId, y: NodeId, z: &[NodeId]) -> Result<bool, OracleError> {
        let x = self.dag_id(x)?;
        let y = self.dag_id(y)?;
        let z: BTreeSet<NodeId> = z
            .iter()
            .map(|&id| self.dag_id(id))
            .collect::<Result<_, _>>()?;
        Ok(!self.reachable(x, y, &z))
    }

    /// Ancestors of the conditioning set, the set itself included.
    fn ancestors_of(&self, z: &BTreeSet<NodeId>) -> BTreeSet<NodeId> {
        let mut ancestors = z.clone();
        let mut queue: VecDeque<NodeId> = z.iter().copied().collect();
        while let Some(node) = queue.pop_front() {
            for parent in self.dag.parents(node) {
                if ancestors.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }
        ancestors
    }

    /// Check for an active trail from `x` to `y` given `z`.
    fn reachable(&self, x: NodeId, y: NodeId, z: &BTreeSet<NodeId>) -> bool {
        if x == y {
            return true;
        }
        let ancestors = self.ancestors_of(z);
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::from([(x, Travel::Up)]);

        while let Some((node, travel)) = queue.pop_front() {
            if !visited.insert((node, travel)) {
                continue;
            }
            let observed = z.contains(&node);
            if node == y && !observed {
                return true;
            }
            match travel {
                Travel::Up if !observed => {
                    for parent in self.dag.parents(node) {
                        queue.push_back((parent, Travel::Up));
                    }
                    for child in self.dag.children(node) {
                        queue.push_back((child, Travel::Down));
                    }
                }
                Travel::Up => {}
                Travel::Down => {
                    if !observed {
                        for child in self.dag.children(node) {
                            queue.push_back((child, Travel::Down));
                        }
                    }
                    if ancestors.contains(&node) {
                        for parent in self.dag.parents(node) {
                            queue.push_back((parent, Travel::Up));
                        }
                    }
                }
            }
        }
        false
    }
}

impl IndependenceTest for DSeparationTest {
    fn variables(&self) -> &[Node] {
        &self.variables
    }

    fn test(&self, x: NodeId, y: NodeId, z: &[NodeId]) -> Result<TestOutcome, OracleError> {
        let independent = self.is_d_separated(x, y, z)?;
        Ok(TestOutcome { independent, statistic: None })
    }

    fn name(&self) -> &str {
        "d-separation"
    }
}

/// Score oracle derived from d-separation.
#[derive(Debug, Clone)]
pub struct GraphScore {
    dsep: DSeparationTest,
}

impl GraphScore {
    /// Create a score over the measured nodes of `dag`.
    pub fn new(dag: Graph) -> Result<Self, OracleError> {
        Ok(Self { dsep: DSeparationTest::new(dag)? })
    }

    /// Create a score from an existing d-separation oracle.
    pub fn from_test(dsep: DSeparationTest) -> Self {
        Self { dsep }
    }
}

impl Score for GraphScore {
    fn variables(&self) -> &[Node] {
        self.dsep.variables()
    }

    /// Sum of the gains of adding each parent in order.
    fn local_score(&self, node: NodeId, parents: &[NodeId]) -> Result<f64, OracleError> {
        let mut total = 0.0;
        for (i, &parent) in parents.iter().enumerate() {
            total += self.local_score_diff(parent, node, &parents[..i])?;
        }
        Ok(total)
    }

    fn local_score_diff(&self, x: NodeId, y: NodeId, parents: &[NodeId]) -> Result<f64, OracleError> {
        if self.dsep.is_d_separated(x, y, parents)? {
            Ok(-1.0)
        } else {
            Ok(1.0)
        }
    }

    fn name(&self) -> &str {
        "graph-score"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Node;

    // ─── Test Helpers ───

    fn id(i: usize) -> NodeId {
        NodeId::new(i)
    }

    /// A -> B -> C, A -> D <- C
    fn diamond() -> DSeparationTest {
        let mut g = Graph::from_names(&["A", "B", "C", "D"]).unwrap();
        g.add_directed_by_name("A", "B").unwrap();
        g.add_directed_by_name("B", "C").unwrap();
        g.add_directed_by_name("A", "D").unwrap();
        g.add_directed_by_name("C", "D").unwrap();
        DSeparationTest::new(g).unwrap()
    }

    // ─── Tests ───

    #[test]
    fn test_chain_blocked_by_middle() {
        let t = diamond();
        assert!(!t.is_d_separated(id(0), id(2), &[]).unwrap());
        // A - D - C is a collider path, so B alone blocks A and C
        assert!(t.is_d_separated(id(0), id(2), &[id(1)]).unwrap());
    }

    #[test]
    fn test_collider_opened_by_conditioning() {
        let t = diamond();
        assert!(!t.is_d_separated(id(0), id(2), &[id(1), id(3)]).unwrap());
    }

    #[test]
    fn test_collider_opened_by_descendant() {
        let mut g = Graph::from_names(&["A", "B", "C", "D"]).unwrap();
        g.add_directed_by_name("A", "C").unwrap();
        g.add_directed_by_name("B", "C").unwrap();
        g.add_directed_by_name("C", "D").unwrap();
        let t = DSeparationTest::new(g).unwrap();
        assert!(t.is_d_separated(id(0), id(1), &[]).unwrap());
        assert!(!t.is_d_separated(id(0), id(1), &[id(3)]).unwrap());
    }

    #[test]
    fn test_latents_hidden() {
        let mut g = Graph::new(vec![
            Node::measured("A"),
            Node::latent("L"),
            Node::measured("B"),
        ])
        .unwrap();
        g.add_directed_by_name("L", "A").unwrap();
        g.add_directed_by_name("L", "B").unwrap();
        let t = DSeparationTest::new(g).unwrap();

        let names: Vec<&str> = t.variables().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert!(!t.test(id(0), id(1), &[]).unwrap().independent);
    }

    #[test]
    fn test_unknown_variable() {
        let t = diamond();
        assert_eq!(t.test(id(0), id(9), &[]), Err(OracleError::UnknownVariable(id(9))));
    }

    #[test]
    fn test_rejects_non_dag() {
        let mut g = Graph::from_names(&["A", "B"]).unwrap();
        g.add_edge_by_name("A", "B", crate::types::Endpoint::Circle, crate::types::Endpoint::Arrow)
            .unwrap();
        assert!(DSeparationTest::new(g).is_err());
    }

    #[test]
    fn test_graph_score_signs() {
        let score = GraphScore::from_test(diamond());
        assert_eq!(score.local_score_diff(id(0), id(1), &[]).unwrap(), 1.0);
        assert_eq!(score.local_score_diff(id(0), id(2), &[id(1)]).unwrap(), -1.0);
        assert_eq!(score.local_score(id(3), &[id(0), id(2)]).unwrap(), 2.0);
    }
}
