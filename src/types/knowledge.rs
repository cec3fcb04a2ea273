//! Background knowledge: forbidden and required edges, temporal tiers.
//!
//! Knowledge is stated over variable names so it can be written before any
//! data is loaded. A search resolves it once against its node set into a
//! [`ResolvedKnowledge`] and passes that immutable value to every phase.
//!
//! ## Semantics
//!
//! - `forbidden (a, b)`: `a` is not a direct cause of `b`. When both
//!   directions are forbidden the pair is never adjacent.
//! - `required (a, b)`: the output contains `a --> b`.
//! - Tiers: a variable in a later tier cannot cause one in an earlier tier,
//!   i.e. every `(later, earlier)` pair is implicitly forbidden.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::edge::Endpoint;
use super::graph::Graph;
use super::node::{NodeId, NodeType};

/// Error type for inconsistent knowledge.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KnowledgeError {
    /// A pair is both forbidden and required.
    #[error("Edge {from} -> {to} is both forbidden and required")]
    Conflict {
        /// Source variable.
        from: String,
        /// Target variable.
        to: String,
    },
    /// Both directions of a pair are required.
    #[error("Edges {from} -> {to} and {to} -> {from} are both required")]
    OpposingRequirements {
        /// Source variable of the first requirement.
        from: String,
        /// Target variable of the first requirement.
        to: String,
    },
    /// A required edge points from a later tier into an earlier one.
    #[error("Required edge {from} -> {to} contradicts the tier ordering")]
    TierConflict {
        /// Source variable.
        from: String,
        /// Target variable.
        to: String,
    },
    /// A variable was placed in more than one tier.
    #[error("Variable {0} appears in more than one tier")]
    DuplicateTierMember(String),
    /// Knowledge mentions a variable the search does not know.
    #[error("Knowledge refers to unknown variable: {0}")]
    UnknownVariable(String),
}

/// Background knowledge over variable names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Knowledge {
    /// Forbidden ordered pairs `(from, to)`.
    #[serde(default)]
    pub forbidden: BTreeSet<(String, String)>,
    /// Required ordered pairs `(from, to)`.
    #[serde(default)]
    pub required: BTreeSet<(String, String)>,
    /// Tier ordering, earliest first.
    #[serde(default)]
    pub tiers: Option<Vec<BTreeSet<String>>>,
    /// Orient still-undetermined tier-crossing edges forward in tier order.
    #[serde(default)]
    pub default_to_tier_layout: bool,
}

impl Knowledge {
    /// Create empty knowledge.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forbid `from --> to`.
    pub fn forbid(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.forbidden.insert((from.into(), to.into()));
        self
    }

    /// Forbid adjacency between `a` and `b` entirely.
    pub fn forbid_pair(self, a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        self.forbid(a.clone(), b.clone()).forbid(b, a)
    }

    /// Require `from --> to`.
    pub fn require(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.required.insert((from.into(), to.into()));
        self
    }

    /// Set the tier ordering, earliest first.
    pub fn with_tiers<I, T, S>(mut self, tiers: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tiers = Some(
            tiers
                .into_iter()
                .map(|tier| tier.into_iter().map(Into::into).collect())
                .collect(),
        );
        self
    }

    /// Enable or disable the tier layout post-process.
    pub fn with_tier_layout(mut self, enabled: bool) -> Self {
        self.default_to_tier_layout = enabled;
        self
    }

    /// Check if nothing is constrained.
    pub fn is_empty(&self) -> bool {
        self.forbidden.is_empty() && self.required.is_empty() && self.tiers.is_none()
    }

    /// Tier index of a variable.
    pub fn tier_of(&self, name: &str) -> Option<usize> {
        self.tiers
            .as_ref()
            .and_then(|tiers| tiers.iter().position(|tier| tier.contains(name)))
    }

    /// Check if `from --> to` is forbidden, explicitly or by tiers.
    pub fn is_forbidden(&self, from: &str, to: &str) -> bool {
        if self.forbidden.contains(&(from.to_string(), to.to_string())) {
            return true;
        }
        matches!((self.tier_of(from), self.tier_of(to)), (Some(a), Some(b)) if a > b)
    }

    /// Check if `from --> to` is required.
    pub fn is_required(&self, from: &str, to: &str) -> bool {
        self.required.contains(&(from.to_string(), to.to_string()))
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), KnowledgeError> {
        if let Some(tiers) = &self.tiers {
            let mut seen = BTreeSet::new();
            for name in tiers.iter().flatten() {
                if !seen.insert(name) {
                    return Err(KnowledgeError::DuplicateTierMember(name.clone()));
                }
            }
        }
        for (from, to) in &self.required {
            if self.forbidden.contains(&(from.clone(), to.clone())) {
                return Err(KnowledgeError::Conflict { from: from.clone(), to: to.clone() });
            }
            if self.required.contains(&(to.clone(), from.clone())) {
                return Err(KnowledgeError::OpposingRequirements { from: from.clone(), to: to.clone() });
            }
            if self.is_forbidden(from, to) {
                return Err(KnowledgeError::TierConflict { from: from.clone(), to: to.clone() });
            }
        }
        Ok(())
    }

    /// Derive knowledge from a graph.
    ///
    /// Every non-adjacent pair is forbidden both ways and every directed
    /// edge `a --> b` forbids `b --> a`. Error-term nodes are skipped.
    pub fn forbidden_from_graph(graph: &Graph) -> Self {
        let mut knowledge = Self::new();
        let nodes: Vec<NodeId> = graph
            .node_ids()
            .filter(|&id| graph.node(id).map(|n| n.node_type != NodeType::Error).unwrap_or(false))
            .collect();

        for (i, &a) in nodes.iter().enumerate() {
            for &b in &nodes[i + 1..] {
                let (name_a, name_b) = (graph.name(a).to_string(), graph.name(b).to_string());
                match graph.edge(a, b) {
                    None => {
                        knowledge = knowledge.forbid_pair(name_a, name_b);
                    }
                    Some(edge) if edge.is_directed() => {
                        if edge.points_towards(a, b) {
                            knowledge = knowledge.forbid(name_b, name_a);
                        } else {
                            knowledge = knowledge.forbid(name_a, name_b);
                        }
                    }
                    Some(_) => {}
                }
            }
        }
        knowledge
    }

    /// Resolve names against a graph's node set.
    ///
    /// Fails on inconsistent knowledge or on names the graph does not have.
    pub fn resolve(&self, graph: &Graph) -> Result<ResolvedKnowledge, KnowledgeError> {
        self.validate()?;
        let id = |name: &String| {
            graph
                .node_id(name)
                .ok_or_else(|| KnowledgeError::UnknownVariable(name.clone()))
        };

        let mut forbidden = BTreeSet::new();
        for (from, to) in &self.forbidden {
            forbidden.insert((id(from)?, id(to)?));
        }
        let mut required = BTreeSet::new();
        for (from, to) in &self.required {
            required.insert((id(from)?, id(to)?));
        }
        let mut tier = vec![None; graph.num_nodes()];
        if let Some(tiers) = &self.tiers {
            for (index, members) in tiers.iter().enumerate() {
                for name in members {
                    tier[id(name)?.index()] = Some(index);
                }
            }
        }

        Ok(ResolvedKnowledge {
            forbidden,
            required,
            tier,
            tier_layout: self.default_to_tier_layout,
        })
    }
}

/// Knowledge resolved to node ids for one search run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedKnowledge {
    forbidden: BTreeSet<(NodeId, NodeId)>,
    required: BTreeSet<(NodeId, NodeId)>,
    tier: Vec<Option<usize>>,
    tier_layout: bool,
}

impl ResolvedKnowledge {
    /// Knowledge that constrains nothing.
    pub fn empty(num_nodes: usize) -> Self {
        Self {
            tier: vec![None; num_nodes],
            ..Self::default()
        }
    }

    /// Tier of a node.
    pub fn tier_of(&self, node: NodeId) -> Option<usize> {
        self.tier.get(node.index()).copied().flatten()
    }

    /// Check if `from --> to` is forbidden, explicitly or by tiers.
    pub fn is_forbidden(&self, from: NodeId, to: NodeId) -> bool {
        self.forbidden.contains(&(from, to))
            || matches!((self.tier_of(from), self.tier_of(to)), (Some(a), Some(b)) if a > b)
    }

    /// Check if `from --> to` is required.
    pub fn is_required(&self, from: NodeId, to: NodeId) -> bool {
        self.required.contains(&(from, to))
    }

    /// Check if the pair may never be adjacent.
    pub fn is_pair_forbidden(&self, a: NodeId, b: NodeId) -> bool {
        self.is_forbidden(a, b) && self.is_forbidden(b, a)
    }

    /// Check if the pair must be adjacent.
    pub fn is_pair_required(&self, a: NodeId, b: NodeId) -> bool {
        self.is_required(a, b) || self.is_required(b, a)
    }

    /// Required edges in pair order.
    pub fn required_edges(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.required.iter().copied()
    }

    /// Whether the tier layout post-process is requested.
    pub fn tier_layout(&self) -> bool {
        self.tier_layout
    }

    /// Mark the knowledge forces at `at` on the edge between `other` and `at`.
    ///
    /// Required `at --> other` forces a tail at `at`; required
    /// `other --> at` forces an arrowhead at `at`; forbidden `at --> other`
    /// means `at` cannot be an ancestor of `other`, which forces an
    /// arrowhead at `at`.
    pub fn forced_mark(&self, other: NodeId, at: NodeId) -> Option<Endpoint> {
        if self.is_required(at, other) {
            Some(Endpoint::Tail)
        } else if self.is_required(other, at) {
            Some(Endpoint::Arrow)
        } else if self.is_forbidden(at, other) && !self.is_forbidden(other, at) {
            Some(Endpoint::Arrow)
        } else {
            None
        }
    }

    /// Number of explicit constraints, for logging.
    pub fn summary(&self) -> BTreeMap<&'static str, usize> {
        BTreeMap::from([
            ("forbidden", self.forbidden.len()),
            ("required", self.required.len()),
            ("tiered", self.tier.iter().filter(|t| t.is_some()).count()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_detected() {
        let k = Knowledge::new().forbid("A", "B").require("A", "B");
        assert_eq!(
            k.validate(),
            Err(KnowledgeError::Conflict { from: "A".into(), to: "B".into() })
        );
    }

    #[test]
    fn test_opposing_requirements_rejected() {
        let k = Knowledge::new().require("B", "A").require("A", "B");
        assert_eq!(
            k.validate(),
            Err(KnowledgeError::OpposingRequirements { from: "A".into(), to: "B".into() })
        );
        assert!(Knowledge::new().require("A", "B").require("A", "C").validate().is_ok());
    }

    #[test]
    fn test_tier_implies_forbidden() {
        let k = Knowledge::new().with_tiers([vec!["A"], vec!["B", "C"]]);
        assert!(k.is_forbidden("B", "A"));
        assert!(!k.is_forbidden("A", "B"));
        assert!(!k.is_forbidden("B", "C"));
    }

    #[test]
    fn test_required_against_tiers_rejected() {
        let k = Knowledge::new()
            .with_tiers([vec!["A"], vec!["B"]])
            .require("B", "A");
        assert!(matches!(k.validate(), Err(KnowledgeError::TierConflict { .. })));
    }

    #[test]
    fn test_duplicate_tier_member_rejected() {
        let k = Knowledge::new().with_tiers([vec!["A"], vec!["A"]]);
        assert_eq!(k.validate(), Err(KnowledgeError::DuplicateTierMember("A".into())));
    }

    #[test]
    fn test_resolve_unknown_variable() {
        let g = Graph::from_names(&["A", "B"]).unwrap();
        let k = Knowledge::new().forbid("A", "Z");
        assert_eq!(k.resolve(&g), Err(KnowledgeError::UnknownVariable("Z".into())));
    }

    #[test]
    fn test_forced_marks() {
        let g = Graph::from_names(&["A", "B", "C"]).unwrap();
        let (a, b, c) = (NodeId::new(0), NodeId::new(1), NodeId::new(2));
        let k = Knowledge::new().require("A", "B").forbid("C", "B").resolve(&g).unwrap();

        assert_eq!(k.forced_mark(b, a), Some(Endpoint::Tail));
        assert_eq!(k.forced_mark(a, b), Some(Endpoint::Arrow));
        // C --> B forbidden: C cannot be an ancestor of B
        assert_eq!(k.forced_mark(b, c), Some(Endpoint::Arrow));
        assert_eq!(k.forced_mark(c, b), None);
    }

    #[test]
    fn test_forbidden_from_graph() {
        let mut g = Graph::new(vec![
            crate::types::Node::measured("A"),
            crate::types::Node::measured("B"),
            crate::types::Node::measured("C"),
            crate::types::Node::new("E_A", NodeType::Error, Default::default()),
        ])
        .unwrap();
        g.add_directed_by_name("A", "B").unwrap();

        let k = Knowledge::forbidden_from_graph(&g);
        assert!(k.is_forbidden("B", "A"));
        assert!(!k.is_forbidden("A", "B"));
        assert!(k.is_forbidden("A", "C") && k.is_forbidden("C", "A"));
        assert!(!k.forbidden.iter().any(|(f, t)| f == "E_A" || t == "E_A"));
    }
}
