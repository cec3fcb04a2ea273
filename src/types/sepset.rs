//! Separating-set bookkeeping.

use std::collections::{BTreeMap, BTreeSet};

use super::graph::ordered;
use super::node::NodeId;

/// Conditioning sets that rendered node pairs independent.
///
/// Keys are unordered pairs, so `get(x, y)` and `get(y, x)` always return the
/// same set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SepsetMap {
    sets: BTreeMap<(NodeId, NodeId), BTreeSet<NodeId>>,
}

impl SepsetMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the separating set for a pair, replacing any earlier one.
    pub fn set(&mut self, x: NodeId, y: NodeId, sepset: impl IntoIterator<Item = NodeId>) {
        self.sets.insert(ordered(x, y), sepset.into_iter().collect());
    }

    /// Separating set for a pair, if the pair was separated.
    pub fn get(&self, x: NodeId, y: NodeId) -> Option<&BTreeSet<NodeId>> {
        self.sets.get(&ordered(x, y))
    }

    /// Check whether `node` is in the separating set of `x` and `y`.
    ///
    /// Returns `None` if the pair was never separated.
    pub fn is_in_sepset(&self, node: NodeId, x: NodeId, y: NodeId) -> Option<bool> {
        self.get(x, y).map(|set| set.contains(&node))
    }

    /// Check whether a pair has a recorded separating set.
    pub fn contains(&self, x: NodeId, y: NodeId) -> bool {
        self.sets.contains_key(&ordered(x, y))
    }

    /// Drop the entry for a pair.
    pub fn remove(&mut self, x: NodeId, y: NodeId) -> Option<BTreeSet<NodeId>> {
        self.sets.remove(&ordered(x, y))
    }

    /// Number of separated pairs.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Check if no pair has been separated.
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// All entries in pair order.
    pub fn iter(&self) -> impl Iterator<Item = (&(NodeId, NodeId), &BTreeSet<NodeId>)> + '_ {
        self.sets.iter()
    }
}
