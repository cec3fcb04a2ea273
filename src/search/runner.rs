//! Test dispatch shared by the skeleton phases.
//!
//! Wraps the oracle with counters, the lenient-mode downgrade and the
//! cancellation check so the phases only see `Result<bool, SearchError>`.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::oracle::{IndependenceTest, OracleError};
use crate::types::{Node, NodeId};
use super::{CancellationToken, SearchError};

pub(crate) struct TestRunner<'a> {
    test: &'a dyn IndependenceTest,
    lenient: bool,
    cancel: &'a CancellationToken,
    tests_performed: AtomicU64,
    inconclusive: AtomicU64,
}

impl<'a> TestRunner<'a> {
    pub(crate) fn new(test: &'a dyn IndependenceTest, lenient: bool, cancel: &'a CancellationToken) -> Self {
        Self {
            test,
            lenient,
            cancel,
            tests_performed: AtomicU64::new(0),
            inconclusive: AtomicU64::new(0),
        }
    }

    fn variables(&self) -> &[Node] {
        self.test.variables()
    }

    fn name_of(&self, id: NodeId) -> String {
        self.variables()
            .get(id.index())
            .map(|n| n.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Ask the oracle whether `x _||_ y | z`.
    pub(crate) fn is_independent(&self, x: NodeId, y: NodeId, z: &[NodeId]) -> Result<bool, SearchError> {
        self.tests_performed.fetch_add(1, Ordering::Relaxed);
        match self.test.test(x, y, z) {
            Ok(outcome) => Ok(outcome.independent),
            Err(OracleError::Inconclusive(reason)) if self.lenient => {
                self.inconclusive.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    x = %self.name_of(x),
                    y = %self.name_of(y),
                    conditioning = z.len(),
                    reason = %reason,
                    "Inconclusive test treated as independence"
                );
                Ok(true)
            }
            Err(e) => Err(SearchError::OracleFailure {
                x: self.name_of(x),
                y: self.name_of(y),
                conditioning: z.iter().map(|&id| self.name_of(id)).collect(),
                reason: e.to_string(),
            }),
        }
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), SearchError> {
        self.cancel.check()
    }

    pub(crate) fn tests_performed(&self) -> u64 {
        self.tests_performed.load(Ordering::Relaxed)
    }

    pub(crate) fn inconclusive(&self) -> u64 {
        self.inconclusive.load(Ordering::Relaxed)
    }
}

/// Subsets of `items` of size `k` in lexicographic order of positions.
pub(crate) fn combinations(items: &[NodeId], k: usize) -> Combinations<'_> {
    Combinations {
        items,
        indices: (0..k).collect(),
        done: k > items.len(),
    }
}

/// Iterator over fixed-size subsets, see [`combinations`].
pub(crate) struct Combinations<'a> {
    items: &'a [NodeId],
    indices: Vec<usize>,
    done: bool,
}

impl Iterator for Combinations<'_> {
    type Item = Vec<NodeId>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let current = self.indices.iter().map(|&i| self.items[i]).collect();

        let n = self.items.len();
        let k = self.indices.len();
        let mut i = k;
        loop {
            if i == 0 {
                self.done = true;
                break;
            }
            i -= 1;
            if self.indices[i] < n - k + i {
                self.indices[i] += 1;
                for j in (i + 1)..k {
                    self.indices[j] = self.indices[j - 1] + 1;
                }
                break;
            }
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[usize]) -> Vec<NodeId> {
        v.iter().map(|&i| NodeId::new(i)).collect()
    }

    #[test]
    fn test_combinations_order() {
        let items = ids(&[3, 5, 7]);
        let pairs: Vec<Vec<NodeId>> = combinations(&items, 2).collect();
        assert_eq!(pairs, vec![ids(&[3, 5]), ids(&[3, 7]), ids(&[5, 7])]);
    }

    #[test]
    fn test_combinations_edge_sizes() {
        let items = ids(&[1, 2]);
        assert_eq!(combinations(&items, 0).collect::<Vec<_>>(), vec![Vec::<NodeId>::new()]);
        assert_eq!(combinations(&items, 3).count(), 0);
        assert_eq!(combinations(&items, 2).count(), 1);
        assert_eq!(combinations(&[], 0).count(), 1);
    }

    #[test]
    fn test_combinations_count() {
        let items = ids(&[0, 1, 2, 3, 4]);
        assert_eq!(combinations(&items, 3).count(), 10);
    }
}
