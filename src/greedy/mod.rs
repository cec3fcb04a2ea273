//! Greedy score search used as the hybrid front end.
//!
//! ## Algorithm
//!
//! 1. Start from the empty DAG plus the required edges
//! 2. Forward: repeatedly add the single edge `x --> y` with the largest
//!    score gain, as long as the gain exceeds the improvement threshold
//! 3. Backward: repeatedly remove the single edge whose removal gains most,
//!    under the same threshold
//! 4. Convert the final DAG to its pattern
//!
//! Candidate moves within one step are scored in parallel; the chosen move
//! is the best gain, ties going to the lowest `(x, y)`. Additions never
//! create a cycle or a forbidden edge, and required edges are never removed.
//! Each phase is capped at `n (n - 1)` moves.

pub mod pattern;

pub use pattern::dag_to_pattern;

use rayon::prelude::*;

use crate::oracle::Score;
use crate::search::{CancellationToken, SearchError};
use crate::types::{Edge, Graph, NodeId, ResolvedKnowledge};

/// A graph with its total score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredGraph {
    /// DAG visited by the search.
    pub graph: Graph,
    /// Sum of the local scores.
    pub score: f64,
}

/// Result of a greedy search.
#[derive(Debug, Clone)]
pub struct GreedyResult {
    /// Final DAG.
    pub dag: Graph,
    /// Pattern of the final DAG.
    pub pattern: Graph,
    /// Total score of the final DAG.
    pub score: f64,
    /// Best DAGs seen, score descending; equal scores keep visit order.
    pub top_graphs: Vec<ScoredGraph>,
    /// Moves applied in both phases.
    pub moves: usize,
}

/// Forward/backward greedy search over single-edge moves.
pub struct GreedySearch<'a> {
    score: &'a dyn Score,
    knowledge: &'a ResolvedKnowledge,
    threshold: f64,
    num_patterns_to_store: usize,
    cancel: Option<&'a CancellationToken>,
}

/// Candidate move with its gain.
struct Move {
    from: NodeId,
    to: NodeId,
    gain: f64,
}

impl<'a> GreedySearch<'a> {
    /// Create a search with threshold 0 that keeps the single best graph.
    pub fn new(score: &'a dyn Score, knowledge: &'a ResolvedKnowledge) -> Self {
        Self {
            score,
            knowledge,
            threshold: 0.0,
            num_patterns_to_store: 1,
            cancel: None,
        }
    }

    /// Minimum gain for a move to count as an improvement.
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Number of best graphs to keep.
    pub fn num_patterns_to_store(mut self, k: usize) -> Self {
        self.num_patterns_to_store = k;
        self
    }

    /// Check a cancellation token before every move.
    pub fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Run the search over the nodes of `nodes` (its edges are ignored).
    pub fn search(&self, nodes: &Graph) -> Result<GreedyResult, SearchError> {
        let mut dag = nodes.empty_like();
        for (from, to) in self.knowledge.required_edges() {
            if !dag.has_directed_path(to, from) {
                dag.add_edge(Edge::directed(from, to))?;
            }
        }

        let mut total = 0.0;
        for node in dag.node_ids() {
            total += self.local_score(&dag, node)?;
        }

        let mut top = Vec::new();
        self.remember(&mut top, &dag, total);

        let cap = dag.num_nodes() * dag.num_nodes().saturating_sub(1);

        let mut added = 0;
        while added < cap {
            self.check_cancelled()?;
            let Some(best) = self.best_move(self.additions(&dag), &dag, false)? else {
                break;
            };
            dag.add_edge(Edge::directed(best.from, best.to))?;
            total += best.gain;
            added += 1;
            tracing::trace!(from = %dag.name(best.from), to = %dag.name(best.to), gain = best.gain, "Added edge");
            self.remember(&mut top, &dag, total);
        }

        let mut removed = 0;
        while removed < cap {
            self.check_cancelled()?;
            let Some(best) = self.best_move(self.removals(&dag), &dag, true)? else {
                break;
            };
            dag.remove_edge(best.from, best.to);
            total += best.gain;
            removed += 1;
            tracing::trace!(from = %dag.name(best.from), to = %dag.name(best.to), gain = best.gain, "Removed edge");
            self.remember(&mut top, &dag, total);
        }
        tracing::debug!(added, removed, edges = dag.num_edges(), score = total, "Greedy search complete");

        Ok(GreedyResult {
            pattern: dag_to_pattern(&dag),
            dag,
            score: total,
            top_graphs: top,
            moves: added + removed,
        })
    }

    fn check_cancelled(&self) -> Result<(), SearchError> {
        match self.cancel {
            Some(token) => token.check(),
            None => Ok(()),
        }
    }

    fn local_score(&self, dag: &Graph, node: NodeId) -> Result<f64, SearchError> {
        let parents = dag.parents(node);
        self.score
            .local_score(node, &parents)
            .map_err(|e| self.failure(dag, node, node, e))
    }

    fn failure(&self, dag: &Graph, x: NodeId, y: NodeId, e: crate::oracle::OracleError) -> SearchError {
        SearchError::OracleFailure {
            x: dag.name(x).to_string(),
            y: dag.name(y).to_string(),
            conditioning: dag.parents(y).iter().map(|&p| dag.name(p).to_string()).collect(),
            reason: e.to_string(),
        }
    }

    /// Addable edges `x --> y` in pair order.
    fn additions(&self, dag: &Graph) -> Vec<(NodeId, NodeId)> {
        let mut candidates = Vec::new();
        for x in dag.node_ids() {
            for y in dag.node_ids() {
                if x == y || dag.is_adjacent(x, y) || self.knowledge.is_forbidden(x, y) {
                    continue;
                }
                if dag.has_directed_path(y, x) {
                    continue;
                }
                candidates.push((x, y));
            }
        }
        candidates
    }

    /// Removable edges `x --> y` in pair order.
    fn removals(&self, dag: &Graph) -> Vec<(NodeId, NodeId)> {
        let mut candidates: Vec<(NodeId, NodeId)> = dag
            .edges()
            .filter_map(|e| {
                let (x, y) = if e.points_towards(e.node1, e.node2) {
                    (e.node1, e.node2)
                } else {
                    (e.node2, e.node1)
                };
                (!self.knowledge.is_pair_required(x, y)).then_some((x, y))
            })
            .collect();
        candidates.sort();
        candidates
    }

    /// Score all candidates in parallel and pick the best improving one.
    fn best_move(
        &self,
        candidates: Vec<(NodeId, NodeId)>,
        dag: &Graph,
        removal: bool,
    ) -> Result<Option<Move>, SearchError> {
        let gains = candidates
            .par_iter()
            .map(|&(x, y)| {
                let mut parents = dag.parents(y);
                if removal {
                    parents.retain(|&p| p != x);
                }
                let diff = self
                    .score
                    .local_score_diff(x, y, &parents)
                    .map_err(|e| self.failure(dag, x, y, e))?;
                Ok(if removal { -diff } else { diff })
            })
            .collect::<Result<Vec<f64>, SearchError>>()?;

        let mut best: Option<Move> = None;
        for (&(from, to), &gain) in candidates.iter().zip(gains.iter()) {
            if gain <= self.threshold {
                continue;
            }
            if best.as_ref().map(|b| gain > b.gain).unwrap_or(true) {
                best = Some(Move { from, to, gain });
            }
        }
        Ok(best)
    }

    fn remember(&self, top: &mut Vec<ScoredGraph>, dag: &Graph, score: f64) {
        if self.num_patterns_to_store == 0 {
            return;
        }
        top.push(ScoredGraph { graph: dag.clone(), score });
        top.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        top.truncate(self.num_patterns_to_store);
    }
}
