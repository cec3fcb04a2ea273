//! Per-pair reduction of bootstrap graphs.
//!
//! ## Policies
//!
//! - `Preserved`: keep an edge iff every run produced it with the same marks
//! - `Highest`: keep the most frequent outcome per pair, absence included;
//!   on a tie presence wins, and among mark combinations the one preferred
//!   at `node1` first, then at `node2` (arrowhead > tail > circle)
//! - `Majority`: keep an edge present in a strict majority of runs, with the
//!   marks `Highest` would pick among the runs that have it

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::EdgeEnsemble;
use crate::search::SearchError;
use crate::types::{Edge, Endpoint, Graph, NodeId};

/// How often one mark combination was seen for a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkCount {
    /// Mark at `node1`.
    pub endpoint1: Endpoint,
    /// Mark at `node2`.
    pub endpoint2: Endpoint,
    /// Runs with this combination.
    pub count: usize,
}

/// Outcome counts for one node pair across all runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeFrequency {
    /// First node (lower id).
    pub node1: String,
    /// Second node.
    pub node2: String,
    /// Runs aggregated.
    pub runs: usize,
    /// Runs without an edge on the pair.
    pub absent: usize,
    /// Counts per mark combination, in mark order.
    pub marks: Vec<MarkCount>,
}

impl EdgeFrequency {
    /// Runs with an edge on the pair.
    pub fn present(&self) -> usize {
        self.runs - self.absent
    }

    /// Share of runs with an edge on the pair.
    pub fn presence(&self) -> f64 {
        if self.runs == 0 {
            0.0
        } else {
            self.present() as f64 / self.runs as f64
        }
    }

    /// Runs with exactly these marks.
    pub fn count(&self, endpoint1: Endpoint, endpoint2: Endpoint) -> usize {
        self.marks
            .iter()
            .find(|m| m.endpoint1 == endpoint1 && m.endpoint2 == endpoint2)
            .map(|m| m.count)
            .unwrap_or(0)
    }
}

type Tally = BTreeMap<(Endpoint, Endpoint), usize>;

/// Reduce `graphs` to one graph under `policy`.
///
/// Nodes are matched by name against the first graph. Returns the
/// aggregated graph and a frequency entry for every pair that had an edge in
/// at least one run.
pub fn aggregate(
    graphs: &[Graph],
    policy: EdgeEnsemble,
) -> Result<(Graph, Vec<EdgeFrequency>), SearchError> {
    let reference = graphs
        .first()
        .ok_or_else(|| SearchError::Configuration("no graphs to aggregate".to_string()))?;
    let runs = graphs.len();

    let mut tallies: BTreeMap<(NodeId, NodeId), Tally> = BTreeMap::new();
    for graph in graphs {
        for e in graph.edges() {
            let a = reference.require_id(graph.name(e.node1))?;
            let b = reference.require_id(graph.name(e.node2))?;
            let edge = Edge::new(a, b, e.endpoint1, e.endpoint2);
            *tallies
                .entry(edge.pair())
                .or_default()
                .entry((edge.endpoint1, edge.endpoint2))
                .or_default() += 1;
        }
    }

    let mut aggregated = reference.empty_like();
    let mut frequencies = Vec::with_capacity(tallies.len());
    for (&(a, b), tally) in &tallies {
        let present: usize = tally.values().sum();
        let absent = runs - present;
        let chosen = match policy {
            EdgeEnsemble::Preserved => tally.iter().find(|&(_, &c)| c == runs).map(|(&m, _)| m),
            EdgeEnsemble::Highest => {
                best_marks(tally).filter(|&(_, count)| count >= absent).map(|(m, _)| m)
            }
            EdgeEnsemble::Majority => {
                if present * 2 > runs {
                    best_marks(tally).map(|(m, _)| m)
                } else {
                    None
                }
            }
        };
        if let Some((m1, m2)) = chosen {
            aggregated.add_edge(Edge::new(a, b, m1, m2))?;
        }

        frequencies.push(EdgeFrequency {
            node1: reference.name(a).to_string(),
            node2: reference.name(b).to_string(),
            runs,
            absent,
            marks: tally
                .iter()
                .map(|(&(endpoint1, endpoint2), &count)| MarkCount { endpoint1, endpoint2, count })
                .collect(),
        });
    }

    Ok((aggregated, frequencies))
}

/// Most frequent mark combination, ties by preference at node1 then node2.
fn best_marks(tally: &Tally) -> Option<((Endpoint, Endpoint), usize)> {
    tally
        .iter()
        .max_by_key(|&(&(m1, m2), &count)| (count, m1.preference(), m2.preference()))
        .map(|(&marks, &count)| (marks, count))
}
