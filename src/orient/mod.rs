//! Orientation engine: turns a skeleton into a partial ancestral graph.
//!
//! ## Phases
//!
//! 1. Knowledge forcing: required and forbidden directions set their marks
//!    first. A forced mark is no longer a circle, so no rule can touch it.
//! 2. Collider detection: every unshielded triple `x - y - z` becomes
//!    `x *-> y <-* z` iff `y` is not in sepset(x, z).
//! 3. Rule fixpoint: the orientation rules run in passes until a full pass
//!    changes nothing. R1-R4 always run; R5-R10 run with the complete rule set.
//! 4. Tier layout (optional): tier-crossing edges whose earlier end is still
//!    a circle are oriented forward in tier order, then the fixpoint is rerun.
//!
//! ## Monotonicity
//!
//! Every mark change goes through one setter that only rewrites circles.
//! A tail or arrowhead is never reverted, so each pass either removes at
//! least one circle or ends the loop. The pass count is capped at the number
//! of circle marks plus one.

mod paths;
mod rules;

use serde::Serialize;

use crate::search::{CancellationToken, SearchError};
use crate::types::{
    Endpoint, Graph, NodeId, ResolvedKnowledge, SepsetMap, Triple, TripleClassification, TripleKind,
};

/// One endpoint mark change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MarkChange {
    /// Node at the other end of the edge.
    pub from: NodeId,
    /// Node whose mark changed.
    pub at: NodeId,
    /// Mark before the change.
    pub old: Endpoint,
    /// Mark after the change.
    pub new: Endpoint,
    /// Rule that made the change.
    pub rule: &'static str,
}

/// Result of one orientation run.
#[derive(Debug, Clone, Default)]
pub struct OrientOutcome {
    /// Classification of the unshielded triples and of the triples
    /// decided through discriminating paths.
    pub triples: TripleClassification,
    /// Rule passes run, the final no-change pass included.
    pub passes: usize,
    /// Number of endpoint changes.
    pub changes: usize,
    /// A path-based rule skipped a path longer than the bound.
    pub path_bound_reached: bool,
    /// Every change in order, when recording is enabled.
    pub change_log: Vec<MarkChange>,
}

/// Orientation engine over one skeleton's sepsets and knowledge.
#[derive(Debug, Clone)]
pub struct FciOrient<'a> {
    sepsets: &'a SepsetMap,
    knowledge: &'a ResolvedKnowledge,
    complete_rule_set: bool,
    max_path_length: Option<usize>,
    pattern: Option<&'a Graph>,
    cancel: Option<&'a CancellationToken>,
    record_changes: bool,
}

impl<'a> FciOrient<'a> {
    /// Create an engine with the complete rule set and no path bound.
    pub fn new(sepsets: &'a SepsetMap, knowledge: &'a ResolvedKnowledge) -> Self {
        Self {
            sepsets,
            knowledge,
            complete_rule_set: true,
            max_path_length: None,
            pattern: None,
            cancel: None,
            record_changes: false,
        }
    }

    /// Use the complete rule set (R5-R10) or only R1-R4.
    pub fn complete_rule_set(mut self, enabled: bool) -> Self {
        self.complete_rule_set = enabled;
        self
    }

    /// Bound the paths examined by path-based rules.
    pub fn max_path_length(mut self, limit: Option<usize>) -> Self {
        self.max_path_length = limit;
        self
    }

    /// Decide untested unshielded triples from a candidate pattern.
    pub fn with_pattern(mut self, pattern: &'a Graph) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Check a cancellation token between passes.
    pub fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Keep every mark change in [`OrientOutcome::change_log`].
    pub fn record_changes(mut self, enabled: bool) -> Self {
        self.record_changes = enabled;
        self
    }

    /// Orient `graph` in place.
    ///
    /// Edges are never added or removed; only circle marks change.
    pub fn orient(&self, graph: &mut Graph) -> Result<OrientOutcome, SearchError> {
        let mut marker = Marker::new(graph, self.record_changes);

        self.force_knowledge(&mut marker);
        marker.triples = self.orient_colliders(&mut marker);
        let mut passes = self.run_rules(&mut marker)?;

        if self.knowledge.tier_layout() && self.apply_tier_layout(&mut marker) {
            passes += self.run_rules(&mut marker)?;
        }

        tracing::debug!(
            passes,
            changes = marker.changes,
            colliders = marker.triples.of_kind(TripleKind::Collider).len(),
            "Orientation complete"
        );

        Ok(OrientOutcome {
            triples: marker.triples,
            passes,
            changes: marker.changes,
            path_bound_reached: marker.path_bound_reached,
            change_log: marker.log.unwrap_or_default(),
        })
    }

    /// Apply knowledge forcing and collider detection only.
    pub fn apply_colliders(&self, graph: &mut Graph) -> TripleClassification {
        let mut marker = Marker::new(graph, false);
        self.force_knowledge(&mut marker);
        self.orient_colliders(&mut marker)
    }

    fn force_knowledge(&self, m: &mut Marker<'_>) {
        let pairs: Vec<(NodeId, NodeId)> = m.graph.edges().map(|e| e.pair()).collect();
        for (a, b) in pairs {
            if let Some(mark) = self.knowledge.forced_mark(a, b) {
                m.set(a, b, mark, "knowledge");
            }
            if let Some(mark) = self.knowledge.forced_mark(b, a) {
                m.set(b, a, mark, "knowledge");
            }
        }
    }

    fn orient_colliders(&self, m: &mut Marker<'_>) -> TripleClassification {
        let mut triples = TripleClassification::new();
        let nodes: Vec<NodeId> = m.graph.node_ids().collect();

        for y in nodes {
            let adjacent = m.graph.adjacent_nodes(y);
            for (i, &x) in adjacent.iter().enumerate() {
                for &z in &adjacent[i + 1..] {
                    if m.graph.is_adjacent(x, z) {
                        continue;
                    }
                    let triple = Triple::new(x, y, z);
                    let kind = self.classify(m.graph, x, y, z);
                    let kind = match kind {
                        TripleKind::Collider if arrowheads_allowed(m.graph, x, y, z) => {
                            m.set(x, y, Endpoint::Arrow, "R0");
                            m.set(z, y, Endpoint::Arrow, "R0");
                            TripleKind::Collider
                        }
                        TripleKind::Collider => TripleKind::Ambiguous,
                        other => other,
                    };
                    triples.insert(triple, kind);
                }
            }
        }
        triples
    }

    fn classify(&self, graph: &Graph, x: NodeId, y: NodeId, z: NodeId) -> TripleKind {
        match self.sepsets.is_in_sepset(y, x, z) {
            Some(true) => TripleKind::Noncollider,
            Some(false) => TripleKind::Collider,
            None => match self.pattern {
                Some(pattern) => pattern_kind(pattern, graph, x, y, z),
                None => TripleKind::Ambiguous,
            },
        }
    }

    fn run_rules(&self, m: &mut Marker<'_>) -> Result<usize, SearchError> {
        let cap = m.circle_marks() + 1;
        let mut passes = 0;

        loop {
            if let Some(token) = self.cancel {
                token.check()?;
            }
            passes += 1;
            let before = m.changes;

            rules::rule_r1(m);
            rules::rule_r2(m);
            rules::rule_r3(m);
            paths::rule_r4(m, self.sepsets, self.max_path_length);

            if self.complete_rule_set {
                paths::rule_r5(m, self.max_path_length);
                rules::rule_r6(m);
                rules::rule_r7(m);
                rules::rule_r8(m);
                paths::rule_r9(m, self.max_path_length);
                paths::rule_r10(m, self.max_path_length);
            }

            let changed = m.changes - before;
            tracing::debug!(pass = passes, changed, "Orientation pass");
            if changed == 0 || passes >= cap {
                break;
            }
        }
        Ok(passes)
    }

    /// Orient tier-crossing edges from the earlier tier to the later one.
    ///
    /// Only edges whose mark at the earlier node is still a circle change.
    fn apply_tier_layout(&self, m: &mut Marker<'_>) -> bool {
        let before = m.changes;
        let pairs: Vec<(NodeId, NodeId)> = m.graph.edges().map(|e| e.pair()).collect();

        for (a, b) in pairs {
            let (Some(tier_a), Some(tier_b)) = (self.knowledge.tier_of(a), self.knowledge.tier_of(b)) else {
                continue;
            };
            let (from, to) = match tier_a.cmp(&tier_b) {
                std::cmp::Ordering::Less => (a, b),
                std::cmp::Ordering::Greater => (b, a),
                std::cmp::Ordering::Equal => continue,
            };
            if m.mark(to, from) != Some(Endpoint::Circle) || m.mark(from, to) == Some(Endpoint::Tail) {
                continue;
            }
            m.set(from, to, Endpoint::Arrow, "tier-layout");
            m.set(to, from, Endpoint::Tail, "tier-layout");
        }
        m.changes > before
    }
}

/// Both marks at `y` can take an arrowhead.
fn arrowheads_allowed(graph: &Graph, x: NodeId, y: NodeId, z: NodeId) -> bool {
    let open = |mark: Option<Endpoint>| matches!(mark, Some(Endpoint::Circle) | Some(Endpoint::Arrow));
    open(graph.endpoint(x, y)) && open(graph.endpoint(z, y))
}

/// Kind of `x - y - z` according to a candidate pattern, by node name.
fn pattern_kind(pattern: &Graph, graph: &Graph, x: NodeId, y: NodeId, z: NodeId) -> TripleKind {
    let ids = (
        pattern.node_id(graph.name(x)),
        pattern.node_id(graph.name(y)),
        pattern.node_id(graph.name(z)),
    );
    let (Some(px), Some(py), Some(pz)) = ids else {
        return TripleKind::Ambiguous;
    };
    if !pattern.is_adjacent(px, py) || !pattern.is_adjacent(py, pz) {
        return TripleKind::Ambiguous;
    }
    if pattern.is_def_collider(px, py, pz) {
        TripleKind::Collider
    } else if !pattern.is_adjacent(px, pz) {
        TripleKind::Noncollider
    } else {
        TripleKind::Ambiguous
    }
}

/// Graph plus change bookkeeping for one orientation run.
pub(crate) struct Marker<'g> {
    pub(crate) graph: &'g mut Graph,
    changes: usize,
    log: Option<Vec<MarkChange>>,
    pub(crate) path_bound_reached: bool,
    pub(crate) triples: TripleClassification,
}

impl<'g> Marker<'g> {
    fn new(graph: &'g mut Graph, record: bool) -> Self {
        Self {
            graph,
            changes: 0,
            log: record.then(Vec::new),
            path_bound_reached: false,
            triples: TripleClassification::new(),
        }
    }

    /// Mark at `b` on the edge `a - b`.
    pub(crate) fn mark(&self, a: NodeId, b: NodeId) -> Option<Endpoint> {
        self.graph.endpoint(a, b)
    }

    /// Set the mark at `b` on the edge `a - b` if it is still a circle.
    pub(crate) fn set(&mut self, a: NodeId, b: NodeId, mark: Endpoint, rule: &'static str) -> bool {
        if mark == Endpoint::Circle || self.graph.endpoint(a, b) != Some(Endpoint::Circle) {
            return false;
        }
        if !self.graph.set_endpoint(a, b, mark) {
            return false;
        }
        self.changes += 1;
        tracing::trace!(
            rule,
            from = %self.graph.name(a),
            at = %self.graph.name(b),
            mark = %mark,
            "Oriented endpoint"
        );
        if let Some(log) = &mut self.log {
            log.push(MarkChange { from: a, at: b, old: Endpoint::Circle, new: mark, rule });
        }
        true
    }

    fn circle_marks(&self) -> usize {
        self.graph
            .edges()
            .map(|e| {
                usize::from(e.endpoint1 == Endpoint::Circle) + usize::from(e.endpoint2 == Endpoint::Circle)
            })
            .sum()
    }
}
