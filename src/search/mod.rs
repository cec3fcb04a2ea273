//! Search entry points.
//!
//! [`CausalSearch`] owns a validated [`SearchConfig`] and the background
//! [`Knowledge`], and exposes one entry point per mode:
//!
//! - [`CausalSearch::search`]: constraint-only search from the complete graph
//! - [`CausalSearch::search_from`]: constraint-only search restricted to an
//!   initial graph's adjacencies
//! - [`CausalSearch::search_hybrid`]: greedy score search first, then the
//!   constraint phases over the candidate pattern's adjacencies
//! - [`CausalSearch::bootstrap`]: any of the above over resampled data
//!
//! ## Pipeline
//!
//! ```text
//! starting graph → adjacency search → possible-d-sep (optional) → orientation
//!                        ↓                      ↓                      ↓
//!                     sepsets   ───────→    sepsets    ───────→    PAG + triples
//! ```
//!
//! Every run gets its own run id and tracing span, and its own worker pool
//! of `parallelism` threads unless it is already running on one.

mod adjacency;
mod possible_dsep;
mod runner;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::config::SearchConfig;
use crate::greedy::{GreedySearch, ScoredGraph};
use crate::oracle::{CachedTest, IndependenceTest, Score};
use crate::orient::FciOrient;
use crate::types::{
    Edge, Endpoint, Graph, GraphError, Knowledge, KnowledgeError, NodeTriples, ResolvedKnowledge,
    SepsetMap, TripleClassification, ValueKind,
};
use crate::PAG_KERNEL_SCHEMA_VERSION;
use runner::TestRunner;

/// Error type for search runs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SearchError {
    /// Invalid options, inconsistent knowledge or mismatched inputs.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The oracle cannot handle a variable's value kind.
    #[error("Oracle {oracle} cannot handle {kind} variable {variable}")]
    DataTypeMismatch {
        /// Offending variable.
        variable: String,
        /// Its value kind.
        kind: ValueKind,
        /// Oracle name.
        oracle: String,
    },

    /// An independence test or score evaluation failed.
    #[error("Oracle failed on {x} vs {y} given {conditioning:?}: {reason}")]
    OracleFailure {
        /// First variable.
        x: String,
        /// Second variable.
        y: String,
        /// Conditioning set.
        conditioning: Vec<String>,
        /// Error reported by the oracle.
        reason: String,
    },

    /// The run was cancelled through its token.
    #[error("Search cancelled")]
    Cancelled,

    /// Every bootstrap resample failed.
    #[error("All {attempted} resamples failed")]
    AllResamplesFailed {
        /// Number of resamples attempted.
        attempted: usize,
    },
}

impl SearchError {
    /// Whether the failure would repeat on every resample of the same data.
    pub fn is_run_invariant(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::DataTypeMismatch { .. })
    }
}

impl From<KnowledgeError> for SearchError {
    fn from(e: KnowledgeError) -> Self {
        Self::Configuration(e.to_string())
    }
}

impl From<GraphError> for SearchError {
    fn from(e: GraphError) -> Self {
        Self::Configuration(e.to_string())
    }
}

/// Shared cancellation flag.
///
/// Checked at depth, pass and resample boundaries; a running test is never
/// interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of every run sharing this token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<(), SearchError> {
        if self.is_cancelled() {
            Err(SearchError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A bound cut the search short of full completeness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompletenessCaveat {
    /// Some edge could still be tested at a depth past the bound.
    DepthBoundReached {
        /// The configured depth bound.
        depth: usize,
    },
    /// Some path longer than the bound was not followed.
    PathLengthBoundReached {
        /// The configured path length bound.
        max_path_length: usize,
    },
}

/// Which pipeline produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchVariant {
    /// Constraint phases only.
    Constraint,
    /// Greedy score search followed by the constraint phases.
    ScoreHybrid,
}

impl std::fmt::Display for SearchVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Constraint => write!(f, "constraint"),
            Self::ScoreHybrid => write!(f, "score_hybrid"),
        }
    }
}

/// Provenance of one search run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMetadata {
    /// Unique id of the run.
    pub run_id: Uuid,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Pipeline used.
    pub variant: SearchVariant,
    /// Hash of the result-affecting configuration.
    pub params_hash: String,
    /// Schema version of the result types.
    pub schema_version: String,
    /// Name of the independence oracle.
    pub oracle: String,
    /// Inconclusive tests were treated as independence.
    pub lenient_oracle: bool,
    /// Inconclusive tests downgraded to independence.
    pub inconclusive_tests: u64,
    /// Independence tests requested by the search.
    pub tests_performed: u64,
    /// Tests answered from the outcome cache.
    pub test_cache_hits: u64,
    /// Bounds that cut the search short.
    pub caveats: Vec<CompletenessCaveat>,
    /// Orientation rule passes.
    pub orientation_passes: usize,
    /// Wall-clock duration in milliseconds.
    pub elapsed_ms: u64,
}

/// Output of one search run.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// The partial ancestral graph.
    pub graph: Graph,
    /// Separating sets of every removed edge.
    pub sepsets: SepsetMap,
    /// Classification of the unshielded triples.
    pub triples: TripleClassification,
    /// Best graphs of the greedy front end (hybrid runs only).
    pub candidates: Vec<ScoredGraph>,
    /// Run provenance.
    pub metadata: SearchMetadata,
}

impl SearchResult {
    /// Fingerprint of the output graph.
    pub fn fingerprint(&self) -> String {
        self.graph.fingerprint()
    }

    /// Triple report for the node named `name`.
    pub fn triples_for(&self, name: &str) -> Option<NodeTriples> {
        self.graph
            .node_id(name)
            .map(|id| self.triples.report_for(&self.graph, id))
    }

    /// Separating set of two named nodes, if their edge was removed.
    pub fn sepset(&self, a: &str, b: &str) -> Option<BTreeSet<String>> {
        let (a, b) = (self.graph.node_id(a)?, self.graph.node_id(b)?);
        self.sepsets
            .get(a, b)
            .map(|set| set.iter().map(|&z| self.graph.name(z).to_string()).collect())
    }

    /// All separating sets keyed by node names.
    pub fn named_sepsets(&self) -> BTreeMap<(String, String), BTreeSet<String>> {
        self.sepsets
            .iter()
            .map(|(&(x, y), set)| {
                let key = (self.graph.name(x).to_string(), self.graph.name(y).to_string());
                let names = set.iter().map(|&z| self.graph.name(z).to_string()).collect();
                (key, names)
            })
            .collect()
    }
}

/// Causal structure search over one configuration and knowledge.
#[derive(Debug, Clone)]
pub struct CausalSearch {
    config: SearchConfig,
    knowledge: Knowledge,
    cancel: CancellationToken,
}

impl CausalSearch {
    /// Create a search after validating the configuration and knowledge.
    pub fn new(config: SearchConfig, knowledge: Knowledge) -> Result<Self, SearchError> {
        config.validate()?;
        knowledge.validate()?;
        Ok(Self {
            config,
            knowledge,
            cancel: CancellationToken::new(),
        })
    }

    /// Share an external cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The configuration.
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// The background knowledge.
    pub fn knowledge(&self) -> &Knowledge {
        &self.knowledge
    }

    /// The cancellation token checked by every run.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Constraint-only search starting from the complete graph.
    pub fn search<T: IndependenceTest + ?Sized>(&self, test: &T) -> Result<SearchResult, SearchError> {
        self.check_mode(SearchVariant::Constraint)?;
        let test: &dyn IndependenceTest = &test;
        self.run(test, None, None)
    }

    /// Constraint-only search restricted to the adjacencies of `initial`.
    ///
    /// Nodes of `initial` are matched to the oracle's variables by name.
    pub fn search_from<T: IndependenceTest + ?Sized>(
        &self,
        test: &T,
        initial: &Graph,
    ) -> Result<SearchResult, SearchError> {
        self.check_mode(SearchVariant::Constraint)?;
        let test: &dyn IndependenceTest = &test;
        self.run(test, None, Some(initial))
    }

    /// Greedy score search, then the constraint phases over its pattern.
    ///
    /// Requires `use_score_hybrid_front_end`. The score must cover the same
    /// variables as the test, in the same order.
    pub fn search_hybrid<T, S>(&self, test: &T, score: &S) -> Result<SearchResult, SearchError>
    where
        T: IndependenceTest + ?Sized,
        S: Score + ?Sized,
    {
        self.check_mode(SearchVariant::ScoreHybrid)?;
        let test: &dyn IndependenceTest = &test;
        let score: &dyn Score = &score;
        self.run(test, Some(score), None)
    }

    /// The configured front end must match the entry point.
    fn check_mode(&self, variant: SearchVariant) -> Result<(), SearchError> {
        match (self.config.use_score_hybrid_front_end, variant) {
            (true, SearchVariant::Constraint) => Err(SearchError::Configuration(
                "use_score_hybrid_front_end requires a score; call search_hybrid".to_string(),
            )),
            (false, SearchVariant::ScoreHybrid) => Err(SearchError::Configuration(
                "search_hybrid requires use_score_hybrid_front_end".to_string(),
            )),
            _ => Ok(()),
        }
    }

    fn run(
        &self,
        test: &dyn IndependenceTest,
        score: Option<&dyn Score>,
        initial: Option<&Graph>,
    ) -> Result<SearchResult, SearchError> {
        let variant = if score.is_some() {
            SearchVariant::ScoreHybrid
        } else {
            SearchVariant::Constraint
        };
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("causal_search", %run_id, %variant);

        // Nested runs (bootstrap resamples) share the caller's pool.
        if rayon::current_thread_index().is_some() {
            let _guard = span.enter();
            return self.execute(run_id, variant, test, score, initial);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.parallelism)
            .build()
            .map_err(|e| SearchError::Configuration(format!("cannot build worker pool: {e}")))?;
        pool.install(|| {
            let _guard = span.enter();
            self.execute(run_id, variant, test, score, initial)
        })
    }

    fn execute(
        &self,
        run_id: Uuid,
        variant: SearchVariant,
        test: &dyn IndependenceTest,
        score: Option<&dyn Score>,
        initial: Option<&Graph>,
    ) -> Result<SearchResult, SearchError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        self.cancel.check()?;

        check_kinds(test.variables(), test.name(), |kind| test.accepts(kind))?;
        if let Some(score) = score {
            check_kinds(score.variables(), score.name(), |kind| score.accepts(kind))?;
            let same = score.variables().len() == test.variables().len()
                && score
                    .variables()
                    .iter()
                    .zip(test.variables())
                    .all(|(a, b)| a.name == b.name);
            if !same {
                return Err(SearchError::Configuration(
                    "score and test must cover the same variables in the same order".to_string(),
                ));
            }
        }

        let nodes = Graph::new(test.variables().to_vec())?;
        let knowledge = self.knowledge.resolve(&nodes)?;

        tracing::info!(
            nodes = nodes.num_nodes(),
            oracle = test.name(),
            knowledge = ?knowledge.summary(),
            "Starting search"
        );

        let cached = CachedTest::new(test, self.config.test_cache_entries);
        let runner = TestRunner::new(
            &cached,
            self.config.treat_inconclusive_as_independent,
            &self.cancel,
        );

        let (start, greedy) = match score {
            Some(score) => {
                let result = GreedySearch::new(score, &knowledge)
                    .threshold(self.config.score_improvement_threshold)
                    .num_patterns_to_store(self.config.num_patterns_to_store)
                    .with_cancellation(&self.cancel)
                    .search(&nodes)?;
                let start = starting_graph(&nodes, Some(&result.pattern), &knowledge)?;
                (start, Some(result))
            }
            None => (starting_graph(&nodes, initial, &knowledge)?, None),
        };

        let depth_limit = self.config.depth_limit();
        let path_limit = self.config.path_limit();

        let adjacency::Skeleton {
            mut graph,
            mut sepsets,
            depth_bound_reached,
        } = adjacency::search(start, &knowledge, &runner, depth_limit)?;

        let mut path_bound_reached = false;
        if self.config.possible_dsep_done {
            let outcome = possible_dsep::prune(
                &mut graph,
                &mut sepsets,
                &knowledge,
                &runner,
                depth_limit,
                path_limit,
            )?;
            path_bound_reached |= outcome.path_bound_reached;
        }

        graph.reorient_all(Endpoint::Circle);
        let mut orient = FciOrient::new(&sepsets, &knowledge)
            .complete_rule_set(self.config.complete_rule_set_used)
            .max_path_length(path_limit)
            .with_cancellation(&self.cancel);
        if let Some(result) = &greedy {
            orient = orient.with_pattern(&result.pattern);
        }
        let outcome = orient.orient(&mut graph)?;
        path_bound_reached |= outcome.path_bound_reached;

        let mut caveats = Vec::new();
        if let (true, Some(depth)) = (depth_bound_reached, depth_limit) {
            caveats.push(CompletenessCaveat::DepthBoundReached { depth });
        }
        if let (true, Some(max_path_length)) = (path_bound_reached, path_limit) {
            caveats.push(CompletenessCaveat::PathLengthBoundReached { max_path_length });
        }

        let elapsed_ms = clock.elapsed().as_millis() as u64;
        tracing::info!(
            edges = graph.num_edges(),
            tests = runner.tests_performed(),
            passes = outcome.passes,
            caveats = caveats.len(),
            elapsed_ms,
            "Search complete"
        );

        let metadata = SearchMetadata {
            run_id,
            started_at,
            variant,
            params_hash: self.config.params_hash(),
            schema_version: PAG_KERNEL_SCHEMA_VERSION.to_string(),
            oracle: test.name().to_string(),
            lenient_oracle: self.config.treat_inconclusive_as_independent,
            inconclusive_tests: runner.inconclusive(),
            tests_performed: runner.tests_performed(),
            test_cache_hits: cached.cache_stats().map(|s| s.hits).unwrap_or(0),
            caveats,
            orientation_passes: outcome.passes,
            elapsed_ms,
        };

        Ok(SearchResult {
            graph,
            sepsets,
            triples: outcome.triples,
            candidates: greedy.map(|g| g.top_graphs).unwrap_or_default(),
            metadata,
        })
    }
}

fn check_kinds(
    variables: &[crate::types::Node],
    oracle: &str,
    accepts: impl Fn(ValueKind) -> bool,
) -> Result<(), SearchError> {
    match variables.iter().find(|node| !accepts(node.kind)) {
        Some(node) => Err(SearchError::DataTypeMismatch {
            variable: node.name.clone(),
            kind: node.kind,
            oracle: oracle.to_string(),
        }),
        None => Ok(()),
    }
}

/// o-o graph the adjacency search starts from.
///
/// Complete when `initial` is `None`, otherwise `initial`'s adjacencies
/// matched by name. Pairs forbidden both ways are dropped and required pairs
/// are added.
fn starting_graph(
    nodes: &Graph,
    initial: Option<&Graph>,
    knowledge: &ResolvedKnowledge,
) -> Result<Graph, SearchError> {
    let mut graph = match initial {
        None => Graph::complete(nodes.nodes().to_vec())?,
        Some(initial) => {
            let mut graph = nodes.empty_like();
            for edge in initial.edges() {
                let a = nodes.require_id(initial.name(edge.node1))?;
                let b = nodes.require_id(initial.name(edge.node2))?;
                graph.add_edge(Edge::nondirected(a, b))?;
            }
            graph
        }
    };

    let forbidden: Vec<_> = graph
        .edges()
        .map(|e| e.pair())
        .filter(|&(a, b)| knowledge.is_pair_forbidden(a, b))
        .collect();
    for (a, b) in forbidden {
        graph.remove_edge(a, b);
    }
    for (from, to) in knowledge.required_edges() {
        graph.add_edge(Edge::nondirected(from, to))?;
    }
    Ok(graph)
}
