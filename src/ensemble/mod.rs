//! Bootstrap ensemble over resampled data.
//!
//! ## Procedure
//!
//! 1. Draw `num_resamples` row sets with replacement from one seeded RNG
//! 2. Run the caller's search on each resample, in parallel
//! 3. Drop resamples whose run failed; abort on run-invariant failures
//! 4. Reduce the surviving graphs per pair under the configured policy
//!
//! Runs are collected in resample order before the reduction, so the
//! aggregated graph depends only on the data, the seed and the policy.

pub mod aggregate;
pub mod resample;

pub use aggregate::{aggregate, EdgeFrequency, MarkCount};
pub use resample::{resample_plan, resample_size, Dataset};

use rayon::prelude::*;

use crate::config::EdgeEnsemble;
use crate::search::{CausalSearch, SearchError, SearchResult};
use crate::types::Graph;

/// Aggregated output of a bootstrap ensemble.
#[derive(Debug, Clone)]
pub struct EnsembleResult {
    /// Aggregated graph.
    pub graph: Graph,
    /// Outcome counts for every pair seen in some run.
    pub frequencies: Vec<EdgeFrequency>,
    /// Surviving runs, in resample order.
    pub runs: Vec<SearchResult>,
    /// Policy used for the reduction.
    pub policy: EdgeEnsemble,
    /// Resamples attempted.
    pub attempted: usize,
    /// Resamples dropped after a failed run.
    pub dropped: usize,
    /// One message per dropped resample.
    pub warnings: Vec<String>,
}

impl EnsembleResult {
    /// Fingerprint of the aggregated graph.
    pub fn fingerprint(&self) -> String {
        self.graph.fingerprint()
    }

    /// Frequency entry for a pair of named nodes, in either order.
    pub fn frequency(&self, a: &str, b: &str) -> Option<&EdgeFrequency> {
        self.frequencies
            .iter()
            .find(|f| (f.node1 == a && f.node2 == b) || (f.node1 == b && f.node2 == a))
    }
}

impl CausalSearch {
    /// Run `search` on resamples of `data` and aggregate the graphs.
    ///
    /// `search` turns one dataset into a result, typically by building an
    /// oracle over it and calling [`CausalSearch::search`]. With
    /// `num_resamples == 0` it runs once on `data` itself.
    pub fn bootstrap<D, F>(&self, data: &D, search: F) -> Result<EnsembleResult, SearchError>
    where
        D: Dataset,
        F: Fn(&CausalSearch, &D) -> Result<SearchResult, SearchError> + Send + Sync,
    {
        let config = self.config();
        let policy = config.edge_ensemble;
        let span = tracing::info_span!("bootstrap", resamples = config.num_resamples, %policy);
        let _guard = span.enter();

        if config.num_resamples == 0 {
            let result = search(self, data)?;
            let (graph, frequencies) = aggregate(std::slice::from_ref(&result.graph), policy)?;
            return Ok(EnsembleResult {
                graph,
                frequencies,
                runs: vec![result],
                policy,
                attempted: 1,
                dropped: 0,
                warnings: Vec::new(),
            });
        }

        let plan = resample_plan(
            data.sample_size(),
            config.resample_fraction,
            config.num_resamples,
            config.seed,
        );
        let token = self.cancellation_token();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallelism)
            .build()
            .map_err(|e| SearchError::Configuration(format!("cannot build worker pool: {e}")))?;

        // Outer Err aborts the ensemble; inner Err drops one resample.
        let outcomes = pool.install(|| {
            plan.par_iter()
                .enumerate()
                .map(|(index, rows)| {
                    let _guard = span.enter();
                    token.check()?;
                    let sample = data.resample(rows);
                    match search(self, &sample) {
                        Ok(result) => {
                            tracing::debug!(resample = index, edges = result.graph.num_edges(), "Resample complete");
                            Ok(Ok(result))
                        }
                        Err(e) if e.is_run_invariant() || e == SearchError::Cancelled => Err(e),
                        Err(e) => Ok(Err(e)),
                    }
                })
                .collect::<Result<Vec<_>, SearchError>>()
        })?;

        let attempted = outcomes.len();
        let mut runs = Vec::with_capacity(attempted);
        let mut warnings = Vec::new();
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(result) => runs.push(result),
                Err(e) => {
                    tracing::warn!(resample = index, error = %e, "Dropping resample");
                    warnings.push(format!("resample {index}: {e}"));
                }
            }
        }
        if runs.is_empty() {
            return Err(SearchError::AllResamplesFailed { attempted });
        }

        let graphs: Vec<Graph> = runs.iter().map(|r| r.graph.clone()).collect();
        let (graph, frequencies) = aggregate(&graphs, policy)?;

        tracing::info!(
            attempted,
            dropped = warnings.len(),
            edges = graph.num_edges(),
            "Bootstrap complete"
        );

        Ok(EnsembleResult {
            graph,
            frequencies,
            runs,
            policy,
            attempted,
            dropped: warnings.len(),
            warnings,
        })
    }
}
