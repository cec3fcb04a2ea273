//! Search configuration.
//!
//! ## Float Normalization for Deterministic Hashing
//!
//! Floats are quantized to integers before hashing so `params_hash` does not
//! depend on float formatting. The quantization factor is 1e6 (multiply by
//! 1,000,000 and round to i64).

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::canonical::canonical_hash_hex;
use crate::search::SearchError;
use crate::types::ParseNameError;
use crate::DEFAULT_CONFIG_VERSION;

/// Quantization factor for float normalization.
const FLOAT_QUANTIZATION_FACTOR: f64 = 1_000_000.0;

/// How per-pair results of bootstrap runs are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeEnsemble {
    /// Keep an edge only if every run produced it with the same marks.
    Preserved,
    /// Keep the most frequent outcome per pair, absence included.
    Highest,
    /// Keep an edge present in a strict majority of runs.
    Majority,
}

impl FromStr for EdgeEnsemble {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "preserved" => Ok(Self::Preserved),
            "highest" => Ok(Self::Highest),
            "majority" => Ok(Self::Majority),
            _ => Err(ParseNameError::new("edge ensemble", s)),
        }
    }
}

impl Default for EdgeEnsemble {
    fn default() -> Self {
        Self::Highest
    }
}

impl std::fmt::Display for EdgeEnsemble {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Preserved => write!(f, "preserved"),
            Self::Highest => write!(f, "highest"),
            Self::Majority => write!(f, "majority"),
        }
    }
}

/// Quantize a float to an i64 for deterministic hashing.
fn quantize_float(value: f64) -> i64 {
    (value * FLOAT_QUANTIZATION_FACTOR).round() as i64
}

/// Quantized parameters for deterministic hashing.
#[derive(Debug, Clone, Serialize)]
struct QuantizedSearchParams {
    version: String,
    depth: i32,
    max_path_length: i32,
    complete_rule_set_used: bool,
    possible_dsep_done: bool,
    use_score_hybrid_front_end: bool,
    num_resamples: usize,
    resample_fraction: i64,
    edge_ensemble: EdgeEnsemble,
    treat_inconclusive_as_independent: bool,
    seed: u64,
    num_patterns_to_store: usize,
    score_improvement_threshold: i64,
}

/// Options recognized by every search entry point.
///
/// ## Parameters
///
/// - `depth`: largest conditioning set size in the adjacency search (-1 = unbounded)
/// - `max_path_length`: longest path examined by path-based rules and possible-d-sep (-1 = unbounded)
/// - `complete_rule_set_used`: apply the complete orientation rule set
/// - `possible_dsep_done`: run the possible-d-sep pruning pass
/// - `use_score_hybrid_front_end`: restrict adjacencies with a greedy score search first;
///   selects `search_hybrid`, and the constraint-only entry points refuse it
/// - `num_resamples`: bootstrap resamples (0 disables bootstrap)
/// - `resample_fraction`: resample size as a fraction of the data
/// - `edge_ensemble`: how bootstrap results are combined
/// - `parallelism`: worker threads
///
/// Parallelism does not change results, so it is excluded from `params_hash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Configuration version identifier.
    pub version: String,
    /// Largest conditioning set size (-1 = unbounded).
    pub depth: i32,
    /// Longest path examined by path-based rules (-1 = unbounded).
    pub max_path_length: i32,
    /// Apply the complete orientation rule set.
    pub complete_rule_set_used: bool,
    /// Run the possible-d-sep pruning pass.
    pub possible_dsep_done: bool,
    /// Restrict starting adjacencies with a greedy score search (`search_hybrid` only).
    pub use_score_hybrid_front_end: bool,
    /// Number of bootstrap resamples (0 disables bootstrap).
    pub num_resamples: usize,
    /// Resample size as a fraction of the sample size, in (0, 1].
    pub resample_fraction: f64,
    /// Bootstrap aggregation policy.
    pub edge_ensemble: EdgeEnsemble,
    /// Worker threads (at least 1).
    pub parallelism: usize,
    /// Treat inconclusive tests as independence instead of failing.
    pub treat_inconclusive_as_independent: bool,
    /// Seed for bootstrap resampling.
    pub seed: u64,
    /// Capacity of the test outcome cache (0 disables it).
    pub test_cache_entries: usize,
    /// Best-scoring graphs retained by the greedy search.
    pub num_patterns_to_store: usize,
    /// Minimum score gain for a greedy move to count as an improvement.
    pub score_improvement_threshold: f64,
}

impl SearchConfig {
    /// Configuration for the faster approximate variant.
    ///
    /// Skips possible-d-sep and uses only the basic orientation rules.
    pub fn fast() -> Self {
        Self {
            complete_rule_set_used: false,
            possible_dsep_done: false,
            ..Self::default()
        }
    }

    /// Parse a configuration document and validate it.
    pub fn from_json(json: &str) -> Result<Self, SearchError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SearchError::Configuration(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every option is within range.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.depth < -1 {
            return Err(SearchError::Configuration(format!(
                "depth must be >= -1, got {}",
                self.depth
            )));
        }
        if self.max_path_length < -1 {
            return Err(SearchError::Configuration(format!(
                "max_path_length must be >= -1, got {}",
                self.max_path_length
            )));
        }
        if !(self.resample_fraction > 0.0 && self.resample_fraction <= 1.0) {
            return Err(SearchError::Configuration(format!(
                "resample_fraction must be in (0, 1], got {}",
                self.resample_fraction
            )));
        }
        if self.parallelism == 0 {
            return Err(SearchError::Configuration("parallelism must be >= 1".to_string()));
        }
        if !self.score_improvement_threshold.is_finite() || self.score_improvement_threshold < 0.0 {
            return Err(SearchError::Configuration(format!(
                "score_improvement_threshold must be finite and >= 0, got {}",
                self.score_improvement_threshold
            )));
        }
        Ok(())
    }

    /// Depth bound, `None` when unbounded.
    pub fn depth_limit(&self) -> Option<usize> {
        usize::try_from(self.depth).ok()
    }

    /// Path length bound, `None` when unbounded.
    pub fn path_limit(&self) -> Option<usize> {
        usize::try_from(self.max_path_length).ok()
    }

    /// Compute a hash of the result-affecting parameters.
    pub fn params_hash(&self) -> String {
        canonical_hash_hex(&self.to_quantized())
    }

    fn to_quantized(&self) -> QuantizedSearchParams {
        QuantizedSearchParams {
            version: self.version.clone(),
            depth: self.depth,
            max_path_length: self.max_path_length,
            complete_rule_set_used: self.complete_rule_set_used,
            possible_dsep_done: self.possible_dsep_done,
            use_score_hybrid_front_end: self.use_score_hybrid_front_end,
            num_resamples: self.num_resamples,
            resample_fraction: quantize_float(self.resample_fraction),
            edge_ensemble: self.edge_ensemble,
            treat_inconclusive_as_independent: self.treat_inconclusive_as_independent,
            seed: self.seed,
            num_patterns_to_store: self.num_patterns_to_store,
            score_improvement_threshold: quantize_float(self.score_improvement_threshold),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_CONFIG_VERSION.to_string(),
            depth: -1,
            max_path_length: -1,
            complete_rule_set_used: true,
            possible_dsep_done: true,
            use_score_hybrid_front_end: false,
            num_resamples: 0,
            resample_fraction: 1.0,
            edge_ensemble: EdgeEnsemble::Highest,
            parallelism: 1,
            treat_inconclusive_as_independent: false,
            seed: 0,
            test_cache_entries: 10_000,
            num_patterns_to_store: 1,
            score_improvement_threshold: 0.0,
        }
    }
}
