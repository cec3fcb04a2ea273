//! # pag-kernel
//!
//! Deterministic causal structure search producing partial ancestral graphs.
//!
//! The kernel answers one question:
//!
//! > Given an independence oracle over a set of variables, which causal
//! > structures (with possible latent confounders) are consistent with it?
//!
//! ## Core Contract
//!
//! 1. Prune a complete graph to a skeleton by conditional independence,
//!    recording the separating set of every removed edge
//! 2. Orient the skeleton into a PAG: colliders from the sepsets, then the
//!    orientation rules to a fixpoint, honoring background knowledge
//! 3. Optionally restrict the starting adjacencies with a greedy score search
//!    and/or aggregate the search over bootstrap resamples
//!
//! ## Architecture
//!
//! ```text
//! Oracle → CausalSearch ─→ adjacency search → possible-d-sep → FciOrient → SearchResult
//!               │                ↑
//!               └─ GreedySearch ─┘ (score-hybrid)
//!
//! Dataset → bootstrap → N × search → aggregate → EnsembleResult
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Same oracle + same knowledge + same config → identical graph fingerprint,
//!   whatever the thread count
//! - Tests at one depth run in parallel, removals are applied in pair order
//! - Bootstrap resamples come from one seeded generator, in resample order

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod oracle;
pub mod config;
pub mod search;
pub mod orient;
pub mod greedy;
pub mod ensemble;
pub mod compare;
pub mod canonical;

// Re-exports
pub use types::{
    Edge, Endpoint, Graph, GraphError, Knowledge, KnowledgeError, NamedTriple, Node, NodeId,
    NodeTriples, NodeType, ParseNameError, ResolvedKnowledge, SepsetMap, Triple,
    TripleClassification, TripleKind, ValueKind,
};
pub use oracle::{
    CachedTest, CacheStats, DSeparationTest, GraphScore, IndependenceTest, OracleError, Score,
    TestOutcome,
};
pub use config::{EdgeEnsemble, SearchConfig};
pub use search::{
    CancellationToken, CausalSearch, CompletenessCaveat, SearchError, SearchMetadata, SearchResult,
    SearchVariant,
};
pub use orient::{FciOrient, MarkChange, OrientOutcome};
pub use greedy::{dag_to_pattern, GreedyResult, GreedySearch, ScoredGraph};
pub use ensemble::{Dataset, EdgeFrequency, EnsembleResult, MarkCount};
pub use compare::GraphComparison;
pub use canonical::{to_canonical_bytes, canonical_hash, canonical_hash_hex};

/// Schema version for all result types.
/// Increment on breaking changes to any serialized type.
pub const PAG_KERNEL_SCHEMA_VERSION: &str = "1.0.0";

/// Default configuration version identifier.
pub const DEFAULT_CONFIG_VERSION: &str = "search_config_v1";
