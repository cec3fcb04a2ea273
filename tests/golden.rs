//! Golden tests for the search pipeline.
//!
//! These tests verify determinism and correctness of the full search against
//! perfect d-separation oracles with known answers.

use std::collections::BTreeSet;

use pag_kernel::{
    CausalSearch, CompletenessCaveat, DSeparationTest, Graph, GraphComparison, GraphScore,
    IndependenceTest, Knowledge, Node, NodeId, OracleError, SearchConfig, SearchError,
    SearchVariant, TestOutcome, ValueKind,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// X1 -> X2 -> X3 <- X4 -> X5
fn chain_dag() -> Graph {
    let mut g = Graph::from_names(&["X1", "X2", "X3", "X4", "X5"]).unwrap();
    g.add_directed_by_name("X1", "X2").unwrap();
    g.add_directed_by_name("X2", "X3").unwrap();
    g.add_directed_by_name("X4", "X3").unwrap();
    g.add_directed_by_name("X4", "X5").unwrap();
    g
}

/// X1 -> X2 <- L -> X3 <- X4, with L latent.
fn confounded_dag() -> Graph {
    let nodes = vec![
        Node::measured("X1"),
        Node::measured("X2"),
        Node::measured("X3"),
        Node::measured("X4"),
        Node::latent("L"),
    ];
    let mut g = Graph::new(nodes).unwrap();
    g.add_directed_by_name("X1", "X2").unwrap();
    g.add_directed_by_name("L", "X2").unwrap();
    g.add_directed_by_name("L", "X3").unwrap();
    g.add_directed_by_name("X4", "X3").unwrap();
    g
}

/// X <- L1 -> A -> Y, Y <- L2 -> B -> X, A <- W -> B, with L1 and L2 latent.
///
/// X and Y are separated only by {A, B, W}; W is adjacent to neither.
fn hidden_sepset_dag() -> Graph {
    let nodes = vec![
        Node::measured("X"),
        Node::measured("A"),
        Node::measured("W"),
        Node::measured("B"),
        Node::measured("Y"),
        Node::latent("L1"),
        Node::latent("L2"),
    ];
    let mut g = Graph::new(nodes).unwrap();
    for (a, b) in [("L1", "X"), ("L1", "A"), ("A", "Y"), ("L2", "Y"), ("L2", "B"), ("B", "X"), ("W", "A"), ("W", "B")] {
        g.add_directed_by_name(a, b).unwrap();
    }
    g
}

fn chain_test() -> DSeparationTest {
    DSeparationTest::new(chain_dag()).unwrap()
}

/// Install a test subscriber; `RUST_LOG=pag_kernel=trace` shows every removal and rule.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn default_search() -> CausalSearch {
    CausalSearch::new(SearchConfig::default(), Knowledge::new()).unwrap()
}

fn hybrid_search() -> CausalSearch {
    let config = SearchConfig {
        use_score_hybrid_front_end: true,
        ..SearchConfig::default()
    };
    CausalSearch::new(config, Knowledge::new()).unwrap()
}

fn show(g: &Graph, a: &str, b: &str) -> Option<String> {
    g.edge_by_name(a, b).map(|e| g.edge_string(e))
}

/// Perfect oracle that cannot decide anything about one pair.
struct UndecidedPair {
    inner: DSeparationTest,
    pair: (usize, usize),
}

impl IndependenceTest for UndecidedPair {
    fn variables(&self) -> &[Node] {
        self.inner.variables()
    }

    fn test(&self, x: NodeId, y: NodeId, z: &[NodeId]) -> Result<TestOutcome, OracleError> {
        let (a, b) = self.pair;
        if (x.index(), y.index()) == (a, b) || (x.index(), y.index()) == (b, a) {
            return Err(OracleError::Inconclusive("singular covariance".to_string()));
        }
        self.inner.test(x, y, z)
    }

    fn name(&self) -> &str {
        "undecided-pair"
    }
}

/// Oracle that only handles discrete data.
struct DiscreteOnly(DSeparationTest);

impl IndependenceTest for DiscreteOnly {
    fn variables(&self) -> &[Node] {
        self.0.variables()
    }

    fn test(&self, x: NodeId, y: NodeId, z: &[NodeId]) -> Result<TestOutcome, OracleError> {
        self.0.test(x, y, z)
    }

    fn accepts(&self, kind: ValueKind) -> bool {
        kind == ValueKind::Discrete
    }

    fn name(&self) -> &str {
        "chi-square"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// End-to-End Scenarios
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_chain_pag() {
    init_tracing();
    let result = default_search().search(&chain_test()).unwrap();
    let g = &result.graph;

    assert_eq!(g.num_edges(), 4);
    assert_eq!(show(g, "X1", "X2").as_deref(), Some("X1 o-o X2"));
    assert_eq!(show(g, "X2", "X3").as_deref(), Some("X2 o-> X3"));
    assert_eq!(show(g, "X3", "X4").as_deref(), Some("X3 <-o X4"));
    assert_eq!(show(g, "X4", "X5").as_deref(), Some("X4 o-o X5"));

    let sepset = result.sepset("X2", "X4").unwrap();
    assert!(!sepset.contains("X3"));

    let report = result.triples_for("X3").unwrap();
    assert_eq!(report.colliders.len(), 1);
    assert_eq!(report.colliders[0].to_string(), "<X2, X3, X4>");
    assert!(result.triples_for("missing").is_none());
}

#[test]
fn test_latent_confounder_gives_bidirected_edge() {
    let test = DSeparationTest::new(confounded_dag()).unwrap();
    assert_eq!(test.variables().len(), 4);

    let result = default_search().search(&test).unwrap();
    let g = &result.graph;

    assert_eq!(g.num_edges(), 3);
    assert_eq!(show(g, "X1", "X2").as_deref(), Some("X1 o-> X2"));
    assert_eq!(show(g, "X2", "X3").as_deref(), Some("X2 <-> X3"));
    assert_eq!(show(g, "X3", "X4").as_deref(), Some("X3 <-o X4"));
}

#[test]
fn test_possible_dsep_removes_distant_separation() {
    init_tracing();
    let test = DSeparationTest::new(hidden_sepset_dag()).unwrap();
    let result = default_search().search(&test).unwrap();
    let g = &result.graph;

    assert!(g.edge_by_name("X", "Y").is_none());
    let expected: BTreeSet<String> = ["A", "B", "W"].iter().map(|s| s.to_string()).collect();
    assert_eq!(result.sepset("X", "Y"), Some(expected));

    assert_eq!(g.num_edges(), 6);
    assert_eq!(show(g, "X", "A").as_deref(), Some("X <-> A"));
    assert_eq!(show(g, "B", "Y").as_deref(), Some("B <-> Y"));
    assert_eq!(show(g, "A", "Y").as_deref(), Some("A --> Y"));
    assert_eq!(show(g, "X", "B").as_deref(), Some("X <-- B"));
}

#[test]
fn test_without_possible_dsep_edge_survives() {
    let test = DSeparationTest::new(hidden_sepset_dag()).unwrap();
    let config = SearchConfig {
        possible_dsep_done: false,
        ..SearchConfig::default()
    };
    let result = CausalSearch::new(config, Knowledge::new()).unwrap().search(&test).unwrap();

    assert!(result.graph.edge_by_name("X", "Y").is_some());
    assert!(result.sepset("X", "Y").is_none());
    assert_eq!(result.graph.num_edges(), 7);
}

#[test]
fn test_fast_variant_same_on_chain() {
    let full = default_search().search(&chain_test()).unwrap();
    let fast = CausalSearch::new(SearchConfig::fast(), Knowledge::new())
        .unwrap()
        .search(&chain_test())
        .unwrap();
    assert_eq!(full.fingerprint(), fast.fingerprint());
}

#[test]
fn test_skeleton_matches_dag() {
    let result = default_search().search(&chain_test()).unwrap();
    let cmp = GraphComparison::compare(&result.graph, &chain_dag()).unwrap();
    assert_eq!((cmp.adjacency_fp, cmp.adjacency_fn), (0, 0));
    assert_eq!(cmp.arrowhead_tp, 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Determinism
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_fingerprint_stable_across_runs() {
    let test = chain_test();
    let search = default_search();
    let first = search.search(&test).unwrap().fingerprint();

    for _ in 0..100 {
        assert_eq!(search.search(&test).unwrap().fingerprint(), first);
    }
}

#[test]
fn test_fingerprint_independent_of_parallelism() {
    let test = DSeparationTest::new(confounded_dag()).unwrap();
    let fingerprints: Vec<String> = [1, 2, 4, 8]
        .iter()
        .map(|&parallelism| {
            let config = SearchConfig {
                parallelism,
                ..SearchConfig::default()
            };
            CausalSearch::new(config, Knowledge::new())
                .unwrap()
                .search(&test)
                .unwrap()
                .fingerprint()
        })
        .collect();
    assert!(fingerprints.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn test_run_ids_differ() {
    let search = default_search();
    let a = search.search(&chain_test()).unwrap();
    let b = search.search(&chain_test()).unwrap();
    assert_ne!(a.metadata.run_id, b.metadata.run_id);
    assert_eq!(a.metadata.params_hash, b.metadata.params_hash);
}

// ─────────────────────────────────────────────────────────────────────────────
// Knowledge
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_knowledge_enforced() {
    let knowledge = Knowledge::new().require("X1", "X2").forbid_pair("X4", "X5");
    let search = CausalSearch::new(SearchConfig::default(), knowledge).unwrap();
    let result = search.search(&chain_test()).unwrap();
    let g = &result.graph;

    assert_eq!(show(g, "X1", "X2").as_deref(), Some("X1 --> X2"));
    assert!(g.edge_by_name("X4", "X5").is_none());
}

#[test]
fn test_tiers_orient_forward() {
    let knowledge = Knowledge::new()
        .with_tiers(vec![vec!["X1"], vec!["X2", "X4"], vec!["X3", "X5"]])
        .with_tier_layout(true);
    let search = CausalSearch::new(SearchConfig::default(), knowledge).unwrap();
    let result = search.search(&chain_test()).unwrap();
    let g = &result.graph;

    assert_eq!(show(g, "X1", "X2").as_deref(), Some("X1 --> X2"));
    assert_eq!(show(g, "X4", "X5").as_deref(), Some("X4 --> X5"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Bounds and Caveats
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_depth_zero_marginal_only() {
    let config = SearchConfig {
        depth: 0,
        ..SearchConfig::default()
    };
    let search = CausalSearch::new(config, Knowledge::new()).unwrap();
    let result = search.search(&chain_test()).unwrap();
    let g = &result.graph;

    for (a, b) in [("X1", "X4"), ("X1", "X5"), ("X2", "X4"), ("X2", "X5")] {
        assert!(g.edge_by_name(a, b).is_none(), "{a} - {b} should be removed");
        assert_eq!(result.sepset(a, b).map(|s| s.len()), Some(0));
    }
    assert!(g.edge_by_name("X1", "X3").is_some());
    assert_eq!(g.num_edges(), 6);
    assert!(result
        .metadata
        .caveats
        .contains(&CompletenessCaveat::DepthBoundReached { depth: 0 }));
}

// ─────────────────────────────────────────────────────────────────────────────
// Score-Hybrid Variant
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_hybrid_matches_constraint_on_chain() {
    let test = chain_test();
    let score = GraphScore::new(chain_dag()).unwrap();
    let hybrid = hybrid_search().search_hybrid(&test, &score).unwrap();
    let constraint = default_search().search(&test).unwrap();

    assert_eq!(hybrid.metadata.variant, SearchVariant::ScoreHybrid);
    assert_eq!(hybrid.candidates.len(), 1);
    assert_eq!(hybrid.fingerprint(), constraint.fingerprint());
    assert!(hybrid.metadata.tests_performed < constraint.metadata.tests_performed);
}

#[test]
fn test_hybrid_rejects_mismatched_score() {
    let score = GraphScore::new(Graph::from_names(&["A", "B"]).unwrap()).unwrap();
    let err = hybrid_search().search_hybrid(&chain_test(), &score).unwrap_err();
    assert!(matches!(err, SearchError::Configuration(_)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Oracle Failures
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_inconclusive_fails_by_default() {
    let test = UndecidedPair { inner: chain_test(), pair: (1, 3) };
    let err = default_search().search(&test).unwrap_err();
    match err {
        SearchError::OracleFailure { reason, .. } => assert!(reason.contains("singular")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_lenient_mode_recorded() {
    init_tracing();
    let test = UndecidedPair { inner: chain_test(), pair: (1, 3) };
    let config = SearchConfig {
        treat_inconclusive_as_independent: true,
        ..SearchConfig::default()
    };
    let result = CausalSearch::new(config, Knowledge::new()).unwrap().search(&test).unwrap();

    assert!(result.metadata.lenient_oracle);
    assert!(result.metadata.inconclusive_tests >= 1);
    assert_eq!(result.fingerprint(), default_search().search(&chain_test()).unwrap().fingerprint());
}

#[test]
fn test_data_type_mismatch() {
    let err = default_search().search(&DiscreteOnly(chain_test())).unwrap_err();
    assert_eq!(
        err,
        SearchError::DataTypeMismatch {
            variable: "X1".to_string(),
            kind: ValueKind::Continuous,
            oracle: "chi-square".to_string(),
        }
    );
    assert!(err.is_run_invariant());
}
