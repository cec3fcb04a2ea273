//! Conditional independence and score oracles.
//!
//! The search never touches data directly. It asks an [`IndependenceTest`]
//! whether two variables are independent given a conditioning set, and the
//! hybrid front end asks a [`Score`] how much a parent improves a node's
//! local score. Both are indexed by [`NodeId`] positions in the oracle's own
//! variable list, which is also the node order of every graph the search
//! builds.
//!
//! Oracles are shared across worker threads and must be `Send + Sync`.

pub mod cache;
pub mod dsep;

pub use cache::{CachedTest, CacheStats};
pub use dsep::{DSeparationTest, GraphScore};

use serde::{Deserialize, Serialize};

use crate::types::{Node, NodeId, ValueKind};

/// Error type for oracle queries.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OracleError {
    /// The test could not decide, e.g. a singular covariance matrix.
    #[error("Inconclusive test: {0}")]
    Inconclusive(String),
    /// A node id is not one of the oracle's variables.
    #[error("Unknown variable: {0}")]
    UnknownVariable(NodeId),
    /// Any other failure inside the oracle.
    #[error("Oracle failure: {0}")]
    Failed(String),
}

/// Result of one independence test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Whether the variables are judged independent.
    pub independent: bool,
    /// Test statistic or p-value, if the oracle reports one.
    pub statistic: Option<f64>,
}

impl TestOutcome {
    /// Independence with no statistic.
    pub fn independent() -> Self {
        Self { independent: true, statistic: None }
    }

    /// Dependence with no statistic.
    pub fn dependent() -> Self {
        Self { independent: false, statistic: None }
    }
}

/// Conditional independence oracle.
pub trait IndependenceTest: Send + Sync {
    /// Variables the oracle answers for, in node id order.
    fn variables(&self) -> &[Node];

    /// Test `x _||_ y | z`.
    fn test(&self, x: NodeId, y: NodeId, z: &[NodeId]) -> Result<TestOutcome, OracleError>;

    /// Whether the oracle can handle variables of this kind.
    fn accepts(&self, _kind: ValueKind) -> bool {
        true
    }

    /// Short identifier for logs and metadata.
    fn name(&self) -> &str;
}

/// Decomposable score oracle.
pub trait Score: Send + Sync {
    /// Variables the oracle scores, in node id order.
    fn variables(&self) -> &[Node];

    /// Local score of `node` with the given parent set. Higher is better.
    fn local_score(&self, node: NodeId, parents: &[NodeId]) -> Result<f64, OracleError>;

    /// Change in the local score of `y` when `x` joins `parents`.
    fn local_score_diff(&self, x: NodeId, y: NodeId, parents: &[NodeId]) -> Result<f64, OracleError> {
        let mut with_x = parents.to_vec();
        with_x.push(x);
        Ok(self.local_score(y, &with_x)? - self.local_score(y, parents)?)
    }

    /// Whether the oracle can handle variables of this kind.
    fn accepts(&self, _kind: ValueKind) -> bool {
        true
    }

    /// Short identifier for logs and metadata.
    fn name(&self) -> &str;
}

impl<T: IndependenceTest + ?Sized> IndependenceTest for &T {
    fn variables(&self) -> &[Node] {
        (**self).variables()
    }

    fn test(&self, x: NodeId, y: NodeId, z: &[NodeId]) -> Result<TestOutcome, OracleError> {
        (**self).test(x, y, z)
    }

    fn accepts(&self, kind: ValueKind) -> bool {
        (**self).accepts(kind)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<S: Score + ?Sized> Score for &S {
    fn variables(&self) -> &[Node] {
        (**self).variables()
    }

    fn local_score(&self, node: NodeId, parents: &[NodeId]) -> Result<f64, OracleError> {
        (**self).local_score(node, parents)
    }

    fn local_score_diff(&self, x: NodeId, y: NodeId, parents: &[NodeId]) -> Result<f64, OracleError> {
        (**self).local_score_diff(x, y, parents)
    }

    fn accepts(&self, kind: ValueKind) -> bool {
        (**self).accepts(kind)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
