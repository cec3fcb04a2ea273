//! Node types for the search graph.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A name that does not match any variant of a parsed enum.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseNameError {
    /// What was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

impl ParseNameError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self { kind, value: value.to_string() }
    }
}

/// Index of a node within one search run.
///
/// Node ids are dense (`0..n`) and follow the order of the variable list the
/// oracle exposes, which makes them usable as a canonical ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    /// Create a node id from a dense index.
    pub fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Get the dense index.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a variable is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    /// Observed variable; the only kind the search tests.
    Measured,
    /// Unobserved common cause.
    Latent,
    /// Error term of a structural equation.
    Error,
}

impl FromStr for NodeType {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "measured" => Ok(Self::Measured),
            "latent" => Ok(Self::Latent),
            "error" => Ok(Self::Error),
            _ => Err(ParseNameError::new("node type", s)),
        }
    }
}

impl Default for NodeType {
    fn default() -> Self {
        Self::Measured
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Measured => write!(f, "measured"),
            Self::Latent => write!(f, "latent"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Value domain of a variable, checked against what an oracle accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// Real-valued.
    Continuous,
    /// Categorical.
    Discrete,
}

impl Default for ValueKind {
    fn default() -> Self {
        Self::Continuous
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continuous => write!(f, "continuous"),
            Self::Discrete => write!(f, "discrete"),
        }
    }
}

/// A variable in the search.
///
/// Immutable once created; names are unique within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    /// Variable name.
    pub name: String,
    /// Measured, latent or error term.
    pub node_type: NodeType,
    /// Value domain.
    #[serde(default)]
    pub kind: ValueKind,
}

impl Node {
    /// Create a node.
    pub fn new(name: impl Into<String>, node_type: NodeType, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            node_type,
            kind,
        }
    }

    /// Create a measured continuous node.
    pub fn measured(name: impl Into<String>) -> Self {
        Self::new(name, NodeType::Measured, ValueKind::Continuous)
    }

    /// Create a latent node.
    pub fn latent(name: impl Into<String>) -> Self {
        Self::new(name, NodeType::Latent, ValueKind::Continuous)
    }

    /// Check if the node is observed.
    pub fn is_measured(&self) -> bool {
        self.node_type == NodeType::Measured
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
