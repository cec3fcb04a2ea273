//! Core types for the search engine.

pub mod node;
pub mod edge;
pub mod graph;
pub mod sepset;
pub mod triple;
pub mod knowledge;

pub use node::{Node, NodeId, NodeType, ParseNameError, ValueKind};
pub use edge::{Edge, Endpoint};
pub use graph::{Graph, GraphError};
pub use sepset::SepsetMap;
pub use triple::{Triple, TripleKind, TripleClassification, NamedTriple, NodeTriples};
pub use knowledge::{Knowledge, KnowledgeError, ResolvedKnowledge};
