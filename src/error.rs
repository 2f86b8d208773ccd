//! Error types for graph construction and identification queries
//!
//! Structural errors on the graph or query are raised immediately and are
//! caller bugs, never transient conditions. "Not identifiable" is *not* an
//! error: it is a normal, reportable outcome carried by
//! [`IdentificationOutcome`](crate::identify::IdentificationOutcome).

use thiserror::Error;

/// Errors raised while constructing or mutating a causal graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Referenced node does not exist in the graph
    #[error("node '{0}' not found in graph")]
    NodeNotFound(String),

    /// Node name registered twice
    #[error("node '{0}' already present in graph")]
    DuplicateNode(String),

    /// Directed edge would close a cycle in the directed projection
    #[error("adding edge {from} -> {to} would create a cycle")]
    CycleDetected { from: String, to: String },

    /// Bidirected edge with identical endpoints
    #[error("bidirected edge endpoints must differ, got '{0}' on both ends")]
    SelfConfounding(String),
}

/// Errors raised while validating or dispatching an identification query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentificationError {
    /// The graph is structurally unusable for this query
    #[error("invalid graph: {0}")]
    InvalidGraph(#[from] GraphError),

    /// The query itself is malformed
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A query shape none of the strategies cover
    #[error("unsupported query: {0}")]
    UnsupportedQuery(String),
}
