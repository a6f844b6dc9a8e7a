//! Error types for request-graph and task-cache operations

use miette::Diagnostic;
use thiserror::Error;

/// Error type for `buildcache-graph` operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A request carried a kind the graph does not recognize
    #[error("unknown request kind: {kind}")]
    #[diagnostic(code(buildcache::graph::unknown_kind))]
    UnknownRequestKind {
        /// The offending kind token
        kind: String,
    },

    /// A graph node was referenced but has no materialized index
    #[error("node {node_id} has no resource index")]
    #[diagnostic(code(buildcache::graph::missing_index))]
    MissingIndex {
        /// The node's id
        node_id: u64,
    },

    /// A referenced node does not exist in the graph
    #[error("node {node_id} not found in request graph")]
    #[diagnostic(code(buildcache::graph::missing_node))]
    MissingNode {
        /// The node's id
        node_id: u64,
    },

    /// Propagated from the underlying hash tree
    #[error(transparent)]
    #[diagnostic(transparent)]
    Tree(#[from] buildcache_tree::Error),

    /// Propagated from resource access during a read
    #[error(transparent)]
    #[diagnostic(transparent)]
    Resource(#[from] buildcache_resource::Error),
}

/// Result type for `buildcache-graph` operations
pub type Result<T> = std::result::Result<T, Error>;
