//! Serializable form of a [`crate::RequestGraph`] / [`crate::BuildTaskCache`].
//!
//! Each node's index is serialized as a full [`buildcache_tree::CacheObject`]
//! rather than a delta relative to its parent. `HashTree`'s cache format
//! already flattens to a full resource list and rebuilds on restore (see
//! `buildcache_tree::tree::HashTree::from_cache_object`), so this is
//! correct; it trades the storage savings of a delta-only encoding for a
//! simpler restore path with no parent-chain replay.

use crate::request::RequestSet;
use buildcache_tree::CacheObject;
use serde::{Deserialize, Serialize};

/// Serializable form of one [`crate::RequestGraphNode`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeCacheObject {
    /// This node's id.
    pub id: u64,
    /// The parent this node derived from, if any.
    pub parent_id: Option<u64>,
    /// Requests newly added at this node.
    pub added_requests: RequestSet,
    /// This node's full resource index, in tree-layer cache form.
    pub index: CacheObject,
}

/// Serializable form of a [`crate::RequestGraph`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestGraphCacheObject {
    /// Every node in the graph, in no particular order.
    pub nodes: Vec<NodeCacheObject>,
}

/// Serializable form of a [`crate::ResourceRequestManager`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestManagerCacheObject {
    /// The underlying graph.
    pub graph: RequestGraphCacheObject,
    /// The node last recorded as current, if any.
    pub current_node: Option<u64>,
}

/// Serializable form of a [`crate::BuildTaskCache`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskCacheObject {
    /// The task's project-domain request manager.
    pub project: RequestManagerCacheObject,
    /// The task's dependency-domain request manager.
    pub dependency: RequestManagerCacheObject,
    /// Whether this task opted into differential builds.
    pub supports_differential_builds: bool,
}
