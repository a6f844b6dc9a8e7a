//! A [`RequestGraph`] wrapper that tracks the node currently active for one
//! domain (project or dependency) of one task.

use crate::cache_object::RequestManagerCacheObject;
use crate::request::RequestSet;
use crate::request_graph::RequestGraph;
use crate::Result;
use buildcache_resource::Reader;
use std::collections::BTreeMap;

/// Wraps a [`RequestGraph`] and remembers which node the caller last
/// recorded, so its signature and index can be queried without re-supplying
/// the request set.
#[derive(Default)]
pub struct ResourceRequestManager {
    graph: RequestGraph,
    current_node: Option<u64>,
}

impl ResourceRequestManager {
    /// An empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request set, materializing or deriving its index, and make
    /// it the manager's current node. Returns the resulting signature.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::Error`] from index materialization.
    pub fn record_requests(
        &mut self,
        requests: RequestSet,
        reader: &dyn Reader,
        index_timestamp: i64,
    ) -> Result<String> {
        let id = self.graph.add_request_set(requests, reader, index_timestamp)?;
        self.current_node = Some(id);
        Ok(self
            .graph
            .node(id)
            .expect("just inserted")
            .index
            .get_signature())
    }

    /// Rebuild every node's index from scratch.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::Error`] from index materialization.
    pub fn refresh_indices(&mut self, reader: &dyn Reader, index_timestamp: i64) -> Result<()> {
        self.graph.refresh_indices(reader, index_timestamp)
    }

    /// Incrementally update nodes whose requests could cover a changed
    /// path, returning the changed paths observed on the current node (if
    /// any was touched).
    ///
    /// # Errors
    ///
    /// Propagates [`crate::Error`] from index materialization.
    pub fn update_indices(&mut self, reader: &dyn Reader, changed_paths: &[String]) -> Result<Vec<String>> {
        let by_node = self.graph.update_indices(reader, changed_paths)?;
        Ok(self
            .current_node
            .and_then(|id| by_node.get(&id).cloned())
            .unwrap_or_default())
    }

    /// The current node's signature, if one has been recorded.
    #[must_use]
    pub fn current_signature(&self) -> Option<String> {
        self.current_node
            .and_then(|id| self.graph.node(id))
            .map(|n| n.index.get_signature())
    }

    /// Signatures of every node in the graph — candidate cache keys.
    #[must_use]
    pub fn all_signatures(&self) -> Vec<String> {
        self.graph.all_signatures()
    }

    /// Speculative per-node index deltas given `changed_paths`, without
    /// mutating any node.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::Error`] from index derivation.
    pub fn index_deltas(
        &self,
        reader: &dyn Reader,
        changed_paths: &[String],
    ) -> Result<BTreeMap<String, (String, Vec<String>)>> {
        self.graph.compute_deltas(reader, changed_paths)
    }

    /// Direct access to the underlying graph, for serialization.
    #[must_use]
    pub fn graph(&self) -> &RequestGraph {
        &self.graph
    }

    /// Serialize the graph and the currently active node id.
    #[must_use]
    pub fn to_cache_object(&self) -> RequestManagerCacheObject {
        RequestManagerCacheObject {
            graph: self.graph.to_cache_object(),
            current_node: self.current_node,
        }
    }

    /// Restore a manager from its serializable form.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::Error`] from graph restoration.
    pub fn from_cache_object(cache: &RequestManagerCacheObject) -> Result<Self> {
        Ok(Self {
            graph: RequestGraph::from_cache_object(&cache.graph)?,
            current_node: cache.current_node,
        })
    }
}
