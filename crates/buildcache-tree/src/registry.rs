//! Coordinates batched mutation across a set of related [`HashTree`]s.

use crate::node::ResourceInput;
use crate::tree::HashTree;
use crate::Result;
use std::sync::{Arc, Mutex};

/// The three mutation kinds a registry can schedule.
enum PendingOp {
    Upsert {
        resources: Vec<ResourceInput>,
        index_timestamp: Option<i64>,
    },
    Update {
        resources: Vec<ResourceInput>,
        index_timestamp: Option<i64>,
    },
    Remove {
        paths: Vec<String>,
    },
}

/// Per-tree result of a [`TreeRegistry::flush`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeDelta {
    /// Paths newly inserted into this tree
    pub added: Vec<String>,
    /// Paths whose metadata changed in this tree
    pub updated: Vec<String>,
    /// Paths removed from this tree
    pub removed: Vec<String>,
    /// The tree's root hash after all pending operations were applied
    pub new_root_hash: String,
}

/// Holds a set of registered trees and a queue of scheduled mutations.
/// Without a registry, callers mutate a [`HashTree`] directly and changes
/// apply immediately; with one, mutations are deferred until [`Self::flush`]
/// so that a single caller action keeps every related tree coherent.
#[derive(Default)]
pub struct TreeRegistry {
    trees: Vec<Arc<Mutex<HashTree>>>,
    pending: Vec<PendingOp>,
}

impl TreeRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tree to receive future scheduled operations.
    pub fn register(&mut self, tree: Arc<Mutex<HashTree>>) {
        self.trees.push(tree);
    }

    /// Schedule an upsert, applied to every registered tree on flush.
    pub fn schedule_upsert(&mut self, resources: Vec<ResourceInput>, index_timestamp: Option<i64>) {
        self.pending.push(PendingOp::Upsert {
            resources,
            index_timestamp,
        });
    }

    /// Schedule an update-only mutation, applied to every registered tree on flush.
    pub fn schedule_update(&mut self, resources: Vec<ResourceInput>, index_timestamp: Option<i64>) {
        self.pending.push(PendingOp::Update {
            resources,
            index_timestamp,
        });
    }

    /// Schedule a removal, applied to every registered tree on flush.
    pub fn schedule_remove(&mut self, paths: Vec<String>) {
        self.pending.push(PendingOp::Remove { paths });
    }

    /// Drain the pending queue, applying every scheduled operation to every
    /// registered tree in the order it was scheduled, and return each
    /// tree's aggregated delta.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::Error`] from any tree mutation. On error, trees
    /// already processed in this flush retain their partial mutations.
    pub fn flush(&mut self) -> Result<Vec<TreeDelta>> {
        let ops = std::mem::take(&mut self.pending);
        let mut results = Vec::with_capacity(self.trees.len());

        for tree_handle in &self.trees {
            let mut tree = tree_handle.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let mut delta = TreeDelta::default();

            for op in &ops {
                match op {
                    PendingOp::Upsert {
                        resources,
                        index_timestamp,
                    } => {
                        let d = tree.upsert_resources(resources, *index_timestamp)?;
                        delta.added.extend(d.added);
                        delta.updated.extend(d.updated);
                    }
                    PendingOp::Update {
                        resources,
                        index_timestamp,
                    } => {
                        let d = tree.update_resources(resources, *index_timestamp)?;
                        delta.updated.extend(d.updated);
                    }
                    PendingOp::Remove { paths } => {
                        let d = tree.remove_resources(paths)?;
                        delta.removed.extend(d.removed);
                    }
                }
            }

            delta.new_root_hash = tree.root_hash();
            results.push(delta);
        }

        Ok(results)
    }

    /// Number of trees currently registered.
    #[must_use]
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ResourceMeta;

    fn input(path: &str, integrity: &str) -> ResourceInput {
        ResourceInput {
            path: path.to_string(),
            meta: ResourceMeta {
                integrity: integrity.to_string(),
                last_modified: None,
                size: None,
                inode: None,
            },
        }
    }

    #[test]
    fn flush_applies_to_every_registered_tree() {
        let mut registry = TreeRegistry::new();
        let t1 = Arc::new(Mutex::new(HashTree::empty()));
        let t2 = Arc::new(Mutex::new(HashTree::empty()));
        registry.register(Arc::clone(&t1));
        registry.register(Arc::clone(&t2));

        registry.schedule_upsert(vec![input("/a.js", "i1")], None);
        let deltas = registry.flush().unwrap();

        assert_eq!(deltas.len(), 2);
        for d in &deltas {
            assert_eq!(d.added, vec!["/a.js".to_string()]);
        }
        assert_eq!(t1.lock().unwrap().root_hash(), t2.lock().unwrap().root_hash());
    }

    #[test]
    fn flush_drains_the_queue() {
        let mut registry = TreeRegistry::new();
        registry.register(Arc::new(Mutex::new(HashTree::empty())));
        registry.schedule_upsert(vec![input("/a.js", "i1")], None);
        registry.flush().unwrap();
        let deltas = registry.flush().unwrap();
        assert!(deltas[0].added.is_empty());
    }
}
