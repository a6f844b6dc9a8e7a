//! [`ResourceIndex`]: a [`HashTree`] plus the timestamp used to disambiguate
//! race-windowed metadata comparisons.

use crate::cache_object::CacheObject;
use crate::node::ResourceInput;
use crate::tree::{HashTree, RemoveDelta, UpsertDelta};
use crate::Result;
use std::collections::BTreeSet;

/// Thin wrapper translating between a resource list and a [`HashTree`].
#[derive(Debug, Clone)]
pub struct ResourceIndex {
    tree: HashTree,
    index_timestamp: i64,
}

impl ResourceIndex {
    /// Build a fresh index from a resource set, stamped with `index_timestamp`.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::Error`] from the underlying [`HashTree::build`].
    pub fn create(resources: &[ResourceInput], index_timestamp: i64) -> Result<Self> {
        Ok(Self {
            tree: HashTree::build(resources)?,
            index_timestamp,
        })
    }

    /// Restore an index verbatim from its serializable form.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::Error`] from the underlying restore.
    pub fn from_cache(cache: &CacheObject) -> Result<Self> {
        Ok(Self {
            tree: HashTree::from_cache_object(cache)?,
            index_timestamp: cache.index_timestamp,
        })
    }

    /// Restore from cache, then reconcile against `current`: compute
    /// `removed = cachedPaths \ currentPaths`, remove those, then upsert
    /// `current`. Returns the reconciled index and the union of removed,
    /// added, and updated paths.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::Error`] from tree restoration or mutation.
    pub fn from_cache_with_delta(
        cache: &CacheObject,
        current: &[ResourceInput],
        index_timestamp: i64,
    ) -> Result<(Self, Vec<String>)> {
        let mut tree = HashTree::from_cache_object(cache)?;
        let cached_paths: BTreeSet<String> = tree.get_resource_paths().into_iter().collect();
        let current_paths: BTreeSet<String> = current.iter().map(|r| r.path.clone()).collect();

        let removed_paths: Vec<String> = cached_paths.difference(&current_paths).cloned().collect();
        let remove_delta = tree.remove_resources(&removed_paths)?;
        let upsert_delta = tree.upsert_resources(current, Some(index_timestamp))?;

        let mut changed: Vec<String> = remove_delta.removed;
        changed.extend(upsert_delta.added);
        changed.extend(upsert_delta.updated);
        changed.sort();
        changed.dedup();

        Ok((
            Self {
                tree,
                index_timestamp,
            },
            changed,
        ))
    }

    /// Insert or update resources in place.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::Error`] from the underlying [`HashTree`].
    pub fn upsert_resources(&mut self, resources: &[ResourceInput]) -> Result<UpsertDelta> {
        self.tree.upsert_resources(resources, Some(self.index_timestamp))
    }

    /// Remove resources in place.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::Error`] from the underlying [`HashTree`].
    pub fn remove_resources(&mut self, paths: &[String]) -> Result<RemoveDelta> {
        self.tree.remove_resources(paths)
    }

    /// Copy-on-write derive a new index sharing this one's timestamp.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::Error`] from the underlying [`HashTree`].
    pub fn derive_tree(&self, additional: &[ResourceInput]) -> Result<Self> {
        Ok(Self {
            tree: self.tree.derive_tree(additional)?,
            index_timestamp: self.index_timestamp,
        })
    }

    /// The root hash, hex-encoded — the sole identity used downstream.
    #[must_use]
    pub fn get_signature(&self) -> String {
        self.tree.root_hash()
    }

    /// All resource paths tracked by this index, sorted.
    #[must_use]
    pub fn get_resource_paths(&self) -> Vec<String> {
        self.tree.get_resource_paths()
    }

    /// Resource paths new or changed relative to `base`.
    #[must_use]
    pub fn get_added_resources(&self, base: &ResourceIndex) -> Vec<String> {
        self.tree.get_added_resources(&base.tree)
    }

    /// The index's disambiguation timestamp.
    #[must_use]
    pub fn index_timestamp(&self) -> i64 {
        self.index_timestamp
    }

    /// Serialize to the on-disk cache representation.
    #[must_use]
    pub fn to_cache_object(&self) -> CacheObject {
        CacheObject {
            root: self.tree.to_cache_node(),
            index_timestamp: self.index_timestamp,
        }
    }
}
