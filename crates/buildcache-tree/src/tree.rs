//! Copy-on-write Merkle tree over resource metadata.

use crate::cache_object::{flatten, CacheNode, CacheObject};
use crate::node::{DirectoryNode, Node, ResourceInput, ResourceMeta, ResourceNode};
use crate::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Outcome of a batch upsert: paths bucketed by how they changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertDelta {
    /// Paths that were newly inserted
    pub added: Vec<String>,
    /// Paths whose metadata changed and were overwritten
    pub updated: Vec<String>,
    /// Paths whose metadata was unchanged by the strict match
    pub unchanged: Vec<String>,
}

/// Outcome of a batch removal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveDelta {
    /// Paths that existed and were removed
    pub removed: Vec<String>,
    /// Paths that did not exist
    pub not_found: Vec<String>,
}

/// Outcome of the update-only subset of upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateDelta {
    /// Paths that existed and whose metadata changed
    pub updated: Vec<String>,
    /// Paths that existed but were unchanged by the strict match
    pub unchanged: Vec<String>,
    /// Paths that did not exist, and so were skipped
    pub not_found: Vec<String>,
}

/// A rooted, directory-structured Merkle tree with copy-on-write derivation.
#[derive(Debug, Clone)]
pub struct HashTree {
    root: Arc<Node>,
}

impl HashTree {
    /// An empty tree.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            root: Arc::new(Node::Directory(DirectoryNode::empty(String::new()))),
        }
    }

    /// Build a tree from a resource set in one pass. Insertion order does
    /// not affect the resulting root hash.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PrefixCollision`] if two paths conflict (one is an
    /// ancestor directory of the other but was inserted as a resource), or
    /// [`Error::InvalidPath`] for a malformed path.
    pub fn build(resources: &[ResourceInput]) -> Result<Self> {
        let mut tree = Self::empty();
        let mut sorted = resources.to_vec();
        sorted.sort_by(|a, b| a.path.cmp(&b.path));
        tree.upsert_resources(&sorted, None)?;
        Ok(tree)
    }

    /// Hex-encoded root hash.
    #[must_use]
    pub fn root_hash(&self) -> String {
        self.root.hash().to_string()
    }

    /// Insert or update resources. `index_timestamp`, when present, is used
    /// by the strict metadata match to avoid treating a race-windowed write
    /// (whose mtime lands exactly on the indexing instant) as unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PrefixCollision`] or [`Error::InvalidPath`].
    pub fn upsert_resources(
        &mut self,
        resources: &[ResourceInput],
        index_timestamp: Option<i64>,
    ) -> Result<UpsertDelta> {
        let mut delta = UpsertDelta::default();
        for input in resources {
            let segments = split_path(&input.path)?;
            let (new_root, category) =
                insert(&self.root, &segments, &input.path, &input.meta, index_timestamp)?;
            self.root = new_root;
            match category {
                ChangeKind::Added => delta.added.push(input.path.clone()),
                ChangeKind::Updated => delta.updated.push(input.path.clone()),
                ChangeKind::Unchanged => delta.unchanged.push(input.path.clone()),
            }
        }
        Ok(delta)
    }

    /// Update-only subset of [`Self::upsert_resources`]: resources absent
    /// from the tree are reported as not-found rather than inserted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PrefixCollision`] or [`Error::InvalidPath`].
    pub fn update_resources(
        &mut self,
        resources: &[ResourceInput],
        index_timestamp: Option<i64>,
    ) -> Result<UpdateDelta> {
        let mut existing = Vec::new();
        let mut not_found = Vec::new();
        let known_paths: BTreeSet<String> = self.get_resource_paths().into_iter().collect();
        for r in resources {
            if known_paths.contains(&r.path) {
                existing.push(r.clone());
            } else {
                not_found.push(r.path.clone());
            }
        }
        let upserted = self.upsert_resources(&existing, index_timestamp)?;
        Ok(UpdateDelta {
            updated: upserted.updated,
            unchanged: upserted.unchanged,
            not_found,
        })
    }

    /// Remove resources. Removing the only child of a directory recursively
    /// removes empty ancestor directories up to (but not including) the
    /// root.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] for a malformed path.
    pub fn remove_resources(&mut self, paths: &[String]) -> Result<RemoveDelta> {
        let mut delta = RemoveDelta::default();
        for path in paths {
            let segments = split_path(path)?;
            let (new_root, found) = remove(&self.root, &segments, true);
            self.root = new_root.unwrap_or_else(|| Arc::new(Node::Directory(DirectoryNode::empty(String::new()))));
            if found {
                delta.removed.push(path.clone());
            } else {
                delta.not_found.push(path.clone());
            }
        }
        Ok(delta)
    }

    /// Copy-on-write derivation: returns a new tree sharing unaffected
    /// subtrees, with `additional` upserted on top.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PrefixCollision`] or [`Error::InvalidPath`].
    pub fn derive_tree(&self, additional: &[ResourceInput]) -> Result<Self> {
        let mut derived = Self {
            root: Arc::clone(&self.root),
        };
        derived.upsert_resources(additional, None)?;
        Ok(derived)
    }

    /// Resource paths present in `self` but absent from, or structurally
    /// diverged from, `base`.
    #[must_use]
    pub fn get_added_resources(&self, base: &HashTree) -> Vec<String> {
        let base_hashes = collect_resource_hashes(&base.root, String::new());
        let self_hashes = collect_resource_hashes(&self.root, String::new());
        let mut added: Vec<String> = self_hashes
            .iter()
            .filter(|(path, hash)| base_hashes.get(*path) != Some(hash))
            .map(|(path, _)| path.clone())
            .collect();
        added.sort();
        added
    }

    /// All resource paths, sorted lexicographically.
    #[must_use]
    pub fn get_resource_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = collect_resource_hashes(&self.root, String::new())
            .into_keys()
            .collect();
        paths.sort();
        paths
    }

    /// Convert to a serializable node tree, dropping cached hashes (they are
    /// recomputed deterministically on restore).
    #[must_use]
    pub fn to_cache_node(&self) -> CacheNode {
        to_cache_node(&self.root)
    }

    /// Restore a tree from its serializable form by flattening it back to a
    /// resource list and rebuilding — relies on the build-order-independence
    /// invariant to guarantee the restored root hash matches the original.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PrefixCollision`] if the cached node tree is malformed.
    pub fn from_cache_object(object: &CacheObject) -> Result<Self> {
        let resources = flatten(&object.root, "");
        Self::build(&resources)
    }
}

fn to_cache_node(node: &Arc<Node>) -> CacheNode {
    match node.as_ref() {
        Node::Resource(r) => CacheNode::Resource {
            name: r.name.clone(),
            integrity: r.meta.integrity.clone(),
            last_modified: r.meta.last_modified,
            size: r.meta.size,
            inode: r.meta.inode,
        },
        Node::Directory(d) => CacheNode::Directory {
            name: d.name.clone(),
            children: d.children.values().map(to_cache_node).collect(),
        },
    }
}

impl Default for HashTree {
    fn default() -> Self {
        Self::empty()
    }
}

enum ChangeKind {
    Added,
    Updated,
    Unchanged,
}

fn split_path(path: &str) -> Result<Vec<&str>> {
    if !path.starts_with('/') || path.len() < 2 {
        return Err(Error::invalid_path(path, "path must be absolute and non-empty"));
    }
    Ok(path[1..].split('/').collect())
}

fn strict_match(existing: &ResourceMeta, incoming: &ResourceMeta, index_timestamp: Option<i64>) -> bool {
    let inodes_ok = match (existing.inode, incoming.inode) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    };
    if !inodes_ok {
        return false;
    }

    let mtime_ok = match (existing.last_modified, incoming.last_modified) {
        (Some(a), Some(b)) => a == b && Some(b) != index_timestamp,
        _ => false,
    };
    if mtime_ok {
        return true;
    }

    let size_and_integrity_ok = existing.size == incoming.size && existing.integrity == incoming.integrity;
    size_and_integrity_ok
}

fn insert(
    node: &Arc<Node>,
    segments: &[&str],
    full_path: &str,
    meta: &ResourceMeta,
    index_timestamp: Option<i64>,
) -> Result<(Arc<Node>, ChangeKind)> {
    let dir = match node.as_ref() {
        Node::Directory(d) => d,
        Node::Resource(r) => {
            return Err(Error::prefix_collision(full_path, format!("/{}", r.name)));
        }
    };

    let mut new_children = dir.children.clone();
    let leaf = segments[0];

    if segments.len() == 1 {
        let category = match new_children.get(leaf).map(Arc::as_ref) {
            None => ChangeKind::Added,
            Some(Node::Directory(_)) => {
                return Err(Error::prefix_collision(full_path, leaf));
            }
            Some(Node::Resource(existing)) => {
                if strict_match(&existing.meta, meta, index_timestamp) {
                    ChangeKind::Unchanged
                } else {
                    ChangeKind::Updated
                }
            }
        };
        if !matches!(category, ChangeKind::Unchanged) {
            new_children.insert(
                leaf.to_string(),
                Arc::new(Node::Resource(ResourceNode::new(leaf.to_string(), meta.clone()))),
            );
        }
        let new_dir = Arc::new(Node::Directory(DirectoryNode::new(dir.name.clone(), new_children)));
        return Ok((new_dir, category));
    }

    let child = match new_children.get(leaf).map(Arc::clone) {
        Some(c) => match c.as_ref() {
            Node::Resource(r) => {
                return Err(Error::prefix_collision(full_path, format!("/{}", r.name)));
            }
            Node::Directory(_) => c,
        },
        None => Arc::new(Node::Directory(DirectoryNode::empty(leaf.to_string()))),
    };

    let (new_child, category) = insert(&child, &segments[1..], full_path, meta, index_timestamp)?;
    new_children.insert(leaf.to_string(), new_child);
    let new_dir = Arc::new(Node::Directory(DirectoryNode::new(dir.name.clone(), new_children)));
    Ok((new_dir, category))
}

/// Returns `(Some(new_node), found)` when the directory survives, or
/// `(None, true)` when removal emptied it and it should be pruned from its
/// parent (never returned for the root, which is always kept).
fn remove(node: &Arc<Node>, segments: &[&str], is_root: bool) -> (Option<Arc<Node>>, bool) {
    let dir = match node.as_ref() {
        Node::Directory(d) => d,
        Node::Resource(_) => return (Some(Arc::clone(node)), false),
    };

    let leaf = segments[0];

    if segments.len() == 1 {
        if !matches!(dir.children.get(leaf).map(Arc::as_ref), Some(Node::Resource(_))) {
            return (Some(Arc::clone(node)), false);
        }
        let mut new_children = dir.children.clone();
        new_children.remove(leaf);
        if new_children.is_empty() && !is_root {
            return (None, true);
        }
        let new_dir = Arc::new(Node::Directory(DirectoryNode::new(dir.name.clone(), new_children)));
        return (Some(new_dir), true);
    }

    let Some(child) = dir.children.get(leaf) else {
        return (Some(Arc::clone(node)), false);
    };
    let (new_child, found) = remove(child, &segments[1..], false);
    if !found {
        return (Some(Arc::clone(node)), false);
    }

    let mut new_children = dir.children.clone();
    match new_child {
        Some(c) => {
            new_children.insert(leaf.to_string(), c);
        }
        None => {
            new_children.remove(leaf);
        }
    }

    if new_children.is_empty() && !is_root {
        return (None, true);
    }
    let new_dir = Arc::new(Node::Directory(DirectoryNode::new(dir.name.clone(), new_children)));
    (Some(new_dir), true)
}

fn collect_resource_hashes(node: &Arc<Node>, prefix: String) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    match node.as_ref() {
        Node::Resource(r) => {
            out.insert(prefix, r.hash.clone());
        }
        Node::Directory(d) => {
            for (name, child) in &d.children {
                let child_path = format!("{prefix}/{name}");
                out.extend(collect_resource_hashes(child, child_path));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(integrity: &str) -> ResourceMeta {
        ResourceMeta {
            integrity: integrity.to_string(),
            last_modified: None,
            size: None,
            inode: None,
        }
    }

    fn input(path: &str, integrity: &str) -> ResourceInput {
        ResourceInput {
            path: path.to_string(),
            meta: meta(integrity),
        }
    }

    #[test]
    fn build_is_order_independent() {
        let a = vec![input("/src/a.js", "i1"), input("/src/b.js", "i2"), input("/c.js", "i3")];
        let mut b = a.clone();
        b.reverse();
        let t1 = HashTree::build(&a).unwrap();
        let t2 = HashTree::build(&b).unwrap();
        assert_eq!(t1.root_hash(), t2.root_hash());
    }

    #[test]
    fn prefix_collision_is_rejected() {
        let mut tree = HashTree::empty();
        tree.upsert_resources(&[input("/a", "i1")], None).unwrap();
        let err = tree.upsert_resources(&[input("/a/b", "i2")], None);
        assert!(err.is_err());
    }

    #[test]
    fn upsert_reports_added_updated_unchanged() {
        let mut tree = HashTree::empty();
        let delta = tree.upsert_resources(&[input("/a.js", "i1")], None).unwrap();
        assert_eq!(delta.added, vec!["/a.js".to_string()]);

        let delta = tree.upsert_resources(&[input("/a.js", "i1")], None).unwrap();
        assert_eq!(delta.unchanged, vec!["/a.js".to_string()]);

        let delta = tree.upsert_resources(&[input("/a.js", "i2")], None).unwrap();
        assert_eq!(delta.updated, vec!["/a.js".to_string()]);
    }

    #[test]
    fn remove_prunes_empty_directories() {
        let mut tree = HashTree::empty();
        tree.upsert_resources(&[input("/dir/only.js", "i1")], None).unwrap();
        assert!(tree.get_resource_paths().contains(&"/dir/only.js".to_string()));
        let delta = tree.remove_resources(&["/dir/only.js".to_string()]).unwrap();
        assert_eq!(delta.removed, vec!["/dir/only.js".to_string()]);
        assert!(tree.get_resource_paths().is_empty());
        assert_eq!(tree.root_hash(), HashTree::empty().root_hash());
    }

    #[test]
    fn derive_tree_leaves_base_untouched() {
        let base = HashTree::build(&[input("/a.js", "i1")]).unwrap();
        let base_hash = base.root_hash();
        let derived = base.derive_tree(&[input("/b.js", "i2")]).unwrap();
        assert_eq!(base.root_hash(), base_hash);
        assert_ne!(derived.root_hash(), base_hash);
    }

    #[test]
    fn derive_tree_with_no_additions_matches_base() {
        let base = HashTree::build(&[input("/a.js", "i1")]).unwrap();
        let derived = base.derive_tree(&[]).unwrap();
        assert_eq!(base.root_hash(), derived.root_hash());
    }

    #[test]
    fn insert_after_derive_does_not_affect_base() {
        let base = HashTree::build(&[input("/a.js", "i1")]).unwrap();
        let mut derived = base.derive_tree(&[]).unwrap();
        derived.upsert_resources(&[input("/z.js", "i9")], None).unwrap();
        assert_ne!(derived.root_hash(), base.root_hash());
        assert_eq!(base.get_resource_paths(), vec!["/a.js".to_string()]);
    }

    #[test]
    fn get_added_resources_detects_new_and_changed() {
        let base = HashTree::build(&[input("/a.js", "i1"), input("/b.js", "i2")]).unwrap();
        let mut derived = base.derive_tree(&[]).unwrap();
        derived.upsert_resources(&[input("/a.js", "i1-changed"), input("/c.js", "i3")], None).unwrap();
        let mut added = derived.get_added_resources(&base);
        added.sort();
        assert_eq!(added, vec!["/a.js".to_string(), "/c.js".to_string()]);
    }

    #[test]
    fn strict_match_index_timestamp_carve_out() {
        let mut tree = HashTree::empty();
        tree.upsert_resources(&[ResourceInput {
            path: "/a.js".into(),
            meta: ResourceMeta { integrity: "i1".into(), last_modified: Some(1000), size: Some(5), inode: None },
        }], None).unwrap();

        // Same lastModified as cached, but it equals the indexTimestamp: the
        // carve-out means this cannot short-circuit via mtime, so it falls
        // through to size+integrity, which also match here.
        let delta = tree.upsert_resources(&[ResourceInput {
            path: "/a.js".into(),
            meta: ResourceMeta { integrity: "i1".into(), last_modified: Some(1000), size: Some(5), inode: None },
        }], Some(1000)).unwrap();
        assert_eq!(delta.unchanged, vec!["/a.js".to_string()]);

        // Same edge case, but integrity now differs too: must be reported updated.
        let delta = tree.upsert_resources(&[ResourceInput {
            path: "/a.js".into(),
            meta: ResourceMeta { integrity: "i2".into(), last_modified: Some(1000), size: Some(5), inode: None },
        }], Some(1000)).unwrap();
        assert_eq!(delta.updated, vec!["/a.js".to_string()]);
    }
}
