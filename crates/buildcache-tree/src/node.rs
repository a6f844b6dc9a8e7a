//! Deterministic Merkle hashing for tree nodes

use sha2::{Digest, Sha256};

/// Metadata carried by a resource leaf node.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceMeta {
    /// SRI integrity string (e.g. `"sha256-..."`)
    pub integrity: String,
    /// Last-modified timestamp, milliseconds since epoch
    pub last_modified: Option<i64>,
    /// Declared byte size
    pub size: Option<u64>,
    /// Filesystem inode, when known
    pub inode: Option<u64>,
}

/// A resource to upsert: a path plus its metadata.
#[derive(Debug, Clone)]
pub struct ResourceInput {
    /// Absolute, `/`-separated path
    pub path: String,
    /// Metadata to store/compare
    pub meta: ResourceMeta,
}

fn sha256_hex(data: &str) -> String {
    let digest = Sha256::digest(data.as_bytes());
    hex::encode(digest)
}

/// `SHA256("resource:<name>:<integrity>")`, hex-encoded.
pub(crate) fn resource_hash(name: &str, integrity: &str) -> String {
    sha256_hex(&format!("resource:{name}:{integrity}"))
}

/// `SHA256("dir:<name>:" || concat(sorted-child-hashes))`, or
/// `SHA256("dir:<name>:empty")` when there are no children.
pub(crate) fn directory_hash<'a>(name: &str, child_hashes: impl Iterator<Item = &'a str>) -> String {
    let mut body = String::new();
    let mut any = false;
    for h in child_hashes {
        body.push_str(h);
        any = true;
    }
    if any {
        sha256_hex(&format!("dir:{name}:{body}"))
    } else {
        sha256_hex(&format!("dir:{name}:empty"))
    }
}

/// A node in the hash tree: either a resource leaf or a directory.
#[derive(Debug, Clone)]
pub(crate) enum Node {
    Resource(ResourceNode),
    Directory(DirectoryNode),
}

#[derive(Debug, Clone)]
pub(crate) struct ResourceNode {
    pub name: String,
    pub meta: ResourceMeta,
    pub hash: String,
}

#[derive(Debug, Clone)]
pub(crate) struct DirectoryNode {
    pub name: String,
    pub children: std::collections::BTreeMap<String, std::sync::Arc<Node>>,
    pub hash: String,
}

impl Node {
    pub(crate) fn hash(&self) -> &str {
        match self {
            Node::Resource(r) => &r.hash,
            Node::Directory(d) => &d.hash,
        }
    }

    pub(crate) fn name(&self) -> &str {
        match self {
            Node::Resource(r) => &r.name,
            Node::Directory(d) => &d.name,
        }
    }
}

impl ResourceNode {
    pub(crate) fn new(name: String, meta: ResourceMeta) -> Self {
        let hash = resource_hash(&name, &meta.integrity);
        Self { name, meta, hash }
    }
}

impl DirectoryNode {
    pub(crate) fn new(
        name: String,
        children: std::collections::BTreeMap<String, std::sync::Arc<Node>>,
    ) -> Self {
        let hash = directory_hash(&name, children.values().map(|n| n.hash()));
        Self {
            name,
            children,
            hash,
        }
    }

    pub(crate) fn empty(name: String) -> Self {
        Self::new(name, std::collections::BTreeMap::new())
    }
}
