//! Serializable on-disk representation of a [`crate::HashTree`].

use crate::node::{ResourceInput, ResourceMeta};
use serde::{Deserialize, Serialize};

/// A serializable node: either a resource leaf or a directory subtree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum CacheNode {
    /// A resource leaf
    Resource {
        /// Segment name
        name: String,
        /// SRI integrity string
        integrity: String,
        /// Last-modified timestamp, milliseconds since epoch
        #[serde(skip_serializing_if = "Option::is_none")]
        last_modified: Option<i64>,
        /// Declared byte size
        #[serde(skip_serializing_if = "Option::is_none")]
        size: Option<u64>,
        /// Filesystem inode
        #[serde(skip_serializing_if = "Option::is_none")]
        inode: Option<u64>,
    },
    /// A directory subtree
    Directory {
        /// Segment name
        name: String,
        /// Child nodes
        children: Vec<CacheNode>,
    },
}

/// Serializable form of a [`crate::ResourceIndex`]: the tree plus the
/// timestamp used to disambiguate race-windowed modifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheObject {
    /// Root node (always a `Directory`)
    pub root: CacheNode,
    /// The index's timestamp, milliseconds since epoch
    pub index_timestamp: i64,
}

pub(crate) fn flatten(node: &CacheNode, prefix: &str) -> Vec<ResourceInput> {
    match node {
        CacheNode::Resource {
            name,
            integrity,
            last_modified,
            size,
            inode,
        } => vec![ResourceInput {
            path: format!("{prefix}/{name}"),
            meta: ResourceMeta {
                integrity: integrity.clone(),
                last_modified: *last_modified,
                size: *size,
                inode: *inode,
            },
        }],
        CacheNode::Directory { name, children } => {
            let child_prefix = if name.is_empty() {
                prefix.to_string()
            } else {
                format!("{prefix}/{name}")
            };
            children
                .iter()
                .flat_map(|c| flatten(c, &child_prefix))
                .collect()
        }
    }
}
