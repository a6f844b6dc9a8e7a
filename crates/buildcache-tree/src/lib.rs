//! Copy-on-write Merkle hash tree over resource metadata, plus the
//! registry that coordinates batch updates across related trees.

mod cache_object;
mod error;
mod index;
mod node;
mod registry;
mod tree;

pub use cache_object::{CacheNode, CacheObject};
pub use error::{Error, Result};
pub use index::ResourceIndex;
pub use node::{ResourceInput, ResourceMeta};
pub use registry::{TreeDelta, TreeRegistry};
pub use tree::{HashTree, RemoveDelta, UpdateDelta, UpsertDelta};
