//! Conversion between [`buildcache_resource::Resource`] and the resource
//! representation the tree/index layer operates on.

use crate::Result;
use buildcache_resource::{Reader, Resource};
use buildcache_tree::{ResourceInput, ResourceMeta};

/// Convert one resource into the tree layer's input shape, computing its
/// integrity hash.
///
/// # Errors
///
/// Propagates [`buildcache_resource::Error`] from integrity computation.
pub fn resource_to_input(resource: &Resource) -> Result<ResourceInput> {
    Ok(ResourceInput {
        path: resource.get_path(),
        meta: ResourceMeta {
            integrity: resource.get_integrity()?,
            last_modified: resource.get_last_modified(),
            size: resource.get_size(),
            inode: resource.get_inode(),
        },
    })
}

/// Read every resource matching `pattern` from `reader` and convert each
/// to a tree input, for building or rebuilding a full index.
///
/// # Errors
///
/// Propagates errors from the reader or from integrity computation.
pub fn resource_inputs_from_reader(reader: &dyn Reader, pattern: &str) -> Result<Vec<ResourceInput>> {
    reader
        .by_glob(pattern)?
        .iter()
        .filter(|r| !r.is_directory())
        .map(resource_to_input)
        .collect()
}

/// The universal glob pattern used to enumerate every resource a reader
/// exposes.
pub const ALL_RESOURCES: &str = "**/*";
