//! External reader/writer contracts consumed by the cache.
//!
//! The cache never constructs resources itself; it asks a caller-supplied
//! [`Reader`] for them by exact path or glob pattern, and writes stage
//! output through a caller-supplied [`Writer`]. Both are implemented
//! outside this crate (by the build orchestrator), which is why they live
//! here as trait contracts rather than concrete types.

use crate::{Resource, Result};

/// Resolves virtual paths and glob patterns to resources.
pub trait Reader: Send + Sync {
    /// Look up a single resource by its exact virtual path.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying lookup fails; an absent resource
    /// is `Ok(None)`, not an error.
    fn by_path(&self, virtual_path: &str) -> Result<Option<Resource>>;

    /// Look up all resources matching a glob pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying lookup fails.
    fn by_glob(&self, pattern: &str) -> Result<Vec<Resource>>;

    /// Resolve a virtual path to whatever identifier the reader's monitor
    /// wrapper uses internally, for readers that track filesystem identity.
    fn resolve_path(&self, virtual_path: &str) -> Option<String> {
        let _ = virtual_path;
        None
    }

    /// As [`Self::resolve_path`], for glob patterns.
    fn resolve_pattern(&self, pattern: &str) -> Option<String> {
        let _ = pattern;
        None
    }
}

/// Accepts stage output resources.
pub trait Writer: Send + Sync {
    /// Persist a single resource as part of a stage's output.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn write(&self, resource: &Resource) -> Result<()>;

    /// For a writer that is itself a collection of sub-writers keyed by
    /// path, the path→writer-index mapping used to reconstruct the
    /// collection from stage metadata at restore time.
    fn get_mapping(&self) -> Option<std::collections::BTreeMap<String, usize>> {
        None
    }
}
