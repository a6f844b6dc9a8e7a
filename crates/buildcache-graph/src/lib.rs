//! Per-task request-tracking DAG with parent-delta index reuse.
//!
//! A task's reads are recorded as an ordered [`RequestSet`]; a
//! [`RequestGraph`] deduplicates overlapping request sets across tasks by
//! attaching new nodes to the existing node whose accumulated requests are
//! the largest subset of the new set, storing only the delta and deriving
//! its [`buildcache_tree::ResourceIndex`] from the parent's via
//! copy-on-write. [`BuildTaskCache`] bundles one project-domain and one
//! dependency-domain [`ResourceRequestManager`] per task.

mod cache_object;
mod error;
mod request;
mod request_graph;
mod request_manager;
mod task_cache;

pub use cache_object::{NodeCacheObject, RequestGraphCacheObject, RequestManagerCacheObject, TaskCacheObject};
pub use error::{Error, Result};
pub use request::{Request, RequestKind, RequestSet};
pub use request_graph::{RequestGraph, RequestGraphNode};
pub use request_manager::ResourceRequestManager;
pub use task_cache::BuildTaskCache;
