//! Top-level error type. Wraps every lower-crate error so callers linking
//! against `buildcache-core` only need to match on one type.

use miette::Diagnostic;
use thiserror::Error;

/// Error type for `buildcache-core` operations.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// No writable cache root could be resolved.
    #[error("no writable cache directory found (tried {tried:?})")]
    #[diagnostic(code(buildcache::core::configuration), help("set UI5_DATA_DIR or pass an explicit cache directory"))]
    Configuration {
        /// Candidate directories that were rejected, in resolution order.
        tried: Vec<String>,
    },

    /// A request referenced a task name with no registered [`buildcache_graph::BuildTaskCache`].
    #[error("unknown task '{task_name}'")]
    #[diagnostic(code(buildcache::core::unknown_task))]
    UnknownTask {
        /// The task name that was not found.
        task_name: String,
    },

    /// A stage switch was requested before a stage of that name existed.
    #[error("unknown stage '{stage_id}'")]
    #[diagnostic(code(buildcache::core::unknown_stage))]
    UnknownStage {
        /// The stage id that was not found.
        stage_id: String,
    },

    /// Propagated from resource construction/content access.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Resource(#[from] buildcache_resource::Error),

    /// Propagated from hash tree / resource index operations.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Tree(#[from] buildcache_tree::Error),

    /// Propagated from request graph / task cache operations.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] buildcache_graph::Error),

    /// Propagated from persistent storage operations.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] buildcache_store::Error),
}

/// Result type for `buildcache-core` operations.
pub type Result<T> = std::result::Result<T, Error>;
