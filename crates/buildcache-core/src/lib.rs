//! Coordinator crate for the build cache: ties the resource, tree, graph,
//! and store crates together into [`ProjectBuildCache`], the per-project
//! state machine that decides whether a build's indices, per-task stages,
//! and final result can be served from the persistent cache.

mod config;
mod error;
mod project;
mod project_cache;
mod resources;
mod signature;
mod stage;
mod state;

pub use config::resolve_data_dir;
pub use error::{Error, Result};
pub use project::{Project, ReaderOptions};
pub use project_cache::ProjectBuildCache;
pub use resources::{resource_inputs_from_reader, resource_to_input, ALL_RESOURCES};
pub use signature::{cartesian_product, combined_dep_signature, result_signature, stage_signature, MAX_CANDIDATE_COMBINATIONS};
pub use stage::StageRecord;
pub use state::{DifferentialCacheInfo, IndexState, ResultCacheState, TaskCacheOutcome};

pub use buildcache_store::CACHE_VERSION;
