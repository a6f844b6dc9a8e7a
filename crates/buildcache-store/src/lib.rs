//! Persistent cache storage: a content-addressed blob store plus the
//! versioned JSON metadata layout under `<dataDir>/buildCache/<CACHE_VERSION>/`.

mod cache_manager;
mod content_store;
mod error;
mod manifest;
mod stage_cache;

pub use cache_manager::CacheManager;
pub use content_store::ContentStore;
pub use error::{Error, Result};
pub use manifest::{
    sanitize_path_segment, BuildManifest, ResourceRecord, ResultMetadata, StageMetadata, CACHE_VERSION,
};
pub use stage_cache::{StageCache, StageEntry};
