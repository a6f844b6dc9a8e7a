//! In-memory record of what a completed stage wrote, the payload type
//! stored inside [`buildcache_store::StageCache`].

use buildcache_store::ResourceRecord;
use std::collections::BTreeMap;

/// What one stage execution wrote, kept alongside its signature in the
/// in-memory [`buildcache_store::StageCache`]. Keyed by path so both the
/// in-memory form and the on-disk [`buildcache_store::StageMetadata`] form
/// share the same shape.
#[derive(Debug, Clone, Default)]
pub struct StageRecord {
    /// `path -> resource record` for everything this stage wrote.
    pub resources: BTreeMap<String, ResourceRecord>,
}

impl StageRecord {
    /// The paths this stage execution wrote, without their records.
    #[must_use]
    pub fn written_resource_paths(&self) -> Vec<String> {
        self.resources.keys().cloned().collect()
    }
}
