//! Serializable on-disk record types for the versioned cache layout.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current cache schema version. Bumped whenever the on-disk shape of any
/// record in this module changes incompatibly. Doubles as the on-disk
/// directory prefix and as every manifest's `manifestVersion` field.
pub const CACHE_VERSION: &str = "v0_1";

/// `buildManifests/<pkgPath>/<buildSig>.json` — identifies a build and
/// records which tasks it covers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildManifest {
    /// Schema version this manifest was written under, compared against
    /// [`CACHE_VERSION`] on read.
    pub manifest_version: String,
    /// The build signature this manifest was written for.
    pub signature: String,
    /// Whether this project opted into differential-build delta tracking.
    pub differential_builds: bool,
    /// Task names in execution order.
    pub tasks: Vec<String>,
}

impl BuildManifest {
    /// Construct a manifest at the current schema version.
    #[must_use]
    pub fn new(signature: impl Into<String>, differential_builds: bool, tasks: Vec<String>) -> Self {
        Self {
            manifest_version: CACHE_VERSION.to_string(),
            signature: signature.into(),
            differential_builds,
            tasks,
        }
    }
}

/// `resultMetadata/<pkgPath>/<buildSig>/<resultSig>.json` — maps each
/// task's stage id to the stage signature it ran under for this result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// `stageId -> stageSignature` for every stage contributing to this
    /// result.
    pub stage_signatures: BTreeMap<String, String>,
}

/// Metadata recorded for one persisted resource: enough to verify and
/// rehydrate it from the content store without re-reading source bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// SRI integrity string, the content store key.
    pub integrity: String,
    /// Byte size of the uncompressed content.
    pub size: u64,
    /// Last-modified timestamp (milliseconds since epoch) at write time.
    pub last_modified: i64,
    /// Filesystem inode, when the source resource had one.
    pub inode: Option<u64>,
}

/// `stageMetadata/<pkgPath>/<buildSig>/<stageId>/<stageSig>.json`.
///
/// For single-writer stages, `resources` is populated directly. For
/// stages whose writer is a collection of sub-writers, `resource_mapping`
/// records which writer produced each path and `resource_metadata` is
/// keyed by the *same paths* as `resources`/`resource_mapping` (not by
/// writer index — a writer index is not unique per path) so restoration
/// can group paths by writer via `resource_mapping` without a second
/// indirection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageMetadata {
    /// `path -> resource record`, for stages with a single writer.
    pub resources: BTreeMap<String, ResourceRecord>,
    /// Paths written by this stage, in writer-collection order. `None`
    /// for single-writer stages.
    pub resource_mapping: Option<BTreeMap<String, usize>>,
    /// Per-path resource records for writer-collection stages. Mirrors
    /// `resources` but is only populated when `resource_mapping` is.
    pub resource_metadata: Option<BTreeMap<String, ResourceRecord>>,
}

impl StageMetadata {
    /// Stage metadata for a stage with a single writer.
    #[must_use]
    pub fn single_writer(resources: BTreeMap<String, ResourceRecord>) -> Self {
        Self {
            resources,
            resource_mapping: None,
            resource_metadata: None,
        }
    }

    /// Stage metadata for a stage whose writer is a collection of
    /// sub-writers, keyed by `path -> writerIndex`.
    #[must_use]
    pub fn writer_collection(
        resource_mapping: BTreeMap<String, usize>,
        resource_metadata: BTreeMap<String, ResourceRecord>,
    ) -> Self {
        Self {
            resources: BTreeMap::new(),
            resource_mapping: Some(resource_mapping),
            resource_metadata: Some(resource_metadata),
        }
    }

    /// All resource records present, regardless of single- or
    /// multi-writer shape.
    #[must_use]
    pub fn all_records(&self) -> &BTreeMap<String, ResourceRecord> {
        self.resource_metadata.as_ref().unwrap_or(&self.resources)
    }
}

/// Replace filesystem-unsafe characters in a package path or stage id so
/// it can be used as a single path segment, matching the
/// `stageId-with-/-replaced-by-_` convention for stage ids.
#[must_use]
pub fn sanitize_path_segment(segment: &str) -> String {
    segment.replace('/', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_slashes() {
        assert_eq!(sanitize_path_segment("task/compile"), "task_compile");
    }

    #[test]
    fn single_writer_all_records_uses_resources() {
        let mut resources = BTreeMap::new();
        resources.insert(
            "a.txt".to_string(),
            ResourceRecord { integrity: "sha256-x".into(), size: 1, last_modified: 0, inode: None },
        );
        let meta = StageMetadata::single_writer(resources.clone());
        assert_eq!(meta.all_records(), &resources);
    }

    #[test]
    fn writer_collection_all_records_uses_resource_metadata() {
        let mut mapping = BTreeMap::new();
        mapping.insert("a.txt".to_string(), 0usize);
        let mut metadata = BTreeMap::new();
        metadata.insert(
            "a.txt".to_string(),
            ResourceRecord { integrity: "sha256-y".into(), size: 2, last_modified: 0, inode: None },
        );
        let meta = StageMetadata::writer_collection(mapping, metadata.clone());
        assert_eq!(meta.all_records(), &metadata);
        assert!(meta.resources.is_empty());
    }

    #[test]
    fn build_manifest_serde_round_trip() {
        let manifest = BuildManifest::new("sig-1", true, vec!["compile".into(), "lint".into()]);
        let json = serde_json::to_string(&manifest).unwrap();
        let restored: BuildManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.signature, "sig-1");
        assert_eq!(restored.manifest_version, CACHE_VERSION);
        assert!(restored.differential_builds);
    }
}
