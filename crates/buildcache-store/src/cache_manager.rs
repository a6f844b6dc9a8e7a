//! Versioned on-disk layout tying [`ContentStore`] and the JSON record
//! types together.

use crate::content_store::ContentStore;
use crate::manifest::{
    sanitize_path_segment, BuildManifest, ResourceRecord, ResultMetadata, StageMetadata, CACHE_VERSION,
};
use crate::{Error, Result};
use buildcache_resource::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Owns the content store and the versioned JSON metadata tree under
/// `<dataDir>/buildCache/<CACHE_VERSION>/`.
pub struct CacheManager {
    root: PathBuf,
    content_store: ContentStore,
}

impl CacheManager {
    /// Open (and create, if absent) a cache manager rooted at
    /// `data_dir/buildCache/<CACHE_VERSION>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory tree cannot be created.
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let root = data_dir.as_ref().join("buildCache").join(CACHE_VERSION);
        std::fs::create_dir_all(&root).map_err(|e| Error::io(e, &root, "create-dir"))?;
        let content_store = ContentStore::new(root.join("cas"))?;
        Ok(Self { root, content_store })
    }

    /// The underlying blob store.
    #[must_use]
    pub fn content_store(&self) -> &ContentStore {
        &self.content_store
    }

    fn build_manifest_path(&self, pkg_path: &str, build_sig: &str) -> PathBuf {
        self.root
            .join("buildManifests")
            .join(sanitize_path_segment(pkg_path))
            .join(format!("{build_sig}.json"))
    }

    fn source_index_path(&self, pkg_path: &str, build_sig: &str) -> PathBuf {
        self.root
            .join("index")
            .join(sanitize_path_segment(pkg_path))
            .join(format!("source-{build_sig}.json"))
    }

    fn stage_metadata_path(&self, pkg_path: &str, build_sig: &str, stage_id: &str, stage_sig: &str) -> PathBuf {
        self.root
            .join("stageMetadata")
            .join(sanitize_path_segment(pkg_path))
            .join(build_sig)
            .join(sanitize_path_segment(stage_id))
            .join(format!("{stage_sig}.json"))
    }

    fn task_metadata_path(&self, pkg_path: &str, build_sig: &str, task_name: &str, domain: &str) -> PathBuf {
        self.root
            .join("taskMetadata")
            .join(sanitize_path_segment(pkg_path))
            .join(build_sig)
            .join(sanitize_path_segment(task_name))
            .join(format!("{domain}.json"))
    }

    fn result_metadata_path(&self, pkg_path: &str, build_sig: &str, result_sig: &str) -> PathBuf {
        self.root
            .join("resultMetadata")
            .join(sanitize_path_segment(pkg_path))
            .join(build_sig)
            .join(format!("{result_sig}.json"))
    }

    /// Read and validate a build manifest. A missing file or an
    /// unsupported `manifestVersion` downgrade silently to `Ok(None)`
    /// ("no cache"); a present manifest whose `signature` does not match
    /// `build_signature` is a fatal [`Error::SignatureMismatch`].
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, malformed JSON, or a signature
    /// mismatch.
    pub fn read_build_manifest(&self, pkg_path: &str, build_signature: &str) -> Result<Option<BuildManifest>> {
        let path = self.build_manifest_path(pkg_path, build_signature);
        let Some(manifest): Option<BuildManifest> = read_json(&path)? else {
            return Ok(None);
        };

        if manifest.manifest_version != CACHE_VERSION {
            tracing::debug!(path = %path.display(), found = manifest.manifest_version, "manifest schema mismatch, treating as no cache");
            return Ok(None);
        }
        if manifest.signature != build_signature {
            return Err(Error::signature_mismatch(manifest.signature, build_signature));
        }
        Ok(Some(manifest))
    }

    /// Write a build manifest.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O or serialization failure.
    pub fn write_build_manifest(&self, pkg_path: &str, build_signature: &str, manifest: &BuildManifest) -> Result<()> {
        write_json(&self.build_manifest_path(pkg_path, build_signature), manifest)
    }

    /// Read the serialized source index cache object, if present.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O or deserialization failure.
    pub fn read_source_index<T: DeserializeOwned>(&self, pkg_path: &str, build_signature: &str) -> Result<Option<T>> {
        read_json(&self.source_index_path(pkg_path, build_signature))
    }

    /// Write the serialized source index cache object.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O or serialization failure.
    pub fn write_source_index<T: Serialize>(&self, pkg_path: &str, build_signature: &str, index: &T) -> Result<()> {
        write_json(&self.source_index_path(pkg_path, build_signature), index)
    }

    /// Read stage metadata for `(stageId, stageSig)`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O or deserialization failure.
    pub fn read_stage_metadata(
        &self,
        pkg_path: &str,
        build_signature: &str,
        stage_id: &str,
        stage_signature: &str,
    ) -> Result<Option<StageMetadata>> {
        read_json(&self.stage_metadata_path(pkg_path, build_signature, stage_id, stage_signature))
    }

    /// Write stage metadata for `(stageId, stageSig)`.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O or serialization failure.
    pub fn write_stage_metadata(
        &self,
        pkg_path: &str,
        build_signature: &str,
        stage_id: &str,
        stage_signature: &str,
        metadata: &StageMetadata,
    ) -> Result<()> {
        write_json(
            &self.stage_metadata_path(pkg_path, build_signature, stage_id, stage_signature),
            metadata,
        )
    }

    /// Read per-task metadata of a caller-chosen type, generic so this
    /// crate need not depend on the request-graph crate's concrete
    /// cache-object shape.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O or deserialization failure.
    pub fn read_task_metadata<T: DeserializeOwned>(
        &self,
        pkg_path: &str,
        build_signature: &str,
        task_name: &str,
        domain: &str,
    ) -> Result<Option<T>> {
        read_json(&self.task_metadata_path(pkg_path, build_signature, task_name, domain))
    }

    /// Write per-task metadata of a caller-chosen type.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O or serialization failure.
    pub fn write_task_metadata<T: Serialize>(
        &self,
        pkg_path: &str,
        build_signature: &str,
        task_name: &str,
        domain: &str,
        metadata: &T,
    ) -> Result<()> {
        write_json(&self.task_metadata_path(pkg_path, build_signature, task_name, domain), metadata)
    }

    /// Read result metadata for `resultSig`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O or deserialization failure.
    pub fn read_result_metadata(&self, pkg_path: &str, build_signature: &str, result_signature: &str) -> Result<Option<ResultMetadata>> {
        read_json(&self.result_metadata_path(pkg_path, build_signature, result_signature))
    }

    /// Write result metadata for `resultSig`.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O or serialization failure.
    pub fn write_result_metadata(
        &self,
        pkg_path: &str,
        build_signature: &str,
        result_signature: &str,
        metadata: &ResultMetadata,
    ) -> Result<()> {
        write_json(&self.result_metadata_path(pkg_path, build_signature, result_signature), metadata)
    }

    /// Persist a resource's content into the content store (skipping the
    /// write if the blob is already present) and return the record to
    /// store in stage metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource's content cannot be read or the
    /// blob cannot be written.
    pub fn write_resource(&self, resource: &Resource) -> Result<ResourceRecord> {
        let bytes = resource.get_buffer()?;
        let integrity = resource.get_integrity()?;
        if !self.content_store.has(&integrity) {
            self.content_store.put(&integrity, &bytes)?;
        }
        Ok(ResourceRecord {
            integrity,
            size: bytes.len() as u64,
            last_modified: resource.get_last_modified().unwrap_or_default(),
            inode: resource.get_inode(),
        })
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io(e, path, "read")),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| Error::serialization(path, e.to_string()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path.parent().expect("record paths always have a parent");
    std::fs::create_dir_all(dir).map_err(|e| Error::io(e, dir, "create-dir"))?;
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| Error::serialization(path, e.to_string()))?;
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, &bytes).map_err(|e| Error::io(e, &tmp_path, "write"))?;
    std::fs::rename(&tmp_path, path).map_err(|e| Error::io(e, path, "rename"))?;
    Ok(())
}
