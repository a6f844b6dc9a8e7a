//! Integrity-addressed, gzip-compressed blob store.

use crate::{Error, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Content-addressed store keyed by SRI integrity string
/// (`"sha256-<base64>"`). Bytes are gzip-compressed on write and verified
/// against their integrity key on read.
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// Open (and create, if absent) a content store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| Error::io(e, &root, "create-dir"))?;
        Ok(Self { root })
    }

    /// Whether a blob for `integrity` is already stored.
    #[must_use]
    pub fn has(&self, integrity: &str) -> bool {
        self.path_for(integrity).is_file()
    }

    /// Store `bytes` under `integrity`, gzip-compressed. A no-op if the
    /// blob is already present (writes are idempotent).
    ///
    /// # Errors
    ///
    /// Returns an error if compression or the atomic write fails.
    pub fn put(&self, integrity: &str, bytes: &[u8]) -> Result<()> {
        if self.has(integrity) {
            return Ok(());
        }

        let path = self.path_for(integrity);
        let dir = path.parent().expect("path_for always has a parent");
        std::fs::create_dir_all(dir).map_err(|e| Error::io(e, dir, "create-dir"))?;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(bytes)
            .map_err(|e| Error::io(e, &path, "gzip-encode"))?;
        let compressed = encoder
            .finish()
            .map_err(|e| Error::io(e, &path, "gzip-finish"))?;

        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, &compressed).map_err(|e| Error::io(e, &tmp_path, "write"))?;
        std::fs::rename(&tmp_path, &path).map_err(|e| Error::io(e, &path, "rename"))?;
        Ok(())
    }

    /// Read and decompress the blob for `integrity`, verifying it hashes
    /// back to the requested key. On a mismatch the corrupt blob is
    /// deleted and this returns `Ok(None)` — downstream callers treat it as
    /// an ordinary cache miss, not a fatal error.
    ///
    /// # Errors
    ///
    /// Returns an error for I/O failures other than absence.
    pub fn get(&self, integrity: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(integrity);
        let compressed = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(e, &path, "read")),
        };

        let mut decoder = GzDecoder::new(compressed.as_slice());
        let mut bytes = Vec::new();
        decoder
            .read_to_end(&mut bytes)
            .map_err(|e| Error::io(e, &path, "gzip-decode"))?;

        let observed = buildcache_resource::integrity_of(&bytes);
        if observed != integrity {
            tracing::warn!(integrity, observed, "content store integrity mismatch, evicting blob");
            let _ = std::fs::remove_file(&path);
            return Ok(None);
        }

        Ok(Some(bytes))
    }

    fn path_for(&self, integrity: &str) -> PathBuf {
        let filename = integrity.replace('/', "_").replace('+', "-");
        let shard = hex::encode(Sha256::digest(integrity.as_bytes()));
        self.root.join(&shard[0..2]).join(&shard[2..4]).join(format!("{filename}.gz"))
    }

    /// Root directory this store persists under.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path()).unwrap();
        let integrity = buildcache_resource::integrity_of(b"hello world");
        store.put(&integrity, b"hello world").unwrap();
        assert!(store.has(&integrity));
        assert_eq!(store.get(&integrity).unwrap(), Some(b"hello world".to_vec()));
    }

    #[test]
    fn missing_blob_is_a_clean_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path()).unwrap();
        assert_eq!(store.get("sha256-doesnotexist").unwrap(), None);
    }

    #[test]
    fn put_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path()).unwrap();
        let integrity = buildcache_resource::integrity_of(b"x");
        store.put(&integrity, b"x").unwrap();
        store.put(&integrity, b"x").unwrap();
        assert_eq!(store.get(&integrity).unwrap(), Some(b"x".to_vec()));
    }

    #[test]
    fn corrupt_blob_is_evicted_and_reported_as_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path()).unwrap();
        let integrity = buildcache_resource::integrity_of(b"original");
        store.put(&integrity, b"original").unwrap();

        // Corrupt the stored blob directly on disk.
        let path = store.path_for(&integrity);
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"tampered").unwrap();
        std::fs::write(&path, encoder.finish().unwrap()).unwrap();

        assert_eq!(store.get(&integrity).unwrap(), None);
        assert!(!store.has(&integrity));
    }
}
