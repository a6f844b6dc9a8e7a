//! Error types for persistent cache storage

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Error type for `buildcache-store` operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Filesystem I/O failure other than a cache-miss-equivalent absence
    #[error("failed to {operation} {path}: {source}")]
    #[diagnostic(code(buildcache::store::io))]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path involved
        path: PathBuf,
        /// Operation being performed
        operation: String,
    },

    /// A stored JSON document failed to parse
    #[error("failed to parse {path}: {message}")]
    #[diagnostic(code(buildcache::store::serialization))]
    Serialization {
        /// Path of the offending document
        path: PathBuf,
        /// Underlying parser message
        message: String,
    },

    /// A blob's stored bytes did not hash to its requested integrity, even
    /// after a fresh digest re-lookup
    #[error("content store integrity mismatch for {integrity}")]
    #[diagnostic(
        code(buildcache::store::integrity),
        help("the blob was deleted; the caller should treat this as a cache miss")
    )]
    Integrity {
        /// The requested integrity key
        integrity: String,
    },

    /// A persisted manifest's signature does not match the signature the
    /// caller expected — indicates corruption, not a stale cache
    #[error("cache signature mismatch: manifest has '{found}', expected '{expected}'")]
    #[diagnostic(code(buildcache::store::signature_mismatch))]
    SignatureMismatch {
        /// Signature recorded in the manifest
        found: String,
        /// Signature the caller requested
        expected: String,
    },

    /// Propagated from resource access while writing stage content
    #[error(transparent)]
    #[diagnostic(transparent)]
    Resource(#[from] buildcache_resource::Error),
}

impl Error {
    /// Build an [`Error::Io`]
    #[must_use]
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: path.into(),
            operation: operation.into(),
        }
    }

    /// Build an [`Error::Serialization`]
    #[must_use]
    pub fn serialization(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Serialization {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Build an [`Error::Integrity`]
    #[must_use]
    pub fn integrity(integrity: impl Into<String>) -> Self {
        Self::Integrity {
            integrity: integrity.into(),
        }
    }

    /// Build an [`Error::SignatureMismatch`]
    #[must_use]
    pub fn signature_mismatch(found: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::SignatureMismatch {
            found: found.into(),
            expected: expected.into(),
        }
    }
}

/// Result type for `buildcache-store` operations
pub type Result<T> = std::result::Result<T, Error>;
