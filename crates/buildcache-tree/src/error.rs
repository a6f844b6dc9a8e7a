//! Error types for hash tree construction and mutation

use miette::Diagnostic;
use thiserror::Error;

/// Error type for `buildcache-tree` operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A resource path collided with an existing resource along its prefix
    #[error("path '{path}' cannot be inserted: '{prefix}' is already a resource, not a directory")]
    #[diagnostic(code(buildcache::tree::prefix_collision))]
    PrefixCollision {
        /// The path being inserted
        path: String,
        /// The ancestor path that already exists as a resource
        prefix: String,
    },

    /// A path was empty or not rooted at `/`
    #[error("invalid resource path '{path}': {message}")]
    #[diagnostic(code(buildcache::tree::invalid_path))]
    InvalidPath {
        /// The offending path
        path: String,
        /// Description of the violation
        message: String,
    },

    /// A cached tree object could not be restored
    #[error("failed to restore hash tree from cache: {message}")]
    #[diagnostic(code(buildcache::tree::cache_restore))]
    CacheRestore {
        /// Description of the failure
        message: String,
    },
}

impl Error {
    /// Build an [`Error::PrefixCollision`]
    #[must_use]
    pub fn prefix_collision(path: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::PrefixCollision {
            path: path.into(),
            prefix: prefix.into(),
        }
    }

    /// Build an [`Error::InvalidPath`]
    #[must_use]
    pub fn invalid_path(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Build an [`Error::CacheRestore`]
    #[must_use]
    pub fn cache_restore(message: impl Into<String>) -> Self {
        Self::CacheRestore {
            message: message.into(),
        }
    }
}

/// Result type for `buildcache-tree` operations
pub type Result<T> = std::result::Result<T, Error>;
