//! Error types for resource construction and access

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Error type for `buildcache-resource` operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A resource was constructed with an invalid parameter combination
    #[error("Invalid resource: {message}")]
    #[diagnostic(code(buildcache::resource::invalid))]
    InvalidResource {
        /// Description of the violated invariant
        message: String,
    },

    /// Content access contended for longer than the documented timeout
    #[error("Timed out waiting for content lock on {path}")]
    #[diagnostic(
        code(buildcache::resource::timeout),
        help("Another operation is holding the resource's content lock; retry the operation")
    )]
    Timeout {
        /// Path of the resource whose lock could not be acquired
        path: PathBuf,
    },

    /// A filter pattern could not be compiled
    #[error("Invalid glob pattern '{pattern}': {message}")]
    #[diagnostic(code(buildcache::resource::pattern))]
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// Underlying compiler message
        message: String,
    },

    /// I/O error while materializing content
    #[error("I/O {operation} failed: {path}")]
    #[diagnostic(code(buildcache::resource::io))]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error
        path: PathBuf,
        /// Operation that failed (e.g. "read", "write")
        operation: String,
    },
}

impl Error {
    /// Build an [`Error::InvalidResource`]
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidResource {
            message: message.into(),
        }
    }

    /// Build an [`Error::InvalidPattern`]
    #[must_use]
    pub fn invalid_pattern(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            message: message.into(),
        }
    }

    /// Build an [`Error::Io`]
    #[must_use]
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: path.into(),
            operation: operation.into(),
        }
    }
}

/// Result type for `buildcache-resource` operations
pub type Result<T> = std::result::Result<T, Error>;
