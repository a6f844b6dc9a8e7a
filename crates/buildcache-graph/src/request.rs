//! Requests: what a task asked to read, recorded independent of the answer.

use serde::{Deserialize, Serialize};

/// The domain and shape of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RequestKind {
    /// An exact project-domain path
    Path,
    /// A project-domain glob pattern
    Patterns,
    /// An exact dependency-domain path
    DepPath,
    /// A dependency-domain glob pattern
    DepPatterns,
}

/// A single recorded request: a domain/shape tag plus the path or pattern
/// value. Two requests are equal iff both fields match.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Request {
    /// What kind of request this is
    pub kind: RequestKind,
    /// The path or glob pattern requested
    pub value: String,
}

impl Request {
    /// Construct an exact-path request.
    #[must_use]
    pub fn path(value: impl Into<String>) -> Self {
        Self {
            kind: RequestKind::Path,
            value: value.into(),
        }
    }

    /// Construct a glob-pattern request.
    #[must_use]
    pub fn patterns(value: impl Into<String>) -> Self {
        Self {
            kind: RequestKind::Patterns,
            value: value.into(),
        }
    }

    /// Construct a dependency-domain exact-path request.
    #[must_use]
    pub fn dep_path(value: impl Into<String>) -> Self {
        Self {
            kind: RequestKind::DepPath,
            value: value.into(),
        }
    }

    /// Construct a dependency-domain glob-pattern request.
    #[must_use]
    pub fn dep_patterns(value: impl Into<String>) -> Self {
        Self {
            kind: RequestKind::DepPatterns,
            value: value.into(),
        }
    }

    /// Whether `changed_path` could plausibly be covered by this request —
    /// exact requests match by equality, pattern requests by glob.
    #[must_use]
    pub fn could_match(&self, changed_path: &str) -> bool {
        match self.kind {
            RequestKind::Path | RequestKind::DepPath => self.value == changed_path,
            RequestKind::Patterns | RequestKind::DepPatterns => {
                globset::Glob::new(&self.value)
                    .map(|g| g.compile_matcher().is_match(changed_path))
                    .unwrap_or(false)
            }
        }
    }
}

/// An ordered sequence of requests, as recorded by one task in one domain.
pub type RequestSet = Vec<Request>;
