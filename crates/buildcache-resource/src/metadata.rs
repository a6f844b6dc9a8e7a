//! Bounded source metadata carried alongside a [`crate::Resource`]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A metadata value constrained to string or boolean, per spec: extras beyond
/// the three named fields may only hold these two types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// A string-valued extra
    String(String),
    /// A boolean-valued extra
    Bool(bool),
}

const RESERVED_EXTRA_KEYS: [&str; 3] = ["adapter", "fsPath", "contentModified"];

/// Bounded key-set metadata describing where a resource's content came from.
///
/// Fields beyond `adapter`, `fs_path`, and `content_modified` are permitted
/// only through `extra`, and only with string or boolean values — an
/// unconstrained map would let callers smuggle arbitrary typed data through
/// the cache, defeating the point of a bounded contract.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Name of the adapter that produced this resource
    pub adapter: Option<String>,
    /// Original filesystem path, if the resource originated from disk
    pub fs_path: Option<PathBuf>,
    /// Whether the adapter considers the content modified relative to its source
    pub content_modified: Option<bool>,
    /// Additional string|boolean metadata
    pub extra: BTreeMap<String, MetadataValue>,
}

impl SourceMetadata {
    /// Construct metadata, rejecting `extra` keys that shadow the named fields.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidResource`] if `extra` reuses a reserved key.
    pub fn new(
        adapter: Option<String>,
        fs_path: Option<PathBuf>,
        content_modified: Option<bool>,
        extra: BTreeMap<String, MetadataValue>,
    ) -> crate::Result<Self> {
        for key in extra.keys() {
            if RESERVED_EXTRA_KEYS.contains(&key.as_str()) {
                return Err(crate::Error::invalid(format!(
                    "sourceMetadata.extra cannot reuse reserved key '{key}'"
                )));
            }
        }
        Ok(Self {
            adapter,
            fs_path,
            content_modified,
            extra,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_reserved_extra_key() {
        let mut extra = BTreeMap::new();
        extra.insert("adapter".to_string(), MetadataValue::String("x".into()));
        assert!(SourceMetadata::new(None, None, None, extra).is_err());
    }

    #[test]
    fn accepts_non_reserved_extras() {
        let mut extra = BTreeMap::new();
        extra.insert("cacheable".to_string(), MetadataValue::Bool(true));
        assert!(SourceMetadata::new(None, None, None, extra).is_ok());
    }
}
