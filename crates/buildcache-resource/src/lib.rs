//! Lazy resource content and ordered glob filtering.
//!
//! This crate provides the two leaf abstractions the rest of the build
//! cache is built on: a [`Resource`], which carries lazily-materialized
//! content behind a small concurrency discipline, and a [`FilterList`],
//! which applies ordered include/exclude/negate glob rules to resource
//! paths.

mod error;
mod filter;
mod metadata;
mod reader;
mod resource;

pub use error::{Error, Result};
pub use filter::{FilterList, FilterRule, GlobPatterns};
pub use metadata::{MetadataValue, SourceMetadata};
pub use reader::{Reader, Writer};
pub use resource::{
    integrity_of, BufferFactory, ContentParam, Resource, StatInfo, StreamFactory, TransformResult,
};
