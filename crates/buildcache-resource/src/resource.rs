//! Lazy, concurrency-disciplined content carrier for a single build resource.

use crate::metadata::SourceMetadata;
use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

const CONTENT_LOCK_TIMEOUT: Duration = Duration::from_millis(100);
const DRAINED_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A factory that produces buffer bytes on demand.
pub type BufferFactory = Arc<dyn Fn() -> std::io::Result<Vec<u8>> + Send + Sync>;
/// A factory that produces a fresh readable stream on demand.
pub type StreamFactory = Arc<dyn Fn() -> std::io::Result<Box<dyn Read + Send>> + Send + Sync>;

/// Declared filesystem-ish statistics, independent of whether content has
/// been materialized yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatInfo {
    /// Declared byte size, if known ahead of materialization
    pub byte_size: Option<u64>,
    /// Last-modified timestamp, milliseconds since the Unix epoch
    pub last_modified: Option<i64>,
    /// Inode number, when the resource originates from a real filesystem
    pub inode: Option<u64>,
}

impl StatInfo {
    fn validate(self) -> Result<()> {
        if let Some(bs) = self.byte_size {
            if bs == 0 {
                return Err(Error::invalid("byteSize must be positive"));
            }
        }
        if let Some(lm) = self.last_modified {
            if lm <= 0 {
                return Err(Error::invalid("lastModified must be positive"));
            }
        }
        Ok(())
    }
}

/// The content a [`Resource`] is constructed with. Exactly one non-`None`
/// variant may be supplied, per the spec's single-content-parameter invariant.
pub enum ContentParam {
    /// Content is fully available in memory
    Buffer(Vec<u8>),
    /// Content is fully available as a UTF-8 string
    String(String),
    /// Content is a single-consumer stream
    Stream(Box<dyn Read + Send>),
    /// Content is produced on demand by a buffer/stream factory pair
    Factory {
        /// Produces the full buffer on demand
        create_buffer: BufferFactory,
        /// Produces a fresh stream on demand
        create_stream: StreamFactory,
    },
    /// No content (e.g. a directory)
    None,
}

enum ContentState {
    Buffer(Vec<u8>),
    Stream(Box<dyn Read + Send>),
    Drained,
    Factory {
        buffer: BufferFactory,
        stream: StreamFactory,
    },
    InTransformation,
    None,
}

/// The outcome a `modify_stream` callback may install as new content.
pub enum TransformResult {
    /// Replace content with a fully materialized buffer
    Buffer(Vec<u8>),
    /// Replace content with a new single-consumer stream
    Stream(Box<dyn Read + Send>),
}

/// An immutable virtual path plus lazily-materialized content.
///
/// A `Resource` is the unit the cache hashes and deduplicates. Content
/// access is protected by a per-resource lock with the timeout and polling
/// discipline described in the crate's concurrency model.
pub struct Resource {
    path: Mutex<String>,
    original_path: String,
    is_directory: bool,
    stat: StatInfo,
    source_metadata: Option<SourceMetadata>,
    content: Arc<Mutex<ContentState>>,
    modified: Mutex<bool>,
}

impl Resource {
    /// Construct a new resource.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidResource`] if `path` is not absolute, if
    /// `stat` declares an invalid size/timestamp, or if `is_directory` is
    /// combined with non-empty content.
    pub fn new(
        path: impl Into<String>,
        content: ContentParam,
        is_directory: bool,
        stat: StatInfo,
        source_metadata: Option<SourceMetadata>,
    ) -> Result<Self> {
        let path = normalize_path(path.into())?;
        stat.validate()?;

        if is_directory && !matches!(content, ContentParam::None) {
            return Err(Error::invalid("directory resources cannot carry content"));
        }

        let state = match content {
            ContentParam::Buffer(b) => ContentState::Buffer(b),
            ContentParam::String(s) => ContentState::Buffer(s.into_bytes()),
            ContentParam::Stream(s) => ContentState::Stream(s),
            ContentParam::Factory {
                create_buffer,
                create_stream,
            } => ContentState::Factory {
                buffer: create_buffer,
                stream: create_stream,
            },
            ContentParam::None => ContentState::None,
        };

        Ok(Self {
            original_path: path.clone(),
            path: Mutex::new(path),
            is_directory,
            stat,
            source_metadata,
            content: Arc::new(Mutex::new(state)),
            modified: Mutex::new(false),
        })
    }

    fn lock_content(&self) -> Result<MutexGuard<'_, ContentState>> {
        try_lock_with_timeout(&self.content, &self.get_path())
    }

    /// Resolve content to an owned buffer, materializing from stream or
    /// factory content on demand.
    ///
    /// # Errors
    ///
    /// Returns an error if content is drained, mid-transformation, a
    /// factory/stream read fails, or the observed byte count disagrees
    /// with a declared [`StatInfo::byte_size`].
    pub fn get_buffer(&self) -> Result<Vec<u8>> {
        let mut guard = self.lock_content()?;
        match &mut *guard {
            ContentState::Buffer(b) => Ok(b.clone()),
            ContentState::Factory { buffer, .. } => {
                let data = buffer().map_err(|e| self.io_err(e, "factory-read"))?;
                self.check_declared_size(&data)?;
                Ok(data)
            }
            ContentState::Stream(_) => {
                let ContentState::Stream(mut s) = std::mem::replace(&mut *guard, ContentState::Drained)
                else {
                    unreachable!("matched above")
                };
                let mut data = Vec::new();
                s.read_to_end(&mut data)
                    .map_err(|e| self.io_err(e, "stream-read"))?;
                self.check_declared_size(&data)?;
                Ok(data)
            }
            ContentState::Drained => Err(Error::invalid("content is drained")),
            ContentState::InTransformation => {
                Err(Error::invalid("content is mid-transformation"))
            }
            ContentState::None => Ok(Vec::new()),
        }
    }

    /// Like [`Self::get_buffer`] but polls past a `Drained` state for up to
    /// the documented timeout, in case a concurrent operation is about to
    /// restore content.
    ///
    /// # Errors
    ///
    /// Returns an error under the same conditions as [`Self::get_buffer`],
    /// plus a timeout if content remains drained past the poll window.
    pub fn get_buffer_async(&self) -> Result<Vec<u8>> {
        self.await_drained()?;
        self.get_buffer()
    }

    /// Decode buffer content as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not valid UTF-8, or under the
    /// same conditions as [`Self::get_buffer`].
    pub fn get_string(&self) -> Result<String> {
        let buf = self.get_buffer()?;
        String::from_utf8(buf).map_err(|_| Error::invalid("content is not valid UTF-8"))
    }

    /// Return a readable stream, consuming single-use stream content.
    ///
    /// Content that was a one-shot `Stream` transitions to `Drained` after
    /// this call; `Buffer` and `Factory` content support repeated reads.
    ///
    /// # Errors
    ///
    /// Returns an error if content is drained or mid-transformation.
    pub fn get_stream(&self) -> Result<Box<dyn Read + Send>> {
        let mut guard = self.lock_content()?;
        match &mut *guard {
            ContentState::Buffer(b) => Ok(Box::new(Cursor::new(b.clone()))),
            ContentState::Factory { stream, .. } => {
                stream().map_err(|e| self.io_err(e, "factory-stream"))
            }
            ContentState::Stream(_) => {
                let ContentState::Stream(s) = std::mem::replace(&mut *guard, ContentState::Drained)
                else {
                    unreachable!("matched above")
                };
                Ok(s)
            }
            ContentState::Drained => Err(Error::invalid("content is drained")),
            ContentState::InTransformation => {
                Err(Error::invalid("content is mid-transformation"))
            }
            ContentState::None => Ok(Box::new(Cursor::new(Vec::new()))),
        }
    }

    /// Like [`Self::get_stream`] but awaits any in-flight transformation and
    /// any drained-to-restored transition.
    ///
    /// # Errors
    ///
    /// Returns an error under the same conditions as [`Self::get_stream`].
    pub fn get_stream_async(&self) -> Result<Box<dyn Read + Send>> {
        self.await_drained()?;
        self.get_stream()
    }

    fn await_drained(&self) -> Result<()> {
        let start = Instant::now();
        loop {
            {
                let guard = self.lock_content()?;
                if !matches!(*guard, ContentState::Drained | ContentState::InTransformation) {
                    return Ok(());
                }
            }
            if start.elapsed() >= CONTENT_LOCK_TIMEOUT {
                return Err(Error::Timeout {
                    path: PathBuf::from(self.get_path()),
                });
            }
            thread::sleep(DRAINED_POLL_INTERVAL);
        }
    }

    /// Replace content with an in-memory buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if content is currently mid-transformation.
    pub fn set_buffer(&self, data: Vec<u8>) -> Result<()> {
        self.set_content(ContentState::Buffer(data))
    }

    /// Replace content with a UTF-8 string, stored as its byte encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if content is currently mid-transformation.
    pub fn set_string(&self, data: String) -> Result<()> {
        self.set_content(ContentState::Buffer(data.into_bytes()))
    }

    /// Replace content with a single-consumer stream.
    ///
    /// # Errors
    ///
    /// Returns an error if content is currently mid-transformation.
    pub fn set_stream(&self, stream: Box<dyn Read + Send>) -> Result<()> {
        self.set_content(ContentState::Stream(stream))
    }

    /// Replace content with a repeatable stream factory.
    ///
    /// # Errors
    ///
    /// Returns an error if content is currently mid-transformation.
    pub fn set_stream_factory(&self, factory: StreamFactory, buffer: BufferFactory) -> Result<()> {
        self.set_content(ContentState::Factory {
            buffer,
            stream: factory,
        })
    }

    fn set_content(&self, new_state: ContentState) -> Result<()> {
        let mut guard = self.lock_content()?;
        if matches!(*guard, ContentState::InTransformation) {
            return Err(Error::invalid(
                "cannot mutate content while a transformation is in flight",
            ));
        }
        *guard = new_state;
        drop(guard);
        *self.modified.lock().unwrap_or_else(|p| p.into_inner()) = true;
        Ok(())
    }

    /// Atomically transform content: acquires the content lock, hands the
    /// caller a readable stream of the current content, and installs
    /// whatever the callback returns as the new content.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be acquired, the callback fails,
    /// or content is already mid-transformation.
    pub fn modify_stream<F>(&self, transform: F) -> Result<()>
    where
        F: FnOnce(Box<dyn Read + Send>) -> Result<TransformResult>,
    {
        let current_stream = {
            let mut guard = self.lock_content()?;
            if matches!(*guard, ContentState::InTransformation) {
                return Err(Error::invalid("content is already mid-transformation"));
            }
            let taken = std::mem::replace(&mut *guard, ContentState::InTransformation);
            self.materialize_for_transform(taken)?
        };

        let result = transform(current_stream)?;

        let mut guard = self.lock_content()?;
        *guard = match result {
            TransformResult::Buffer(b) => ContentState::Buffer(b),
            TransformResult::Stream(s) => ContentState::Stream(s),
        };
        drop(guard);
        *self.modified.lock().unwrap_or_else(|p| p.into_inner()) = true;
        Ok(())
    }

    fn materialize_for_transform(&self, state: ContentState) -> Result<Box<dyn Read + Send>> {
        match state {
            ContentState::Buffer(b) => Ok(Box::new(Cursor::new(b))),
            ContentState::Stream(s) => Ok(s),
            ContentState::Factory { stream, .. } => {
                stream().map_err(|e| self.io_err(e, "factory-stream"))
            }
            ContentState::None => Ok(Box::new(Cursor::new(Vec::new()))),
            ContentState::Drained => Err(Error::invalid("content is drained")),
            ContentState::InTransformation => {
                Err(Error::invalid("content is already mid-transformation"))
            }
        }
    }

    /// Compute the SHA-256 SRI integrity string (`"sha256-<base64>"`).
    ///
    /// # Errors
    ///
    /// Returns an error for directory resources, which have no content to hash.
    pub fn get_integrity(&self) -> Result<String> {
        if self.is_directory {
            return Err(Error::invalid("cannot compute integrity of a directory"));
        }
        let data = self.get_buffer()?;
        Ok(integrity_of(&data))
    }

    /// Declared byte size, if known.
    #[must_use]
    pub fn get_size(&self) -> Option<u64> {
        self.stat.byte_size
    }

    /// Whether a declared byte size is available.
    #[must_use]
    pub fn has_size(&self) -> bool {
        self.stat.byte_size.is_some()
    }

    /// Whether this resource represents a directory.
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    /// Current virtual path.
    #[must_use]
    pub fn get_path(&self) -> String {
        self.path.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Move the resource to a new absolute virtual path.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_path` is not absolute.
    pub fn set_path(&self, new_path: impl Into<String>) -> Result<()> {
        let normalized = normalize_path(new_path.into())?;
        *self.path.lock().unwrap_or_else(|p| p.into_inner()) = normalized;
        *self.modified.lock().unwrap_or_else(|p| p.into_inner()) = true;
        Ok(())
    }

    /// The path this resource was constructed with.
    #[must_use]
    pub fn get_original_path(&self) -> &str {
        &self.original_path
    }

    /// Declared last-modified timestamp, milliseconds since epoch.
    #[must_use]
    pub fn get_last_modified(&self) -> Option<i64> {
        self.stat.last_modified
    }

    /// Declared inode, if the resource came from a real filesystem.
    #[must_use]
    pub fn get_inode(&self) -> Option<u64> {
        self.stat.inode
    }

    /// Whether path or content has been mutated since construction.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        *self.modified.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Source metadata, if any.
    #[must_use]
    pub fn source_metadata(&self) -> Option<&SourceMetadata> {
        self.source_metadata.as_ref()
    }

    /// Clone this resource. Buffer and factory content are copied; a
    /// single-consumer stream (or a stream mid-transformation) cannot be
    /// duplicated, so the clone observes it as drained instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the content lock cannot be acquired.
    pub fn clone_resource(&self) -> Result<Self> {
        let guard = self.lock_content()?;
        let cloned_state = match &*guard {
            ContentState::Buffer(b) => ContentState::Buffer(b.clone()),
            ContentState::Factory { buffer, stream } => ContentState::Factory {
                buffer: Arc::clone(buffer),
                stream: Arc::clone(stream),
            },
            ContentState::Stream(_) | ContentState::Drained | ContentState::InTransformation => {
                ContentState::Drained
            }
            ContentState::None => ContentState::None,
        };
        drop(guard);

        Ok(Self {
            path: Mutex::new(self.get_path()),
            original_path: self.original_path.clone(),
            is_directory: self.is_directory,
            stat: self.stat,
            source_metadata: self.source_metadata.clone(),
            content: Arc::new(Mutex::new(cloned_state)),
            modified: Mutex::new(*self.modified.lock().unwrap_or_else(|p| p.into_inner())),
        })
    }

    fn check_declared_size(&self, data: &[u8]) -> Result<()> {
        if let Some(declared) = self.stat.byte_size {
            if data.len() as u64 != declared {
                return Err(Error::invalid(format!(
                    "observed {} bytes but declared byteSize was {declared}",
                    data.len()
                )));
            }
        }
        Ok(())
    }

    fn io_err(&self, source: std::io::Error, op: &str) -> Error {
        Error::io(source, self.get_path(), op)
    }
}

/// Compute the SHA-256 SRI integrity string for arbitrary bytes.
#[must_use]
pub fn integrity_of(data: &[u8]) -> String {
    use base64::Engine;
    let digest = Sha256::digest(data);
    format!("sha256-{}", base64::engine::general_purpose::STANDARD.encode(digest))
}

fn normalize_path(path: String) -> Result<String> {
    if !path.starts_with('/') {
        return Err(Error::invalid(format!(
            "resource path must be absolute, got '{path}'"
        )));
    }
    if path.len() > 1 && path.ends_with('/') {
        return Err(Error::invalid(format!(
            "resource path must not have a trailing slash, got '{path}'"
        )));
    }
    let mut normalized = String::with_capacity(path.len());
    let mut last_was_slash = false;
    for c in path.chars() {
        if c == '/' {
            if last_was_slash {
                continue;
            }
            last_was_slash = true;
        } else {
            last_was_slash = false;
        }
        normalized.push(c);
    }
    Ok(normalized)
}

fn try_lock_with_timeout<'a, T>(
    mutex: &'a Mutex<T>,
    path: &str,
) -> Result<MutexGuard<'a, T>> {
    let start = Instant::now();
    loop {
        match mutex.try_lock() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::Poisoned(p)) => return Ok(p.into_inner()),
            Err(TryLockError::WouldBlock) => {
                if start.elapsed() >= CONTENT_LOCK_TIMEOUT {
                    return Err(Error::Timeout {
                        path: PathBuf::from(path),
                    });
                }
                thread::sleep(DRAINED_POLL_INTERVAL);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat() -> StatInfo {
        StatInfo::default()
    }

    #[test]
    fn rejects_relative_path() {
        let err = Resource::new("rel/path", ContentParam::None, false, stat(), None);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_directory_with_content() {
        let err = Resource::new(
            "/dir",
            ContentParam::Buffer(vec![1]),
            true,
            stat(),
            None,
        );
        assert!(err.is_err());
    }

    #[test]
    fn buffer_round_trip() {
        let r = Resource::new(
            "/a.txt",
            ContentParam::Buffer(b"hello".to_vec()),
            false,
            stat(),
            None,
        )
        .unwrap();
        assert_eq!(r.get_buffer().unwrap(), b"hello");
        assert_eq!(r.get_string().unwrap(), "hello");
        // Buffer supports repeated reads
        assert_eq!(r.get_buffer().unwrap(), b"hello");
    }

    #[test]
    fn stream_drains_after_read() {
        let r = Resource::new(
            "/a.txt",
            ContentParam::Stream(Box::new(Cursor::new(b"hi".to_vec()))),
            false,
            stat(),
            None,
        )
        .unwrap();
        assert_eq!(r.get_buffer().unwrap(), b"hi");
        assert!(r.get_buffer().is_err());
    }

    #[test]
    fn set_buffer_restores_drained_content() {
        let r = Resource::new(
            "/a.txt",
            ContentParam::Stream(Box::new(Cursor::new(b"hi".to_vec()))),
            false,
            stat(),
            None,
        )
        .unwrap();
        let _ = r.get_buffer().unwrap();
        r.set_buffer(b"again".to_vec()).unwrap();
        assert_eq!(r.get_buffer().unwrap(), b"again");
        assert!(r.is_modified());
    }

    #[test]
    fn directory_has_no_integrity() {
        let r = Resource::new("/dir", ContentParam::None, true, stat(), None).unwrap();
        assert!(r.get_integrity().is_err());
    }

    #[test]
    fn integrity_matches_known_vector() {
        assert_eq!(
            integrity_of(b"Content"),
            "sha256-R70pB1+LgBnwvuxthr7afJv2eq8FBT3L4LO8tjloUX8="
        );
        assert_eq!(
            integrity_of(b""),
            "sha256-47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
        let big = vec![b'x'; 1_048_576];
        assert_eq!(
            integrity_of(&big),
            "sha256-j5kLoLV3tRzwCeoEk2jBa72hsh4bk74HqCR1i7JTw5s="
        );
    }

    #[test]
    fn declared_size_mismatch_fails() {
        let mut s = stat();
        s.byte_size = Some(99);
        let r = Resource::new(
            "/a.txt",
            ContentParam::Stream(Box::new(Cursor::new(b"short".to_vec()))),
            false,
            s,
            None,
        )
        .unwrap();
        assert!(r.get_buffer().is_err());
    }

    #[test]
    fn clone_does_not_share_drained_stream() {
        let r = Resource::new(
            "/a.txt",
            ContentParam::Stream(Box::new(Cursor::new(b"hi".to_vec()))),
            false,
            stat(),
            None,
        )
        .unwrap();
        let clone = r.clone_resource().unwrap();
        assert!(clone.get_buffer().is_err());
    }

    #[test]
    fn modify_stream_installs_new_content() {
        let r = Resource::new(
            "/a.txt",
            ContentParam::Buffer(b"old".to_vec()),
            false,
            stat(),
            None,
        )
        .unwrap();
        r.modify_stream(|mut s| {
            let mut buf = Vec::new();
            s.read_to_end(&mut buf).map_err(|e| Error::io(e, "/a.txt", "read"))?;
            buf.extend_from_slice(b"-new");
            Ok(TransformResult::Buffer(buf))
        })
        .unwrap();
        assert_eq!(r.get_buffer().unwrap(), b"old-new");
    }
}
