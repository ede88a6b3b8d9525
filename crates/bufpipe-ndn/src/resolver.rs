//! The "resolve by name" seam.

use std::collections::HashMap;
use std::io;

use bufpipe::Producer;

use crate::error::push_error;

/// Fetches the content published under a name and pushes it into a pipe.
///
/// `resolve` runs on the stream's worker thread. It may push any number of
/// chunks over any length of time and then return; the worker drops `sink`
/// afterwards, which is what lets the reader see end-of-stream. If the reader
/// closes early, pushes fail with [`PushError::Disconnected`] and the
/// resolver should return.
///
/// [`PushError::Disconnected`]: bufpipe::PushError::Disconnected
pub trait NameResolver: Send + Sync + 'static {
    fn resolve(&self, name: &str, sink: &Producer<u8>) -> io::Result<()>;
}

impl<F> NameResolver for F
where
    F: Fn(&str, &Producer<u8>) -> io::Result<()> + Send + Sync + 'static,
{
    fn resolve(&self, name: &str, sink: &Producer<u8>) -> io::Result<()> {
        self(name, sink)
    }
}

/// Resolver over an in-memory table of names, pushing fixed-size chunks.
#[derive(Debug, Clone)]
pub struct MemoryResolver {
    entries: HashMap<String, Vec<u8>>,
    chunk_size: usize,
}

impl MemoryResolver {
    pub const DEFAULT_CHUNK_SIZE: usize = 4096;

    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
        }
    }

    /// Publish `content` under `name`.
    pub fn insert(&mut self, name: impl Into<String>, content: impl Into<Vec<u8>>) -> &mut Self {
        self.entries.insert(name.into(), content.into());
        self
    }

    /// Push content in chunks of `chunk_size` bytes (at least 1).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

impl Default for MemoryResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl NameResolver for MemoryResolver {
    fn resolve(&self, name: &str, sink: &Producer<u8>) -> io::Result<()> {
        let content = self.entries.get(name).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no content for {}", name))
        })?;

        for chunk in content.chunks(self.chunk_size) {
            sink.push(chunk).map_err(push_error)?;
        }
        Ok(())
    }
}
