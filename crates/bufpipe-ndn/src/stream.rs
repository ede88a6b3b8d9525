//! Open/read/close over a byte pipe fed by a worker thread.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bufpipe::{Consumer, Pipe, PipeConfig, PipeHandle};
use parking_lot::Mutex;

use crate::error::NdnError;
use crate::resolver::NameResolver;

/// Scheme prefix stripped from URIs passed to [`NdnStream::open`].
pub const URI_PREFIX: &str = "ndn:";

/// Configuration for opening a stream.
#[derive(Debug, Clone)]
pub struct NdnConfig {
    /// Occupancy limit of the byte pipe, 0 for unbounded.
    pub limit: usize,
    /// Name given to the fetch worker thread.
    pub worker_name: String,
}

impl Default for NdnConfig {
    fn default() -> Self {
        Self {
            limit: 0,
            worker_name: "ndn-fetch".to_string(),
        }
    }
}

/// Strip the optional `ndn:` scheme prefix from `uri`.
pub fn strip_scheme(uri: &str) -> &str {
    uri.strip_prefix(URI_PREFIX).unwrap_or(uri)
}

/// A readable byte stream whose content is fetched by name in the background.
///
/// Opening creates an unbounded byte pipe, one producer handed to a single
/// worker thread running the [`NameResolver`], and one consumer kept here.
/// The worker drops its producer as soon as the resolver returns, so reads
/// see end-of-stream once everything fetched has been consumed.
pub struct NdnStream {
    name: String,
    pipe: Option<Pipe<u8>>,
    consumer: Option<Consumer<u8>>,
    worker: Option<JoinHandle<()>>,
    /// Resolver failure, stored before the worker releases its producer.
    failure: Arc<Mutex<Option<io::Error>>>,
}

impl NdnStream {
    /// Open `uri` with the default configuration.
    pub fn open(uri: &str, resolver: Arc<dyn NameResolver>) -> Result<Self, NdnError> {
        Self::open_with_config(uri, resolver, NdnConfig::default())
    }

    pub fn open_with_config(
        uri: &str,
        resolver: Arc<dyn NameResolver>,
        config: NdnConfig,
    ) -> Result<Self, NdnError> {
        let name = strip_scheme(uri);
        if name.is_empty() {
            return Err(NdnError::EmptyName);
        }
        let name = name.to_string();

        let pipe = Pipe::<u8>::with_config(PipeConfig::bounded(config.limit))?;
        let producer = pipe.producer();
        let failure = Arc::new(Mutex::new(None));

        let worker = {
            let name = name.clone();
            let failure = failure.clone();
            thread::Builder::new()
                .name(config.worker_name)
                .spawn(move || {
                    tracing::debug!(%name, "fetch started");
                    let result = resolver.resolve(&name, &producer);
                    if let Err(e) = result {
                        tracing::warn!(%name, error = %e, "fetch failed");
                        *failure.lock() = Some(e);
                    } else {
                        tracing::debug!(%name, "fetch finished");
                    }
                    drop(producer);
                })
                .map_err(NdnError::Spawn)?
        };

        let consumer = pipe.consumer();
        Ok(Self {
            name,
            pipe: Some(pipe),
            consumer: Some(consumer),
            worker: Some(worker),
            failure,
        })
    }

    /// The name being fetched, without the scheme prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bytes fetched but not yet read.
    pub fn available(&self) -> usize {
        self.consumer.as_ref().map_or(0, |c| c.used_size())
    }

    /// Read up to `buf.len()` bytes, blocking only until some are available.
    ///
    /// Returns 0 at end of stream. If the resolver failed, its error is
    /// returned once, after every byte it did push has been read.
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let consumer = self
            .consumer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "stream is closed"))?;

        let n = consumer.pop_eager(buf);
        if n == 0
            && consumer.is_drained()
            && let Some(e) = self.failure.lock().take()
        {
            return Err(e);
        }
        Ok(n)
    }

    /// Release the pipe and wait for the worker to finish.
    pub fn close(mut self) -> Result<(), NdnError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), NdnError> {
        // Once both are gone, pending and future pushes from the worker fail
        // with `Disconnected`, so a well-behaved resolver returns promptly.
        self.consumer.take();
        self.pipe.take();

        match self.worker.take() {
            Some(worker) => worker.join().map_err(|_| NdnError::WorkerPanicked),
            None => Ok(()),
        }
    }
}

impl io::Read for NdnStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        NdnStream::read(self, buf)
    }
}

impl Drop for NdnStream {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(name = %self.name, error = %e, "NDN stream closed with error");
        }
    }
}

impl std::fmt::Debug for NdnStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NdnStream")
            .field("name", &self.name)
            .field("open", &self.consumer.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_scheme() {
        assert_eq!(strip_scheme("ndn:/video/seg1"), "/video/seg1");
        assert_eq!(strip_scheme("/video/seg1"), "/video/seg1");
        assert_eq!(strip_scheme("ndn:"), "");
    }

    #[test]
    fn test_empty_name_rejected() {
        let resolver: Arc<dyn NameResolver> =
            Arc::new(|_: &str, _: &bufpipe::Producer<u8>| Ok::<(), io::Error>(()));
        let err = NdnStream::open("ndn:", resolver).unwrap_err();
        assert!(matches!(err, NdnError::EmptyName));
    }
}
