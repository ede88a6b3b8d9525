use std::io;

use bufpipe::{PipeError, PushError};

/// Errors from opening or closing an NDN stream.
#[derive(Debug)]
pub enum NdnError {
    /// The URI named nothing after the scheme prefix.
    EmptyName,
    /// The byte pipe could not be created.
    Pipe(PipeError),
    /// The fetch worker thread could not be started.
    Spawn(io::Error),
    /// The fetch worker panicked.
    WorkerPanicked,
}

impl std::fmt::Display for NdnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "empty NDN name"),
            Self::Pipe(e) => write!(f, "pipe error: {}", e),
            Self::Spawn(e) => write!(f, "failed to spawn fetch worker: {}", e),
            Self::WorkerPanicked => write!(f, "fetch worker panicked"),
        }
    }
}

impl std::error::Error for NdnError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Pipe(e) => Some(e),
            Self::Spawn(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PipeError> for NdnError {
    fn from(e: PipeError) -> Self {
        Self::Pipe(e)
    }
}

impl From<NdnError> for io::Error {
    fn from(e: NdnError) -> Self {
        match e {
            NdnError::Spawn(inner) => inner,
            NdnError::EmptyName => io::Error::new(io::ErrorKind::InvalidInput, e),
            NdnError::Pipe(PipeError::AllocationFailed { .. }) => {
                io::Error::new(io::ErrorKind::OutOfMemory, e)
            }
            other => io::Error::other(other),
        }
    }
}

/// Convert a failed push into an I/O error so resolvers can use `?`.
///
/// A disconnected pipe maps to `BrokenPipe`: the reader closed the stream and
/// the resolver should stop fetching.
pub fn push_error(e: PushError) -> io::Error {
    let kind = match e {
        PushError::Disconnected { .. } => io::ErrorKind::BrokenPipe,
        PushError::Timeout { .. } => io::ErrorKind::TimedOut,
        PushError::Alloc { .. } => io::ErrorKind::OutOfMemory,
    };
    io::Error::new(kind, e)
}
