//! NDN byte-stream protocol over a [`bufpipe`] pipe.
//!
//! [`NdnStream::open`] starts one worker thread that resolves a name through a
//! [`NameResolver`] and pushes the fetched bytes into a pipe; reads pop from
//! the other end; [`NdnStream::close`] tears both down.
//!
//! ```rust
//! use std::io::Read;
//! use std::sync::Arc;
//!
//! use bufpipe_ndn::{MemoryResolver, NdnStream};
//!
//! let mut resolver = MemoryResolver::new();
//! resolver.insert("/hello", b"hello world".to_vec());
//!
//! let mut stream = NdnStream::open("ndn:/hello", Arc::new(resolver)).unwrap();
//! let mut text = String::new();
//! stream.read_to_string(&mut text).unwrap();
//! assert_eq!(text, "hello world");
//! stream.close().unwrap();
//! ```

mod error;
mod resolver;
mod stream;

pub use error::{NdnError, push_error};
pub use resolver::{MemoryResolver, NameResolver};
pub use stream::{NdnConfig, NdnStream, URI_PREFIX, strip_scheme};

/// Protocol name as registered with the host I/O layer.
pub const PROTOCOL_NAME: &str = "ndn";

/// Protocols this one may be nested under by default.
pub const DEFAULT_WHITELIST: &str = "ndn";
