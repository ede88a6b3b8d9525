//! Growable blocking pipe for moving elements between threads.
//!
//! A [`Pipe`] is a lock-protected ring buffer shared by any number of
//! [`Producer`] and [`Consumer`] handles. Producers push (blocking while a
//! bounded pipe is full); consumers pop (blocking while the pipe is empty and
//! producers remain). Elements come out in the order they went in, across all
//! handles.
//!
//! # Handles and end-of-stream
//!
//! - The owner [`Pipe`] creates handles. Dropping it means no more handles
//!   will be created.
//! - Dropping the last [`Producer`] ends the stream: once the buffer drains,
//!   every pop returns 0 and the consumer becomes [`ConsumerState::Drained`].
//! - The storage is freed when the owner and every handle are gone.
//!
//! # Pop variants
//!
//! - [`Consumer::pop`] waits until the destination is full or the stream ends.
//! - [`Consumer::pop_eager`] returns as soon as anything is available.
//!
//! Both have `*_timeout` forms that give up at a deadline; the plain forms
//! block indefinitely.
//!
//! # Loom Testing
//!
//! Enable the `loom` feature to model-check the wakeup protocol:
//!
//! ```text
//! cargo test -p bufpipe --features loom --lib
//! ```

pub mod error;
pub mod handle;
pub mod pipe;
mod ring;
pub mod sync;

pub use error::{PipeError, PopError, PushError};
pub use handle::{Consumer, ConsumerState, PipeHandle, PipeRef, Producer};
pub use pipe::{Pipe, PipeConfig};
pub use ring::DEFAULT_MIN_CAPACITY;
