//! The shared pipe state and its owner handle.
//!
//! All mutable state (ring indices, occupancy, both handle counts and the
//! owner flag) lives behind a single mutex. Two condition variables carry the
//! wakeups:
//!
//! - `data_available`: signalled when a push makes elements visible, and when
//!   the last producer goes away so consumers can observe end-of-stream.
//! - `space_available`: signalled when a pop frees slots, and when the last
//!   consumer goes away so blocked producers can re-check whether anyone can
//!   still drain the pipe.

use std::fmt;
use std::time::Instant;

use crate::error::{PipeError, PopError, PushError};
use crate::handle::{Consumer, PipeHandle, PipeRef, Producer};
use crate::ring::{DEFAULT_MIN_CAPACITY, RingBuffer};
use crate::sync::{Arc, Condvar, Mutex, MutexGuard};

/// Configuration for creating a pipe.
#[derive(Debug, Clone)]
pub struct PipeConfig {
    /// Maximum number of buffered elements, or 0 for no limit.
    pub limit: usize,
    /// Capacity allocated up front and kept when the pipe trims after a burst.
    pub min_capacity: usize,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            limit: 0,
            min_capacity: DEFAULT_MIN_CAPACITY,
        }
    }
}

impl PipeConfig {
    /// Default configuration with an occupancy limit.
    pub fn bounded(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }
}

pub(crate) struct State<T> {
    pub(crate) ring: RingBuffer<T>,
    pub(crate) producers: usize,
    pub(crate) consumers: usize,
    pub(crate) owner_released: bool,
}

impl<T> State<T> {
    /// Nobody holds a consumer and the owner can no longer create one.
    #[inline]
    fn unreadable(&self) -> bool {
        self.consumers == 0 && self.owner_released
    }
}

/// How a pop decides it has done enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PopMode {
    /// Keep waiting until the request is filled or the stream ends.
    Exact,
    /// Return as soon as anything was moved.
    Eager,
}

/// Result of one locked pop call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Popped {
    pub(crate) count: usize,
    /// The call saw an empty ring with no producers left.
    pub(crate) end_of_stream: bool,
}

pub(crate) struct Shared<T> {
    state: Mutex<State<T>>,
    space_available: Condvar,
    data_available: Condvar,
    limit: usize,
}

impl<T> Shared<T> {
    #[inline]
    pub(crate) fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock()
    }

    #[inline]
    pub(crate) fn limit(&self) -> usize {
        self.limit
    }

    pub(crate) fn acquire_producer(&self) {
        self.lock().producers += 1;
    }

    pub(crate) fn acquire_consumer(&self) {
        self.lock().consumers += 1;
    }

    pub(crate) fn release_producer(&self) {
        let mut state = self.lock();
        state.producers -= 1;
        if state.producers == 0 {
            tracing::debug!(buffered = state.ring.len(), "last producer released");
            self.data_available.notify_all();
        }
    }

    pub(crate) fn release_consumer(&self) {
        let mut state = self.lock();
        state.consumers -= 1;
        if state.consumers == 0 {
            tracing::debug!(buffered = state.ring.len(), "last consumer released");
            self.space_available.notify_all();
        }
    }

    fn release_owner(&self) {
        let mut state = self.lock();
        state.owner_released = true;
        tracing::debug!(
            producers = state.producers,
            consumers = state.consumers,
            "pipe owner released"
        );
        self.space_available.notify_all();
        self.data_available.notify_all();
    }

    /// Wait on `condvar`, or until `deadline` if one is given.
    ///
    /// Returns `false` once the deadline has passed.
    fn wait(
        condvar: &Condvar,
        state: &mut MutexGuard<'_, State<T>>,
        deadline: Option<Instant>,
    ) -> bool {
        match deadline {
            None => {
                condvar.wait(state);
                true
            }
            Some(deadline) => !condvar.wait_until(state, deadline).timed_out(),
        }
    }

    /// Push every element of `source` (which yields `total` elements), in
    /// order, waiting for space whenever a bounded pipe is full.
    pub(crate) fn push_from<I>(
        &self,
        mut source: I,
        total: usize,
        deadline: Option<Instant>,
    ) -> Result<(), PushError>
    where
        I: Iterator<Item = T>,
    {
        let mut pushed = 0;
        let mut state = self.lock();

        while pushed < total {
            if state.unreadable() {
                tracing::warn!(pushed, total, "push refused: pipe has no consumers left");
                return Err(PushError::Disconnected { pushed });
            }

            let room = state.ring.room();
            if room == 0 {
                tracing::trace!(pushed, total, "push waiting for space");
                if !Self::wait(&self.space_available, &mut state, deadline)
                    && state.ring.room() == 0
                {
                    return Err(PushError::Timeout { pushed });
                }
                continue;
            }

            let batch = room.min(total - pushed);
            state
                .ring
                .grow_for(batch)
                .map_err(|source| PushError::Alloc { pushed, source })?;
            let appended = state.ring.extend_from(&mut source, batch);
            if appended == 0 {
                break;
            }
            pushed += appended;
            self.data_available.notify_all();
        }

        Ok(())
    }

    /// Move elements out of the ring into `sink`, up to `want` of them.
    pub(crate) fn pop_with(
        &self,
        want: usize,
        mode: PopMode,
        deadline: Option<Instant>,
        mut sink: impl FnMut(T),
    ) -> Result<Popped, PopError> {
        let mut popped = 0;
        let mut end_of_stream = false;
        let mut state = self.lock();

        while popped < want {
            if state.ring.is_empty() {
                if state.producers == 0 {
                    end_of_stream = true;
                    break;
                }
                tracing::trace!(popped, want, "pop waiting for data");
                if !Self::wait(&self.data_available, &mut state, deadline)
                    && state.ring.is_empty()
                    && state.producers > 0
                {
                    return Err(PopError::Timeout { popped });
                }
                continue;
            }

            popped += state.ring.drain_with(want - popped, &mut sink);
            self.space_available.notify_all();
            if mode == PopMode::Eager {
                break;
            }
        }

        if state.ring.trim() {
            tracing::trace!(capacity = state.ring.capacity(), "trimmed ring");
        }

        Ok(Popped {
            count: popped,
            end_of_stream,
        })
    }
}

/// A growable, blocking, multi-producer multi-consumer pipe.
///
/// `Pipe` is the owner handle: it creates [`Producer`]s and [`Consumer`]s and
/// answers the generic queries in [`PipeHandle`], but moves no data itself.
/// Dropping it means no further handles will be created; the storage lives
/// on until the last handle is dropped too.
///
/// # Example
///
/// ```rust
/// use bufpipe::Pipe;
///
/// let pipe = Pipe::<u32>::new(0).unwrap();
/// let producer = pipe.producer();
/// let mut consumer = pipe.consumer();
/// drop(pipe);
///
/// producer.push(&[1, 2, 3]).unwrap();
/// drop(producer);
///
/// let mut out = [0; 8];
/// assert_eq!(consumer.pop(&mut out), 3);
/// assert_eq!(&out[..3], &[1, 2, 3]);
/// assert_eq!(consumer.pop(&mut out), 0);
/// ```
pub struct Pipe<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Pipe<T> {
    /// Create a pipe holding at most `limit` elements (0 for unbounded).
    pub fn new(limit: usize) -> Result<Self, PipeError> {
        Self::with_config(PipeConfig::bounded(limit))
    }

    /// Create a pipe from an explicit configuration.
    pub fn with_config(config: PipeConfig) -> Result<Self, PipeError> {
        if std::mem::size_of::<T>() == 0 {
            return Err(PipeError::ZeroSizedElement);
        }

        let ring = RingBuffer::new(config.min_capacity, config.limit)?;
        tracing::debug!(
            elem_size = std::mem::size_of::<T>(),
            limit = config.limit,
            capacity = ring.capacity(),
            "created pipe"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    ring,
                    producers: 0,
                    consumers: 0,
                    owner_released: false,
                }),
                space_available: Condvar::new(),
                data_available: Condvar::new(),
                limit: config.limit,
            }),
        })
    }

    /// Create a handle that can push into this pipe.
    pub fn producer(&self) -> Producer<T> {
        Producer::attach(self.shared.clone())
    }

    /// Create a handle that can pop from this pipe.
    pub fn consumer(&self) -> Consumer<T> {
        Consumer::attach(self.shared.clone())
    }

    /// Number of live producer handles.
    pub fn producer_count(&self) -> usize {
        self.shared.lock().producers
    }

    /// Number of live consumer handles.
    pub fn consumer_count(&self) -> usize {
        self.shared.lock().consumers
    }
}

impl<T> PipeHandle for Pipe<T> {
    type Item = T;

    fn pipe_ref(&self) -> PipeRef<'_, T> {
        PipeRef::new(&self.shared)
    }
}

impl<T> Drop for Pipe<T> {
    fn drop(&mut self) {
        self.shared.release_owner();
    }
}

impl<T> fmt::Debug for Pipe<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("Pipe")
            .field("elem_size", &std::mem::size_of::<T>())
            .field("limit", &self.shared.limit)
            .field("len", &state.ring.len())
            .field("capacity", &state.ring.capacity())
            .field("reserved", &state.ring.min_capacity())
            .field("producers", &state.producers)
            .field("consumers", &state.consumers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_sized_elements_rejected() {
        let err = Pipe::<()>::new(0).unwrap_err();
        assert_eq!(err, PipeError::ZeroSizedElement);
    }

    #[test]
    fn test_handle_counts() {
        let pipe = Pipe::<u8>::new(0).unwrap();
        assert_eq!(pipe.producer_count(), 0);

        let p1 = pipe.producer();
        let p2 = p1.clone();
        let c1 = pipe.consumer();
        assert_eq!(pipe.producer_count(), 2);
        assert_eq!(pipe.consumer_count(), 1);

        drop(p1);
        assert_eq!(pipe.producer_count(), 1);
        drop(p2);
        drop(c1);
        assert_eq!(pipe.producer_count(), 0);
        assert_eq!(pipe.consumer_count(), 0);
    }

    #[test]
    fn test_storage_outlives_owner() {
        let pipe = Pipe::<String>::new(0).unwrap();
        let producer = pipe.producer();
        let mut consumer = pipe.consumer();
        drop(pipe);

        producer.push(&["a".to_string(), "b".to_string()]).unwrap();
        drop(producer);
        assert_eq!(consumer.pop_vec(4), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_storage_freed_after_last_reference() {
        let marker = std::sync::Arc::new(());
        let pipe = Pipe::new(0).unwrap();
        let producer = pipe.producer();
        let consumer = pipe.consumer();
        producer.push(&[marker.clone(), marker.clone()]).unwrap();
        assert_eq!(std::sync::Arc::strong_count(&marker), 3);

        drop(pipe);
        drop(producer);
        assert_eq!(std::sync::Arc::strong_count(&marker), 3);
        drop(consumer);
        assert_eq!(std::sync::Arc::strong_count(&marker), 1);
    }

    #[test]
    fn test_debug_output() {
        let pipe = Pipe::<u64>::new(4).unwrap();
        let text = format!("{:?}", pipe);
        assert!(text.contains("elem_size: 8"));
        assert!(text.contains("limit: 4"));
    }
}
