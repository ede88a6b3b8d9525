//! Producer and consumer handles.
//!
//! Each handle holds one unit of the pipe's producer or consumer count for as
//! long as it lives. Creating one is a count increment under the lock;
//! dropping one is the matching decrement, plus the wakeup when the count
//! reaches zero. Because release happens in `Drop`, a handle is released
//! exactly once on every exit path and cannot be used afterwards.

use std::fmt;
use std::time::{Duration, Instant};

use crate::error::{PipeError, PopError, PushError};
use crate::pipe::{PopMode, Popped, Shared};
use crate::sync::Arc;

/// Borrowed view of a pipe's shared state, handed out by [`PipeHandle`].
///
/// Only this crate can construct one, which keeps [`PipeHandle`] sealed.
pub struct PipeRef<'a, T> {
    shared: &'a Shared<T>,
}

impl<'a, T> PipeRef<'a, T> {
    pub(crate) fn new(shared: &'a Shared<T>) -> Self {
        Self { shared }
    }
}

/// Operations available on the pipe owner and on both handle kinds.
pub trait PipeHandle {
    /// Element type carried by the pipe.
    type Item;

    #[doc(hidden)]
    fn pipe_ref(&self) -> PipeRef<'_, Self::Item>;

    /// Size in bytes of one element.
    fn elem_size(&self) -> usize {
        std::mem::size_of::<Self::Item>()
    }

    /// Number of buffered elements.
    ///
    /// This is a snapshot; with other threads active it may be stale as
    /// soon as it returns.
    fn used_size(&self) -> usize {
        self.pipe_ref().shared.lock().ring.len()
    }

    /// Number of allocated slots.
    fn capacity(&self) -> usize {
        self.pipe_ref().shared.lock().ring.capacity()
    }

    /// Occupancy limit, 0 if unbounded.
    fn limit(&self) -> usize {
        self.pipe_ref().shared.limit()
    }

    /// Make room for at least `count` elements and keep that much allocated
    /// from now on. Does nothing if enough is already allocated.
    ///
    /// `reserve(0)` resets the reservation to the pipe's default minimum;
    /// buffered elements are kept.
    fn reserve(&self, count: usize) -> Result<(), PipeError> {
        self.pipe_ref().shared.lock().ring.reserve(count)
    }
}

/// Deadline `timeout` from now, or `None` (wait indefinitely) when that is
/// past the end of the clock.
fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// Handle that pushes elements into a pipe.
///
/// Cloning creates another producer. The pipe's consumers see end-of-stream
/// once every producer is dropped and the buffer is empty.
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Producer<T> {
    pub(crate) fn attach(shared: Arc<Shared<T>>) -> Self {
        shared.acquire_producer();
        Self { shared }
    }

    /// Push a copy of `elems`, blocking while a bounded pipe is full.
    ///
    /// Fails only with [`PushError::Disconnected`] when every consumer is gone
    /// and the owner can no longer create one, or [`PushError::Alloc`] when
    /// the ring cannot grow.
    pub fn push(&self, elems: &[T]) -> Result<(), PushError>
    where
        T: Clone,
    {
        self.shared.push_from(elems.iter().cloned(), elems.len(), None)
    }

    /// Like [`push`](Self::push), but gives up once `timeout` has elapsed.
    pub fn push_timeout(&self, elems: &[T], timeout: Duration) -> Result<(), PushError>
    where
        T: Clone,
    {
        self.shared
            .push_from(elems.iter().cloned(), elems.len(), deadline_after(timeout))
    }

    /// Push the elements of `elems` by value.
    pub fn push_vec(&self, elems: Vec<T>) -> Result<(), PushError> {
        let total = elems.len();
        self.shared.push_from(elems.into_iter(), total, None)
    }

    /// Push every element yielded by `elems` by value.
    pub fn push_iter<I>(&self, elems: I) -> Result<(), PushError>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: ExactSizeIterator,
    {
        let elems = elems.into_iter();
        let total = elems.len();
        self.shared.push_from(elems, total, None)
    }
}

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self::attach(self.shared.clone())
    }
}

impl<T> Drop for Producer<T> {
    fn drop(&mut self) {
        self.shared.release_producer();
    }
}

impl<T> PipeHandle for Producer<T> {
    type Item = T;

    fn pipe_ref(&self) -> PipeRef<'_, T> {
        PipeRef::new(&self.shared)
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("elem_size", &std::mem::size_of::<T>())
            .finish_non_exhaustive()
    }
}

/// Lifecycle of a consumer handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// More elements may still arrive.
    Active,
    /// A pop saw an empty buffer with no producers left. Terminal.
    Drained,
}

/// Handle that pops elements out of a pipe.
///
/// Once a pop observes end-of-stream the handle is [`ConsumerState::Drained`]
/// and every later pop returns 0 immediately, even if the owner creates a new
/// producer afterwards.
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
    state: ConsumerState,
}

impl<T> Consumer<T> {
    pub(crate) fn attach(shared: Arc<Shared<T>>) -> Self {
        shared.acquire_consumer();
        Self {
            shared,
            state: ConsumerState::Active,
        }
    }

    /// Whether this handle is still active or has seen end-of-stream.
    #[inline]
    pub fn state(&self) -> ConsumerState {
        self.state
    }

    /// Shorthand for `state() == ConsumerState::Drained`.
    #[inline]
    pub fn is_drained(&self) -> bool {
        self.state == ConsumerState::Drained
    }

    fn pop_impl(
        &mut self,
        want: usize,
        mode: PopMode,
        deadline: Option<Instant>,
        sink: impl FnMut(T),
    ) -> Result<usize, PopError> {
        if self.is_drained() || want == 0 {
            return Ok(0);
        }

        let Popped {
            count,
            end_of_stream,
        } = self.shared.pop_with(want, mode, deadline, sink)?;
        if end_of_stream {
            tracing::debug!(count, "consumer drained");
            self.state = ConsumerState::Drained;
        }
        Ok(count)
    }

    fn pop_slice(
        &mut self,
        target: &mut [T],
        mode: PopMode,
        deadline: Option<Instant>,
    ) -> Result<usize, PopError> {
        let want = target.len();
        let mut filled = 0;
        self.pop_impl(want, mode, deadline, |value| {
            target[filled] = value;
            filled += 1;
        })
    }

    fn pop_to_vec(
        &mut self,
        count: usize,
        mode: PopMode,
        deadline: Option<Instant>,
    ) -> Result<Vec<T>, PopError> {
        let mut out = Vec::new();
        self.pop_impl(count, mode, deadline, |value| out.push(value))?;
        Ok(out)
    }

    /// Fill `target`, blocking until it is full or the stream ends.
    ///
    /// Returns the number of elements written to the front of `target`. A
    /// short count means end-of-stream; 0 means nothing more will ever
    /// arrive on this handle.
    pub fn pop(&mut self, target: &mut [T]) -> usize {
        self.pop_slice(target, PopMode::Exact, None)
            .unwrap_or_else(|err| err.popped())
    }

    /// Move whatever is available into `target`, blocking only while the
    /// pipe is empty and producers remain.
    ///
    /// Returns as soon as at least one element was moved; 0 means
    /// end-of-stream.
    pub fn pop_eager(&mut self, target: &mut [T]) -> usize {
        self.pop_slice(target, PopMode::Eager, None)
            .unwrap_or_else(|err| err.popped())
    }

    /// [`pop`](Self::pop) into a fresh vector of at most `count` elements.
    pub fn pop_vec(&mut self, count: usize) -> Vec<T> {
        self.pop_to_vec(count, PopMode::Exact, None)
            .unwrap_or_default()
    }

    /// [`pop_eager`](Self::pop_eager) into a fresh vector of at most `count`
    /// elements.
    pub fn pop_eager_vec(&mut self, count: usize) -> Vec<T> {
        self.pop_to_vec(count, PopMode::Eager, None)
            .unwrap_or_default()
    }

    /// Like [`pop`](Self::pop), but gives up once `timeout` has elapsed.
    ///
    /// On timeout, the elements already written to `target` are reported by
    /// [`PopError::popped`].
    pub fn pop_timeout(&mut self, target: &mut [T], timeout: Duration) -> Result<usize, PopError> {
        self.pop_slice(target, PopMode::Exact, deadline_after(timeout))
    }

    /// Like [`pop_eager`](Self::pop_eager), but gives up once `timeout` has
    /// elapsed.
    pub fn pop_eager_timeout(
        &mut self,
        target: &mut [T],
        timeout: Duration,
    ) -> Result<usize, PopError> {
        self.pop_slice(target, PopMode::Eager, deadline_after(timeout))
    }
}

impl<T> Drop for Consumer<T> {
    fn drop(&mut self) {
        self.shared.release_consumer();
    }
}

impl<T> PipeHandle for Consumer<T> {
    type Item = T;

    fn pipe_ref(&self) -> PipeRef<'_, T> {
        PipeRef::new(&self.shared)
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("elem_size", &std::mem::size_of::<T>())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Pipe;

    #[test]
    fn test_pop_on_empty_request_is_not_eof() {
        let pipe = Pipe::<u8>::new(0).unwrap();
        let mut consumer = pipe.consumer();
        assert_eq!(consumer.pop(&mut []), 0);
        assert_eq!(consumer.state(), ConsumerState::Active);
    }

    #[test]
    fn test_no_producers_is_immediate_eof() {
        let pipe = Pipe::<u8>::new(0).unwrap();
        let mut consumer = pipe.consumer();
        let mut buf = [0u8; 4];
        assert_eq!(consumer.pop_eager(&mut buf), 0);
        assert!(consumer.is_drained());
    }

    #[test]
    fn test_drained_is_terminal() {
        let pipe = Pipe::<u8>::new(0).unwrap();
        let mut consumer = pipe.consumer();
        let mut buf = [0u8; 4];
        assert_eq!(consumer.pop(&mut buf), 0);

        // A producer created after the consumer drained does not revive it.
        let producer = pipe.producer();
        producer.push(b"late").unwrap();
        assert_eq!(consumer.pop(&mut buf), 0);
        assert_eq!(consumer.used_size(), 4);
    }

    #[test]
    fn test_short_exact_pop_drains() {
        let pipe = Pipe::<u8>::new(0).unwrap();
        let producer = pipe.producer();
        let mut consumer = pipe.consumer();
        producer.push(b"abc").unwrap();
        drop(producer);

        let mut buf = [0u8; 8];
        assert_eq!(consumer.pop(&mut buf), 3);
        assert_eq!(&buf[..3], b"abc");
        assert!(consumer.is_drained());
        assert_eq!(consumer.pop(&mut buf), 0);
    }

    #[test]
    fn test_generic_accessors_agree() {
        let pipe = Pipe::<u32>::new(0).unwrap();
        let producer = pipe.producer();
        let consumer = pipe.consumer();
        producer.push(&[1, 2, 3]).unwrap();

        assert_eq!(pipe.elem_size(), 4);
        assert_eq!(producer.elem_size(), 4);
        assert_eq!(consumer.elem_size(), 4);
        assert_eq!(pipe.used_size(), 3);
        assert_eq!(consumer.used_size(), 3);

        producer.reserve(200).unwrap();
        assert!(consumer.capacity() >= 200);
        assert_eq!(pipe.limit(), 0);
    }

    #[test]
    fn test_push_iter_and_vec() {
        let pipe = Pipe::<String>::new(0).unwrap();
        let producer = pipe.producer();
        let mut consumer = pipe.consumer();

        producer.push_vec(vec!["a".into(), "b".into()]).unwrap();
        producer
            .push_iter(["c", "d"].into_iter().map(String::from))
            .unwrap();
        drop(producer);

        assert_eq!(consumer.pop_vec(10), vec!["a", "b", "c", "d"]);
        assert!(consumer.pop_eager_vec(10).is_empty());
    }

    #[test]
    fn test_pop_timeout_reports_partial_fill() {
        let pipe = Pipe::<u8>::new(0).unwrap();
        let producer = pipe.producer();
        let mut consumer = pipe.consumer();
        producer.push(b"xy").unwrap();

        let mut buf = [0u8; 4];
        let err = consumer
            .pop_timeout(&mut buf, Duration::from_millis(20))
            .unwrap_err();
        assert_eq!(err, PopError::Timeout { popped: 2 });
        assert_eq!(&buf[..2], b"xy");
        assert_eq!(consumer.state(), ConsumerState::Active);

        let err = consumer
            .pop_eager_timeout(&mut buf, Duration::from_millis(20))
            .unwrap_err();
        assert_eq!(err.popped(), 0);
        drop(producer);
    }

    #[test]
    fn test_push_timeout_on_full_pipe() {
        let pipe = Pipe::<u8>::new(2).unwrap();
        let producer = pipe.producer();
        let _consumer = pipe.consumer();

        let err = producer
            .push_timeout(b"abc", Duration::from_millis(20))
            .unwrap_err();
        assert_eq!(err, PushError::Timeout { pushed: 2 });
        assert_eq!(pipe.used_size(), 2);
    }

    #[test]
    fn test_unrepresentable_timeout_waits_indefinitely() {
        let pipe = Pipe::<u8>::new(2).unwrap();
        let producer = pipe.producer();
        let mut consumer = pipe.consumer();

        producer.push_timeout(b"ab", Duration::MAX).unwrap();
        let mut buf = [0u8; 2];
        assert_eq!(consumer.pop_timeout(&mut buf, Duration::MAX), Ok(2));
        assert_eq!(&buf, b"ab");

        // Nothing buffered: the eager pop blocks until the writer delivers.
        let writer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer.push_timeout(b"cde", Duration::MAX)
        });
        assert_eq!(consumer.pop_eager_timeout(&mut buf, Duration::MAX), Ok(2));
        assert_eq!(&buf, b"cd");
        assert_eq!(consumer.pop_timeout(&mut buf, Duration::MAX), Ok(1));
        assert_eq!(buf[0], b'e');
        assert_eq!(writer.join().unwrap(), Ok(()));

        assert_eq!(consumer.pop_eager_timeout(&mut buf, Duration::MAX), Ok(0));
        assert!(consumer.is_drained());
    }
}
