use std::mem::MaybeUninit;
use std::ptr;

use crate::error::PipeError;

/// Capacity a pipe starts with (and trims back to) unless configured otherwise.
pub const DEFAULT_MIN_CAPACITY: usize = 32;

/// Growable ring of `T`.
///
/// Occupied slots are `head..head + len` modulo `capacity`; every other slot is
/// uninitialized. The ring knows nothing about locking: the pipe only touches
/// it while holding its mutex.
pub(crate) struct RingBuffer<T> {
    slots: Box<[MaybeUninit<T>]>,
    head: usize,
    len: usize,
    /// Reservation target: trimming never goes below this.
    min_capacity: usize,
    /// Target restored by `reserve(0)`.
    base_capacity: usize,
    /// Maximum occupancy, 0 for unbounded.
    limit: usize,
}

fn allocate<T>(capacity: usize) -> Result<Box<[MaybeUninit<T>]>, PipeError> {
    let mut slots = Vec::new();
    slots
        .try_reserve_exact(capacity)
        .map_err(|_| PipeError::AllocationFailed {
            requested: capacity,
        })?;
    slots.resize_with(capacity, MaybeUninit::uninit);
    Ok(slots.into_boxed_slice())
}

impl<T> RingBuffer<T> {
    /// Allocate a ring sized to `min_capacity`, capped at `limit` when bounded.
    pub fn new(min_capacity: usize, limit: usize) -> Result<Self, PipeError> {
        let base_capacity = min_capacity.max(1);
        let initial = if limit > 0 {
            base_capacity.min(limit)
        } else {
            base_capacity
        };

        Ok(Self {
            slots: allocate(initial)?,
            head: 0,
            len: 0,
            min_capacity: base_capacity,
            base_capacity,
            limit,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn min_capacity(&self) -> usize {
        self.min_capacity
    }

    /// Free slots before the ring must grow.
    #[inline]
    fn vacant(&self) -> usize {
        self.capacity() - self.len
    }

    /// Room left under the occupancy limit.
    #[inline]
    pub fn room(&self) -> usize {
        if self.limit == 0 {
            usize::MAX
        } else {
            self.limit.saturating_sub(self.len)
        }
    }

    #[inline]
    fn wrap(&self, index: usize) -> usize {
        let capacity = self.capacity();
        if index >= capacity {
            index - capacity
        } else {
            index
        }
    }

    /// Move the occupied slots into a fresh allocation of `new_capacity`,
    /// laid out contiguously from index 0.
    fn relocate(&mut self, new_capacity: usize) -> Result<(), PipeError> {
        debug_assert!(new_capacity >= self.len);
        let mut fresh = allocate::<T>(new_capacity)?;

        let first = self.len.min(self.capacity() - self.head);
        let second = self.len - first;
        // SAFETY: the source ranges are exactly the initialized slots, the
        // destination has room for `len` elements, and the old allocation is
        // released as `MaybeUninit` so nothing is dropped twice.
        unsafe {
            ptr::copy_nonoverlapping(
                self.slots.as_ptr().add(self.head),
                fresh.as_mut_ptr(),
                first,
            );
            ptr::copy_nonoverlapping(self.slots.as_ptr(), fresh.as_mut_ptr().add(first), second);
        }

        tracing::trace!(
            from = self.capacity(),
            to = new_capacity,
            len = self.len,
            "relocated ring"
        );
        self.slots = fresh;
        self.head = 0;
        Ok(())
    }

    /// Grow so that at least `count` slots exist and raise the reservation
    /// target to `count`. Bounded rings never reserve past `limit`, and a
    /// request below the current target changes nothing.
    ///
    /// `reserve(0)` restores the base target and shrinks back toward it as far
    /// as the buffered elements allow.
    pub fn reserve(&mut self, count: usize) -> Result<(), PipeError> {
        if count == 0 {
            self.min_capacity = self.base_capacity;
            let floor = self.initial_capacity().max(self.len);
            if self.capacity() > floor {
                self.relocate(floor)?;
            }
            return Ok(());
        }

        let count = if self.limit > 0 {
            count.min(self.limit)
        } else {
            count
        };
        self.min_capacity = self.min_capacity.max(count);
        if self.capacity() < count {
            self.relocate(count)?;
        }
        Ok(())
    }

    fn initial_capacity(&self) -> usize {
        if self.limit > 0 {
            self.base_capacity.min(self.limit)
        } else {
            self.base_capacity
        }
    }

    /// Make room for `additional` more elements by repeated doubling.
    pub fn grow_for(&mut self, additional: usize) -> Result<(), PipeError> {
        if additional <= self.vacant() {
            return Ok(());
        }

        let needed = self
            .len
            .checked_add(additional)
            .ok_or(PipeError::CapacityOverflow)?;
        let mut target = self.capacity().max(1);
        while target < needed {
            target = target.checked_mul(2).ok_or(PipeError::CapacityOverflow)?;
        }
        if self.limit > 0 {
            target = target.min(self.limit).max(needed);
        }

        self.relocate(target)
    }

    /// Halve the allocation while occupancy stays below a quarter of it,
    /// never going under the reservation target.
    ///
    /// Returns whether the ring shrank. A failed allocation leaves the ring
    /// as it was.
    pub fn trim(&mut self) -> bool {
        let mut target = self.capacity();
        while self.len < target / 4 && target / 2 >= self.min_capacity {
            target /= 2;
        }
        target < self.capacity() && self.relocate(target).is_ok()
    }

    /// Append one element. The caller must have ensured a vacant slot.
    #[inline]
    fn push_back(&mut self, value: T) {
        debug_assert!(self.len < self.capacity());
        let slot = self.wrap(self.head + self.len);
        self.slots[slot].write(value);
        self.len += 1;
    }

    /// Remove the oldest element.
    #[inline]
    pub fn pop_front(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        // SAFETY: `head` is within the occupied range, which is initialized,
        // and advancing past it marks the slot uninitialized again.
        let value = unsafe { self.slots[self.head].assume_init_read() };
        self.head = self.wrap(self.head + 1);
        self.len -= 1;
        Some(value)
    }

    /// Append up to `max` elements from `source`, bounded by the vacant slots.
    ///
    /// Returns how many were appended; fewer than `max` means the source ran
    /// dry or the ring was full.
    pub fn extend_from<I: Iterator<Item = T>>(&mut self, source: &mut I, max: usize) -> usize {
        let max = max.min(self.vacant());
        let mut appended = 0;
        while appended < max {
            match source.next() {
                Some(value) => {
                    self.push_back(value);
                    appended += 1;
                }
                None => break,
            }
        }
        appended
    }

    /// Hand up to `max` of the oldest elements to `sink`, in order.
    pub fn drain_with(&mut self, max: usize, mut sink: impl FnMut(T)) -> usize {
        let mut moved = 0;
        while moved < max {
            match self.pop_front() {
                Some(value) => {
                    sink(value);
                    moved += 1;
                }
                None => break,
            }
        }
        moved
    }
}

impl<T> Drop for RingBuffer<T> {
    fn drop(&mut self) {
        while self.pop_front().is_some() {}
    }
}
