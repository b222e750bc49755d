//! Bounded single-producer/single-consumer ring.

#![allow(unsafe_code)]

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Fixed-capacity circular buffer shared between one producer and one consumer.
///
/// One slot always stays empty so that `head == tail` means empty and the
/// producer can detect a full ring without a separate count. Usable capacity is
/// therefore `N - 1`.
///
/// The producer only stores `head` and only loads `tail`; the consumer does the
/// opposite. Each index update is a single atomic store, so no lock is needed.
pub struct RingBuffer<T, const N: usize> {
    slots: [UnsafeCell<T>; N],
    head: AtomicUsize,
    tail: AtomicUsize,
}

// SAFETY: a slot is written only by the producer while it lies outside
// `tail..head`, and read only by the consumer while it lies inside. The
// release store of `head` (resp. `tail`) orders the slot access before the
// other side can observe the index change.
unsafe impl<T: Send, const N: usize> Sync for RingBuffer<T, N> {}

impl<T: Copy + Default, const N: usize> RingBuffer<T, N> {
    /// Create an empty ring.
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| UnsafeCell::new(T::default())),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }
}

impl<T: Copy + Default, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy, const N: usize> RingBuffer<T, N> {
    /// Number of entries the ring can hold.
    #[inline]
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    /// Number of entries currently queued.
    #[inline]
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (head + N - tail) % N
    }

    /// Check if no entries are queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    /// Check if the producer has no free slot.
    #[inline]
    pub fn is_full(&self) -> bool {
        Self::next(self.head.load(Ordering::Acquire)) == self.tail.load(Ordering::Acquire)
    }

    /// Drop every queued entry.
    ///
    /// Exclusive access guarantees neither half is live.
    pub fn clear(&mut self) {
        *self.head.get_mut() = 0;
        *self.tail.get_mut() = 0;
    }

    /// Split into producer and consumer halves.
    pub fn split(&mut self) -> (Producer<'_, T, N>, Consumer<'_, T, N>) {
        let ring: &Self = self;
        (Producer { ring }, Consumer { ring })
    }

    #[inline]
    const fn next(index: usize) -> usize {
        if index + 1 >= N {
            0
        } else {
            index + 1
        }
    }
}

/// Writing half of a [`RingBuffer`].
pub struct Producer<'a, T, const N: usize> {
    ring: &'a RingBuffer<T, N>,
}

impl<'a, T: Copy, const N: usize> Producer<'a, T, N> {
    /// Check if there is room for another entry.
    #[inline]
    pub fn has_room(&self) -> bool {
        !self.ring.is_full()
    }

    /// Publish an entry at the head.
    ///
    /// Returns the value back when the ring is full.
    pub fn push(&mut self, value: T) -> core::result::Result<(), T> {
        let head = self.ring.head.load(Ordering::Relaxed);
        let next = RingBuffer::<T, N>::next(head);
        if next == self.ring.tail.load(Ordering::Acquire) {
            return Err(value);
        }
        // SAFETY: `head` is outside `tail..head`, so the consumer does not read
        // it until the store below publishes it.
        unsafe {
            *self.ring.slots[head].get() = value;
        }
        self.ring.head.store(next, Ordering::Release);
        Ok(())
    }

    /// Number of queued entries as seen by the producer.
    #[inline]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Check if the ring is empty as seen by the producer.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

/// Reading half of a [`RingBuffer`].
pub struct Consumer<'a, T, const N: usize> {
    ring: &'a RingBuffer<T, N>,
}

impl<'a, T: Copy, const N: usize> Consumer<'a, T, N> {
    /// Copy the entry at the tail without releasing its slot.
    ///
    /// The slot stays reserved until [`Consumer::release`], so the producer
    /// cannot overwrite an entry that is still executing.
    pub fn peek(&self) -> Option<T> {
        let tail = self.ring.tail.load(Ordering::Relaxed);
        if tail == self.ring.head.load(Ordering::Acquire) {
            return None;
        }
        // SAFETY: `tail` is inside `tail..head`, which the producer never writes.
        let value = unsafe { *self.ring.slots[tail].get() };
        Some(value)
    }

    /// Release the tail slot back to the producer.
    ///
    /// Does nothing on an empty ring.
    pub fn release(&mut self) {
        let tail = self.ring.tail.load(Ordering::Relaxed);
        if tail == self.ring.head.load(Ordering::Acquire) {
            return;
        }
        self.ring
            .tail
            .store(RingBuffer::<T, N>::next(tail), Ordering::Release);
    }

    /// Copy and release the tail entry.
    pub fn pop(&mut self) -> Option<T> {
        let value = self.peek()?;
        self.release();
        Some(value)
    }

    /// Check if the ring is empty as seen by the consumer.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Number of queued entries as seen by the consumer.
    #[inline]
    pub fn len(&self) -> usize {
        self.ring.len()
    }
}
