//! Slot store for per-block Bresenham data.

#![allow(unsafe_code)]

use core::cell::UnsafeCell;

use crate::motion::StepperBlockData;

/// Fixed set of [`StepperBlockData`] slots addressed by a small index.
///
/// Slots are claimed round-robin by the preparer. A slot is rewritten only
/// after every segment that referenced it has left the segment ring: with `N`
/// slots and at most `N - 1` queued segments, the slot being claimed can never
/// be the one the executor is loading.
pub struct BlockArena<const N: usize> {
    slots: [UnsafeCell<StepperBlockData>; N],
}

// SAFETY: see the round-robin argument above; the segment ring's release/acquire
// on `head` orders a slot write before any segment referencing it is visible.
unsafe impl<const N: usize> Sync for BlockArena<N> {}

impl<const N: usize> BlockArena<N> {
    /// Create an arena with every slot zeroed.
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| UnsafeCell::new(StepperBlockData::default())),
        }
    }

    /// Index of the slot following `index`.
    #[inline]
    pub const fn next_index(index: u8) -> u8 {
        let next = index as usize + 1;
        if next >= N {
            0
        } else {
            next as u8
        }
    }

    /// Store block data. Only the preparer calls this.
    pub(crate) fn store(&self, index: u8, data: StepperBlockData) {
        // SAFETY: the preparer is the only writer and the slot is not referenced
        // by any queued segment.
        unsafe {
            *self.slots[usize::from(index) % N].get() = data;
        }
    }

    /// Copy block data out. Only the executor calls this.
    pub(crate) fn load(&self, index: u8) -> StepperBlockData {
        // SAFETY: the slot is referenced by the segment at the ring tail, which
        // the preparer does not rewrite until that segment is released.
        unsafe { *self.slots[usize::from(index) % N].get() }
    }

    /// Zero every slot.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot.get_mut() = StepperBlockData::default();
        }
    }
}

impl<const N: usize> Default for BlockArena<N> {
    fn default() -> Self {
        Self::new()
    }
}
