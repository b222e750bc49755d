//! Shared buffers between the segment preparer and the pulse executor.
//!
//! Both buffers are single-producer/single-consumer: the preparer pushes
//! segments and claims block slots, the executor reads block slots and releases
//! segments.

mod arena;
mod ring;

pub use arena::BlockArena;
pub use ring::{Consumer, Producer, RingBuffer};

use crate::motion::{Segment, StepperBlockData};

/// Segment ring paired with the block arena its segments index into.
pub struct SegmentBuffers<const N: usize> {
    segments: RingBuffer<Segment, N>,
    blocks: BlockArena<N>,
}

impl<const N: usize> SegmentBuffers<N> {
    /// Create empty buffers.
    pub fn new() -> Self {
        Self {
            segments: RingBuffer::new(),
            blocks: BlockArena::new(),
        }
    }

    /// Number of queued segments.
    #[inline]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Check if no segments are queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments the ring can hold.
    #[inline]
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    /// Empty the ring and zero the arena.
    pub fn clear(&mut self) {
        self.segments.clear();
        self.blocks.clear();
    }

    /// Split into the preparer's and the executor's halves.
    pub fn split(&mut self) -> (SegmentProducer<'_, N>, SegmentConsumer<'_, N>) {
        let (producer, consumer) = self.segments.split();
        let blocks = &self.blocks;
        (
            SegmentProducer {
                segments: producer,
                blocks,
            },
            SegmentConsumer {
                segments: consumer,
                blocks,
            },
        )
    }
}

impl<const N: usize> Default for SegmentBuffers<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Preparer half: pushes segments and writes block slots.
pub struct SegmentProducer<'a, const N: usize> {
    segments: Producer<'a, Segment, N>,
    blocks: &'a BlockArena<N>,
}

impl<'a, const N: usize> SegmentProducer<'a, N> {
    /// Check if another segment fits.
    #[inline]
    pub fn has_room(&self) -> bool {
        self.segments.has_room()
    }

    /// Publish a segment.
    pub fn push(&mut self, segment: Segment) -> core::result::Result<(), Segment> {
        self.segments.push(segment)
    }

    /// Write the Bresenham data for a newly loaded block.
    pub fn store_block(&mut self, index: u8, data: StepperBlockData) {
        self.blocks.store(index, data);
    }

    /// Number of queued segments.
    #[inline]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Check if no segments are queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Executor half: reads the tail segment and its block slot.
pub struct SegmentConsumer<'a, const N: usize> {
    segments: Consumer<'a, Segment, N>,
    blocks: &'a BlockArena<N>,
}

impl<'a, const N: usize> SegmentConsumer<'a, N> {
    /// Copy the segment at the tail, keeping its slot reserved.
    #[inline]
    pub fn peek(&self) -> Option<Segment> {
        self.segments.peek()
    }

    /// Release the tail segment.
    #[inline]
    pub fn release(&mut self) {
        self.segments.release();
    }

    /// Copy the block data a segment refers to.
    #[inline]
    pub fn block(&self, index: u8) -> StepperBlockData {
        self.blocks.load(index)
    }

    /// Check if no segments are queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}
