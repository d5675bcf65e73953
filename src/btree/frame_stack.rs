use super::node::NodeId;
use crate::alloc::Allocator;
use crate::error::{Error, Result};
use allocator_api2::vec::Vec;
use std::mem;

/// Capacity of the stack on its first growth
const INITIAL_FRAMES: usize = 32;

/// A node on the path of the current operation, with the key or child index chosen in it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Frame {
    pub(super) node: NodeId,
    pub(super) key_index: usize,
}

/// The root-to-leaf path recorded by insert, delete and traversals, so that splits and merges
/// can walk back up without recursion.
///
/// Every top-level operation resets it first. Resetting keeps the buffer, so a tree reaches
/// its steady capacity after a few operations and stops asking the allocator.
pub(super) struct FrameStack<A: Allocator> {
    frames: Vec<Frame, A>,
}

impl<A: Allocator> FrameStack<A> {
    pub(super) const FRAME_BYTES: usize = mem::size_of::<Frame>();

    pub(super) fn new_in(alloc: A) -> Self {
        FrameStack {
            frames: Vec::new_in(alloc),
        }
    }

    pub(super) fn allocator(&self) -> &A {
        self.frames.allocator()
    }

    #[cfg(test)]
    pub(super) fn len(&self) -> usize {
        self.frames.len()
    }

    pub(super) fn capacity(&self) -> usize {
        self.frames.capacity()
    }

    pub(super) fn push(&mut self, node: NodeId, key_index: usize) -> Result<()> {
        self.reserve(self.frames.len() + 1)?;
        self.frames.push(Frame { node, key_index });
        Ok(())
    }

    pub(super) fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub(super) fn peek(&self) -> Option<Frame> {
        self.frames.last().copied()
    }

    pub(super) fn reset(&mut self) {
        self.frames.clear();
    }

    /// Iterate from the most recent frame back to the root's
    pub(super) fn iter_from_top(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter().rev()
    }

    /// Make room for at least `min_capacity` frames, doubling the current capacity as many
    /// times as needed
    pub(super) fn reserve(&mut self, min_capacity: usize) -> Result<()> {
        let capacity = self.frames.capacity();
        if min_capacity <= capacity {
            return Ok(());
        }

        let mut new_capacity = capacity.max(INITIAL_FRAMES);
        while new_capacity < min_capacity {
            new_capacity *= 2;
        }
        self.frames
            .try_reserve_exact(new_capacity - self.frames.len())
            .map_err(|_| Error::AllocationFailed {
                bytes: new_capacity * Self::FRAME_BYTES,
                context: "frame stack",
            })?;

        tracing::trace!(from = capacity, to = new_capacity, "frame stack grown");
        Ok(())
    }

    /// Give the whole buffer back to the allocator
    pub(super) fn release(&mut self) {
        self.frames.clear();
        self.frames.shrink_to_fit();
    }
}
