use super::node::{Node, NodeId};
use crate::alloc::Allocator;
use crate::error::{Error, Result};
use allocator_api2::vec::Vec;
use std::mem;

enum Slot<V, const K: usize> {
    Occupied(Node<V, K>),
    /// Next vacant slot
    Vacant(Option<usize>),
}

/// Storage for all nodes of a tree, addressed by `NodeId`.
///
/// Slots live in a single buffer obtained from the tree's allocator. `reserve` grows it ahead
/// of time so placing a node in the middle of a split cannot fail. Released slots are chained
/// in a free list and reused by later placements; the buffer is only given back by `clear`.
pub(super) struct NodeArena<V, A: Allocator, const K: usize> {
    slots: Vec<Slot<V, K>, A>,
    free_head: Option<usize>,
    vacant: usize,
    live: usize,
}

impl<V, A: Allocator, const K: usize> NodeArena<V, A, K> {
    pub(super) const SLOT_BYTES: usize = mem::size_of::<Slot<V, K>>();

    pub(super) fn new_in(alloc: A) -> Self {
        NodeArena {
            slots: Vec::new_in(alloc),
            free_head: None,
            vacant: 0,
            live: 0,
        }
    }

    /// Return the number of nodes currently stored
    pub(super) fn live(&self) -> usize {
        self.live
    }

    /// Return the bytes of the slot buffer
    #[cfg(test)]
    pub(super) fn held_bytes(&self) -> usize {
        self.slots.capacity() * Self::SLOT_BYTES
    }

    pub(super) fn get(&self, id: NodeId) -> &Node<V, K> {
        match self.slots.get(id.index()) {
            Some(Slot::Occupied(node)) => node,
            _ => panic!("{:?} is not allocated", id),
        }
    }

    pub(super) fn get_mut(&mut self, id: NodeId) -> &mut Node<V, K> {
        match self.slots.get_mut(id.index()) {
            Some(Slot::Occupied(node)) => node,
            _ => panic!("{:?} is not allocated", id),
        }
    }

    /// Make sure the next `count` placements will not need memory
    pub(super) fn reserve(&mut self, count: usize) -> Result<()> {
        let missing = count.saturating_sub(self.vacant);
        if self.slots.capacity() - self.slots.len() >= missing {
            return Ok(());
        }
        self.slots
            .try_reserve(missing)
            .map_err(|_| Error::AllocationFailed {
                bytes: missing * Self::SLOT_BYTES,
                context: "node",
            })?;
        tracing::trace!(capacity = self.slots.capacity(), "node arena grown");
        Ok(())
    }

    /// Store `node` in a vacant slot or in the room made by `reserve`
    pub(super) fn place(&mut self, node: Node<V, K>) -> NodeId {
        let index = match self.free_head {
            Some(index) => {
                match mem::replace(&mut self.slots[index], Slot::Occupied(node)) {
                    Slot::Vacant(next) => self.free_head = next,
                    Slot::Occupied(_) => panic!("free list reached a live node"),
                }
                self.vacant -= 1;
                index
            }
            None => {
                assert!(
                    self.slots.len() < self.slots.capacity(),
                    "node placed without a reservation"
                );
                self.slots.push(Slot::Occupied(node));
                self.slots.len() - 1
            }
        };
        self.live += 1;
        NodeId::new(index)
    }

    /// Take a node out, leaving its slot for reuse.
    /// The node must not be referenced by any parent anymore
    pub(super) fn release(&mut self, id: NodeId) -> Node<V, K> {
        let slot = match self.slots.get_mut(id.index()) {
            Some(slot) => slot,
            None => panic!("{:?} is not allocated", id),
        };
        let node = match mem::replace(slot, Slot::Vacant(self.free_head)) {
            Slot::Occupied(node) => node,
            Slot::Vacant(next) => {
                *slot = Slot::Vacant(next);
                panic!("{:?} released twice", id);
            }
        };
        self.free_head = Some(id.index());
        self.vacant += 1;
        self.live -= 1;
        node
    }

    /// Give the slot buffer back to the allocator. All nodes must have been released
    pub(super) fn clear(&mut self) {
        assert_eq!(self.live, 0, "clearing an arena with live nodes");
        self.slots.clear();
        self.slots.shrink_to_fit();
        self.free_head = None;
        self.vacant = 0;
    }
}
