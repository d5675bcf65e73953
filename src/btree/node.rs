use super::{Key, KeyId};
use crate::error::{Error, Result};
use arrayvec::ArrayVec;
use std::mem;

/// Position of a node in the tree's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) struct NodeId(usize);

impl NodeId {
    pub(super) fn new(index: usize) -> Self {
        NodeId(index)
    }

    pub(super) fn index(self) -> usize {
        self.0
    }
}

/// A node with room for `K` keys and `K + 1` children.
///
/// Children are kept as the leftmost one plus, for each key, the child right after it. Every
/// shift of a key therefore moves the matching child along, which is what splits, merges and
/// rotations need.
pub(super) struct Node<V, const K: usize> {
    keys: ArrayVec<Key<V>, K>,
    first: Option<NodeId>,
    children: ArrayVec<NodeId, K>,
}

impl<V, const K: usize> Node<V, K> {
    /// Build an empty leaf
    pub(super) fn new() -> Self {
        Node {
            keys: ArrayVec::new(),
            first: None,
            children: ArrayVec::new(),
        }
    }

    /// Build a node holding only `median`, with the two halves of a split as children
    pub(super) fn with_median(median: Key<V>, left: NodeId, right: NodeId) -> Self {
        let mut node = Node::new();
        node.keys.push(median);
        node.first = Some(left);
        node.children.push(right);
        node
    }

    /// Return the number of keys in this node
    pub(super) fn len(&self) -> usize {
        self.keys.len()
    }

    /// Return whether every key slot is taken. Nodes only get there in the middle of an
    /// insertion, right before being split
    pub(super) fn is_full(&self) -> bool {
        self.keys.is_full()
    }

    /// Return whether the node has no child at all
    pub(super) fn is_leaf(&self) -> bool {
        self.first.is_none() && self.children.is_empty()
    }

    pub(super) fn keys(&self) -> &[Key<V>] {
        &self.keys
    }

    /// Return the key at the given index.
    /// Panics if out-of-bounds
    pub(super) fn key(&self, index: usize) -> &Key<V> {
        &self.keys[index]
    }

    /// Return the child at the given index, if any
    pub(super) fn child(&self, index: usize) -> Option<NodeId> {
        match index {
            0 => self.first,
            _ => self.children.get(index - 1).copied(),
        }
    }

    /// Binary search for `id`: `Ok` with its index, or `Err` with the index of the child
    /// whose subtree would contain it
    pub(super) fn search(&self, id: KeyId) -> std::result::Result<usize, usize> {
        self.keys.binary_search_by(|key| key.id.cmp(&id))
    }

    /// Insert `key` at `index`, shifting the following keys right.
    /// `right_child` becomes the child right after the new key: leaves take none and internal
    /// nodes require one
    pub(super) fn insert(
        &mut self,
        index: usize,
        key: Key<V>,
        right_child: Option<NodeId>,
    ) -> Result<()> {
        assert!(index <= self.keys.len());
        if self.keys.is_full() {
            return Err(Error::RebalanceFailed {
                context: "inserting into a node without free slots",
            });
        }
        assert_eq!(self.is_leaf(), right_child.is_none());

        self.keys.insert(index, key);
        if let Some(child) = right_child {
            self.children.insert(index, child);
        }
        Ok(())
    }

    /// Append `key` as the greatest key, with `right_child` after it
    pub(super) fn push_back(&mut self, key: Key<V>, right_child: Option<NodeId>) -> Result<()> {
        self.insert(self.keys.len(), key, right_child)
    }

    /// Prepend `key` as the smallest key, with `left_child` becoming the leftmost child
    pub(super) fn push_front(&mut self, key: Key<V>, left_child: Option<NodeId>) -> Result<()> {
        if self.keys.is_full() {
            return Err(Error::RebalanceFailed {
                context: "inserting into a node without free slots",
            });
        }
        assert_eq!(self.is_leaf(), left_child.is_none());

        self.keys.insert(0, key);
        if let Some(child) = left_child {
            if let Some(first) = self.first.replace(child) {
                self.children.insert(0, first);
            }
        }
        Ok(())
    }

    /// Remove the key at `index` together with the child right after it, shifting the
    /// following keys and children left.
    /// Panics if out-of-bounds
    pub(super) fn remove(&mut self, index: usize) -> (Key<V>, Option<NodeId>) {
        let key = self.keys.remove(index);
        let child = match self.first {
            Some(_) => Some(self.children.remove(index)),
            None => None,
        };
        (key, child)
    }

    /// Remove the greatest key and the last child
    pub(super) fn pop_back(&mut self) -> (Key<V>, Option<NodeId>) {
        self.remove(self.keys.len() - 1)
    }

    /// Remove the smallest key and the leftmost child
    pub(super) fn pop_front(&mut self) -> (Key<V>, Option<NodeId>) {
        let key = self.keys.remove(0);
        let child = match self.first {
            Some(first) => {
                self.first = Some(self.children.remove(0));
                Some(first)
            }
            None => None,
        };
        (key, child)
    }

    /// Overwrite the key at `index`, returning the previous one
    pub(super) fn replace_key(&mut self, index: usize, key: Key<V>) -> Key<V> {
        mem::replace(&mut self.keys[index], key)
    }

    /// Split a full node into (left, median, right).
    /// Self keeps the lower `(K - 1) / 2` keys and the matching children; the rest is moved
    /// into the returned node
    pub(super) fn split(&mut self) -> (Key<V>, Node<V, K>) {
        assert!(self.keys.is_full());
        let med = (K - 1) / 2;

        let mut right = Node::new();
        right.keys.extend(self.keys.drain(med + 1..));
        let median = self.keys.remove(med);
        if self.first.is_some() {
            right.children.extend(self.children.drain(med + 1..));
            right.first = Some(self.children.remove(med));
        }

        (median, right)
    }

    /// Append `separator` and then every key and child of `other`, which must be the right
    /// sibling of this node
    pub(super) fn absorb(&mut self, separator: Key<V>, other: Node<V, K>) -> Result<()> {
        if self.keys.len() + other.keys.len() + 1 >= K {
            return Err(Error::RebalanceFailed {
                context: "merged node would overflow",
            });
        }
        assert_eq!(self.is_leaf(), other.is_leaf());

        let Node {
            keys,
            first,
            children,
        } = other;
        self.keys.push(separator);
        self.keys.extend(keys);
        if let Some(first) = first {
            self.children.push(first);
            self.children.extend(children);
        }
        Ok(())
    }
}
