use super::node::NodeId;
use super::tree::BTree;
use super::KeyId;
use crate::alloc::Allocator;
use crate::error::{Error, Result};

impl<V, A: Allocator, const K: usize> BTree<V, A, K> {
    /// Remove the key with the given `id` and return its data.
    ///
    /// Keys are only ever taken out of leaves: a key found in an internal node is overwritten
    /// by its in-order predecessor, the greatest key of the subtree on its left, which is then
    /// removed from its leaf instead. Nodes left with fewer than `MIN_KEYS` keys are fixed
    /// going back up, either by borrowing a key from a sibling or by merging with one. A root
    /// emptied by a merge is replaced by its only child.
    pub fn delete(&mut self, id: KeyId) -> Result<V> {
        self.frames.reset();

        let mut found = None;
        let mut cursor = self.root;
        while let Some(node_id) = cursor {
            let node = self.nodes.get(node_id);
            let (index, hit) = match node.search(id) {
                Ok(index) => (index, true),
                Err(index) => (index, false),
            };
            self.frames.push(node_id, index)?;
            cursor = node.child(index);
            if hit {
                found = Some((node_id, index));
                break;
            }
        }
        let (target, index) = found.ok_or(Error::IdNotFound { id })?;

        // Rightmost path of the left subtree
        while let Some(node_id) = cursor {
            let node = self.nodes.get(node_id);
            self.frames.push(node_id, node.len())?;
            cursor = node.child(node.len());
        }

        let leaf = self.frames.peek().ok_or(Error::OpDenied {
            op: "delete",
            reason: "no path was recorded",
        })?;
        let removed = if leaf.node == target {
            self.nodes.get_mut(target).remove(index).0
        } else {
            let (predecessor, _) = self.nodes.get_mut(leaf.node).pop_back();
            self.nodes.get_mut(target).replace_key(index, predecessor)
        };
        self.len -= 1;

        self.rebalance()?;
        Ok(removed.data)
    }

    /// Pop frames, fixing every node that went below `MIN_KEYS`
    fn rebalance(&mut self) -> Result<()> {
        while let Some(frame) = self.frames.pop() {
            let parent = match self.frames.peek() {
                Some(parent) => parent,
                None => {
                    self.shrink_root(frame.node);
                    break;
                }
            };
            if self.nodes.get(frame.node).len() >= Self::MIN_KEYS {
                break;
            }
            self.fix_deficient(parent.node, parent.key_index, frame.node)?;
        }
        Ok(())
    }

    /// Drop a root left without keys. Its only child, if any, becomes the new root; without
    /// one the node storage goes back to the allocator
    fn shrink_root(&mut self, root: NodeId) {
        debug_assert_eq!(self.root, Some(root));
        let node = self.nodes.get(root);
        if node.len() > 0 {
            return;
        }
        self.root = node.child(0);
        self.nodes.release(root);
        if self.root.is_none() {
            // Nothing left to store
            self.nodes.clear();
        }
        tracing::trace!(root = ?self.root, "tree height shrank");
    }

    /// Bring `node`, child `index` of `parent`, back to `MIN_KEYS` keys.
    /// Borrowing is tried first from the right sibling, then from the left one
    fn fix_deficient(&mut self, parent: NodeId, index: usize, node: NodeId) -> Result<()> {
        let parent_node = self.nodes.get(parent);
        debug_assert_eq!(parent_node.child(index), Some(node));
        let left = match index {
            0 => None,
            _ => parent_node.child(index - 1),
        };
        let right = parent_node.child(index + 1);

        if let Some(right) = self.lender(right) {
            self.borrow_from_right(parent, index, node, right)
        } else if let Some(left) = self.lender(left) {
            self.borrow_from_left(parent, index, left, node)
        } else if let Some(left) = left {
            self.merge(parent, index - 1, left, node)
        } else if let Some(right) = right {
            self.merge(parent, index, node, right)
        } else {
            Err(Error::RebalanceFailed {
                context: "deficient node without siblings",
            })
        }
    }

    /// Return the sibling if it can spare a key
    fn lender(&self, sibling: Option<NodeId>) -> Option<NodeId> {
        sibling.filter(|&sibling| self.nodes.get(sibling).len() > Self::MIN_KEYS)
    }

    /// The separator at `index` moves down to the end of `node` and the smallest key of
    /// `right` takes its place
    fn borrow_from_right(
        &mut self,
        parent: NodeId,
        index: usize,
        node: NodeId,
        right: NodeId,
    ) -> Result<()> {
        let (key, child) = self.nodes.get_mut(right).pop_front();
        let separator = self.nodes.get_mut(parent).replace_key(index, key);
        self.nodes.get_mut(node).push_back(separator, child)?;
        tracing::trace!(?node, from = ?right, "key borrowed");
        Ok(())
    }

    /// The separator left of `node` moves down to its front and the greatest key of `left`
    /// takes its place
    fn borrow_from_left(
        &mut self,
        parent: NodeId,
        index: usize,
        left: NodeId,
        node: NodeId,
    ) -> Result<()> {
        let (key, child) = self.nodes.get_mut(left).pop_back();
        let separator = self.nodes.get_mut(parent).replace_key(index - 1, key);
        self.nodes.get_mut(node).push_front(separator, child)?;
        tracing::trace!(?node, from = ?left, "key borrowed");
        Ok(())
    }

    /// Fold `right` and the separator between the two siblings into `left`
    fn merge(
        &mut self,
        parent: NodeId,
        separator_index: usize,
        left: NodeId,
        right: NodeId,
    ) -> Result<()> {
        let (separator, unlinked) = self.nodes.get_mut(parent).remove(separator_index);
        debug_assert_eq!(unlinked, Some(right));
        let right_node = self.nodes.release(right);
        self.nodes.get_mut(left).absorb(separator, right_node)?;
        tracing::trace!(?left, ?right, "nodes merged");
        Ok(())
    }
}
