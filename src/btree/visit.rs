use super::arena::NodeArena;
use super::frame_stack::FrameStack;
use super::node::NodeId;
use super::tree::BTree;
use super::{Key, KeyId};
use crate::alloc::Allocator;
use crate::error::Result;

/// Order in which `BTree::visit` reports keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitMode {
    /// A node's keys as soon as it is reached, before any of its children
    TopDown,
    /// A leaf's keys as soon as it is reached, an internal node's keys once all its children
    /// have been visited
    BottomUp,
    /// Every key in increasing id order
    InOrder,
}

/// One move of a depth-first walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Step {
    Enter(NodeId),
    /// Back in the node from its child at the given index
    Child(NodeId, usize),
    Leave(NodeId),
}

#[derive(Debug, Clone, Copy)]
enum Cursor {
    Descend(NodeId),
    Leave(NodeId),
    Ascend,
    Done,
}

/// Depth-first walk over every node under a root.
///
/// The path is kept on the tree's frame stack, one frame per internal node being walked,
/// holding the index of the child currently visited.
pub(super) struct Walk {
    cursor: Cursor,
}

impl Walk {
    pub(super) fn new(root: Option<NodeId>) -> Self {
        let cursor = match root {
            Some(root) => Cursor::Descend(root),
            None => Cursor::Done,
        };
        Walk { cursor }
    }

    /// Return the next step, or `None` once the walk is back above the root.
    /// A node is not read anymore once its `Leave` step has been returned
    pub(super) fn advance<V, A: Allocator, const K: usize>(
        &mut self,
        nodes: &NodeArena<V, A, K>,
        frames: &mut FrameStack<A>,
    ) -> Result<Option<Step>> {
        let step = match self.cursor {
            Cursor::Done => return Ok(None),
            Cursor::Descend(node) => {
                self.cursor = match nodes.get(node).child(0) {
                    Some(first) => {
                        frames.push(node, 0)?;
                        Cursor::Descend(first)
                    }
                    None => Cursor::Leave(node),
                };
                Step::Enter(node)
            }
            Cursor::Leave(node) => {
                self.cursor = Cursor::Ascend;
                Step::Leave(node)
            }
            Cursor::Ascend => {
                let frame = match frames.pop() {
                    Some(frame) => frame,
                    None => {
                        self.cursor = Cursor::Done;
                        return Ok(None);
                    }
                };
                let next = frame.key_index + 1;
                self.cursor = match nodes.get(frame.node).child(next) {
                    Some(child) => {
                        frames.push(frame.node, next)?;
                        Cursor::Descend(child)
                    }
                    None => Cursor::Leave(frame.node),
                };
                Step::Child(frame.node, frame.key_index)
            }
        };
        Ok(Some(step))
    }
}

/// Return the keys `mode` reports at `step`
fn reported_keys<V, A: Allocator, const K: usize>(
    nodes: &NodeArena<V, A, K>,
    mode: VisitMode,
    step: Step,
) -> &[Key<V>] {
    match (mode, step) {
        (VisitMode::TopDown, Step::Enter(node)) => nodes.get(node).keys(),
        (VisitMode::BottomUp, Step::Enter(node)) | (VisitMode::InOrder, Step::Enter(node))
            if nodes.get(node).is_leaf() =>
        {
            nodes.get(node).keys()
        }
        (VisitMode::BottomUp, Step::Leave(node)) if !nodes.get(node).is_leaf() => {
            nodes.get(node).keys()
        }
        (VisitMode::InOrder, Step::Child(node, index)) => {
            nodes.get(node).keys().get(index..=index).unwrap_or(&[])
        }
        _ => &[],
    }
}

impl<V, A: Allocator, const K: usize> BTree<V, A, K> {
    /// Call `visitor` with the id and data of every key, in the order given by `mode`.
    /// The walk stops early, successfully, as soon as `visitor` returns `false`
    pub fn visit<F>(&mut self, mode: VisitMode, mut visitor: F) -> Result<()>
    where
        F: FnMut(KeyId, &V) -> bool,
    {
        self.frames.reset();
        let mut walk = Walk::new(self.root);
        while let Some(step) = walk.advance(&self.nodes, &mut self.frames)? {
            for key in reported_keys(&self.nodes, mode, step) {
                if !visitor(key.id, &key.data) {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Free every node, children before their parents, then every buffer the tree holds.
    /// The tree is left empty and can be used again
    pub fn destroy(&mut self) -> Result<()> {
        tracing::debug!(keys = self.len, nodes = self.nodes.live(), "destroying tree");

        // One frame per level at most, so the walk cannot be refused halfway
        let height = self.height();
        self.frames.reset();
        self.frames.reserve(height)?;

        let mut walk = Walk::new(self.root.take());
        while let Some(step) = walk.advance(&self.nodes, &mut self.frames)? {
            if let Step::Leave(node) = step {
                self.nodes.release(node);
            }
        }

        self.nodes.clear();
        self.frames.release();
        self.len = 0;
        Ok(())
    }
}

impl<V, A: Allocator, const K: usize> Drop for BTree<V, A, K> {
    fn drop(&mut self) {
        if let Err(err) = self.destroy() {
            tracing::warn!(%err, "tree teardown failed");
        }
    }
}
