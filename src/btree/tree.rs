use super::arena::NodeArena;
use super::frame_stack::FrameStack;
use super::node::{Node, NodeId};
use super::{Key, KeyId, DEFAULT_KEY_CAPACITY};
use crate::alloc::{Allocator, Global};
use crate::error::{Error, Result};

/// An ordered map from `KeyId` to caller data, stored in nodes of `K` key slots.
///
/// Insert, delete and traversals never recurse: the path they take from the root is recorded
/// on a frame stack, which is then popped to propagate splits and merges back up.
/// All memory the tree holds is requested through the allocator `A`.
pub struct BTree<V, A: Allocator = Global, const K: usize = DEFAULT_KEY_CAPACITY> {
    pub(super) nodes: NodeArena<V, A, K>,
    pub(super) frames: FrameStack<A>,
    pub(super) root: Option<NodeId>,
    pub(super) len: usize,
}

impl<V, const K: usize> BTree<V, Global, K> {
    pub fn new() -> Self {
        Self::with_allocator(Global)
    }
}

impl<V, A: Allocator + Clone + Default, const K: usize> Default for BTree<V, A, K> {
    fn default() -> Self {
        Self::with_allocator(A::default())
    }
}

impl<V, A: Allocator + Clone, const K: usize> BTree<V, A, K> {
    /// Create an empty tree. Nothing is allocated until the first insertion
    pub fn with_allocator(alloc: A) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::CAPACITY_CHECK;
        tracing::debug!(key_capacity = K, "tree created");
        BTree {
            nodes: NodeArena::new_in(alloc.clone()),
            frames: FrameStack::new_in(alloc),
            root: None,
            len: 0,
        }
    }
}

impl<V, A: Allocator, const K: usize> BTree<V, A, K> {
    /// Smallest number of keys a node other than the root holds between operations
    pub const MIN_KEYS: usize = (K - 1) / 2;

    const CAPACITY_CHECK: () = assert!(K >= 3, "nodes need at least 3 key slots");

    /// Return the total number of keys in the tree
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Return the number of levels, 0 for a tree without nodes
    pub fn height(&self) -> usize {
        let mut height = 0;
        let mut cursor = self.root;
        while let Some(node) = cursor {
            height += 1;
            cursor = self.nodes.get(node).child(0);
        }
        height
    }

    /// Return the allocator all the tree's memory comes from
    pub fn allocator(&self) -> &A {
        self.frames.allocator()
    }

    /// Look for the key with the given `id`.
    /// When absent and `want_nearest` is set, return the greatest key smaller than `id`, if any
    pub fn search(&self, id: KeyId, want_nearest: bool) -> Option<&Key<V>> {
        let mut nearest = None;
        let mut cursor = self.root;
        while let Some(node_id) = cursor {
            let node = self.nodes.get(node_id);
            match node.search(id) {
                Ok(index) => return Some(node.key(index)),
                Err(index) => {
                    // Every key below this child is greater than the one left of it
                    if index > 0 {
                        nearest = Some(node.key(index - 1));
                    }
                    cursor = node.child(index);
                }
            }
        }

        if want_nearest {
            nearest
        } else {
            None
        }
    }

    /// Return the data stored for `id`
    pub fn get(&self, id: KeyId) -> Option<&V> {
        self.search(id, false).map(|key| &key.data)
    }

    pub fn contains(&self, id: KeyId) -> bool {
        self.search(id, false).is_some()
    }

    /// Insert a new key. Return `false`, leaving the tree untouched, if `id` is already present.
    ///
    /// The key is always placed in a leaf. A node that reaches `K` keys is then split in two
    /// around its median, which moves up into the parent, possibly splitting it too. A split
    /// reaching the root adds a level to the tree.
    ///
    /// All nodes the splits will need are requested before anything is modified: on
    /// `AllocationFailed` the tree is exactly as it was before the call.
    pub fn insert(&mut self, id: KeyId, data: V) -> Result<bool> {
        self.frames.reset();

        let root = match self.root {
            Some(root) => root,
            None => {
                self.nodes.reserve(1)?;
                let root = self.nodes.place(Node::new());
                self.root = Some(root);
                root
            }
        };

        // Record the path down to the leaf where `id` belongs
        let mut cursor = Some(root);
        while let Some(node_id) = cursor {
            let node = self.nodes.get(node_id);
            let index = match node.search(id) {
                Ok(_) => return Ok(false),
                Err(index) => index,
            };
            self.frames.push(node_id, index)?;
            cursor = node.child(index);
        }

        let splits = self.pending_splits();
        self.nodes.reserve(splits)?;

        let leaf = self.frames.peek().ok_or(Error::OpDenied {
            op: "insert",
            reason: "no path was recorded",
        })?;
        self.nodes
            .get_mut(leaf.node)
            .insert(leaf.key_index, Key { id, data }, None)?;
        self.len += 1;

        self.propagate_splits()?;
        Ok(true)
    }

    /// Count the splits the insertion at the end of the recorded path will cause: one per
    /// full-but-one node going up from the leaf, plus a new root when the current one splits
    fn pending_splits(&self) -> usize {
        let mut splits = 0;
        for frame in self.frames.iter_from_top() {
            if self.nodes.get(frame.node).len() + 1 < K {
                return splits;
            }
            splits += 1;
        }
        splits + 1
    }

    /// Pop frames, splitting every node that has reached its capacity
    fn propagate_splits(&mut self) -> Result<()> {
        while let Some(frame) = self.frames.pop() {
            let node = self.nodes.get_mut(frame.node);
            if !node.is_full() {
                break;
            }

            let (median, right) = node.split();
            let right = self.nodes.place(right);
            tracing::trace!(left = ?frame.node, ?right, median = median.id, "node split");

            match self.frames.peek() {
                Some(parent) => {
                    self.nodes
                        .get_mut(parent.node)
                        .insert(parent.key_index, median, Some(right))?;
                }
                None => {
                    // Splitting reached the root: build a new one above it
                    let root = self.nodes.place(Node::with_median(median, frame.node, right));
                    tracing::trace!(?root, "tree height grew");
                    self.root = Some(root);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
impl<V, A: Allocator, const K: usize> BTree<V, A, K> {
    /// Panic if any structural invariant does not hold
    pub(crate) fn assert_invariants(&self) {
        let root = match self.root {
            Some(root) => root,
            None => {
                assert_eq!(self.len, 0);
                assert_eq!(self.nodes.live(), 0);
                return;
            }
        };

        let mut reachable = 0;
        let mut keys = 0;
        let mut leaf_depth = None;
        // Node, depth and exclusive bounds for its keys
        let mut pending = vec![(root, 0, None, None)];
        while let Some((node_id, depth, low, high)) = pending.pop() {
            let node = self.nodes.get(node_id);
            reachable += 1;
            keys += node.len();

            assert!(node.len() < K, "{:?} is full at rest", node_id);
            if node_id == root {
                assert!(node.is_leaf() || node.len() > 0, "empty internal root");
            } else {
                assert!(
                    node.len() >= Self::MIN_KEYS,
                    "{:?} holds {} keys",
                    node_id,
                    node.len()
                );
            }

            for pair in node.keys().windows(2) {
                assert!(pair[0].id < pair[1].id, "keys out of order");
            }
            for key in node.keys() {
                assert!(low.map_or(true, |low| key.id > low), "key below its range");
                assert!(high.map_or(true, |high| key.id < high), "key above its range");
            }

            if node.is_leaf() {
                assert!((0..=K).all(|i| node.child(i).is_none()));
                match leaf_depth {
                    None => leaf_depth = Some(depth),
                    Some(leaf_depth) => assert_eq!(leaf_depth, depth, "leaves at different depths"),
                }
            } else {
                assert_eq!(node.child(node.len() + 1), None);
                for i in 0..=node.len() {
                    let child = node.child(i).expect("internal node with a missing child");
                    let child_low = if i == 0 { low } else { Some(node.key(i - 1).id) };
                    let child_high = if i == node.len() {
                        high
                    } else {
                        Some(node.key(i).id)
                    };
                    pending.push((child, depth + 1, child_low, child_high));
                }
            }
        }

        assert_eq!(keys, self.len, "len out of sync");
        assert_eq!(reachable, self.nodes.live(), "unreachable nodes left in the arena");
        assert_eq!(leaf_depth.map_or(0, |depth| depth + 1), self.height());
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::alloc::TrackingAllocator;
    use crate::btree::VisitMode;

    const SCENARIO_IDS: [KeyId; 9] = [48, 85, 45, 92, 26, 49, 27, 22, 10];

    fn helper_ids<V, A: Allocator, const K: usize>(tree: &mut BTree<V, A, K>) -> Vec<KeyId> {
        let mut ids = vec![];
        tree.visit(VisitMode::InOrder, |id, _| {
            ids.push(id);
            true
        })
        .unwrap();
        ids
    }

    #[test]
    fn new_root() {
        // Fill root
        let mut tree: BTree<KeyId> = BTree::new();
        assert_eq!(tree.height(), 0);
        for i in 0..DEFAULT_KEY_CAPACITY as KeyId - 1 {
            assert!(tree.insert(i, i).unwrap());
        }
        assert_eq!(tree.len(), DEFAULT_KEY_CAPACITY - 1);
        assert_eq!(tree.height(), 1);

        // Split at insert
        assert!(tree.insert(100, 100).unwrap());
        assert_eq!(tree.len(), DEFAULT_KEY_CAPACITY);
        assert_eq!(tree.height(), 2);
        let root = tree.nodes.get(tree.root.unwrap());
        assert_eq!(root.len(), 1);
        assert_eq!(root.key(0).id, 2);
        tree.assert_invariants();
    }

    #[test]
    fn scenario_search() {
        let data: Vec<String> = SCENARIO_IDS.iter().map(|id| format!("value {}", id)).collect();
        let mut tree: BTree<&String, Global, 3> = BTree::new();
        for (id, value) in SCENARIO_IDS.iter().zip(&data) {
            assert!(tree.insert(*id, value).unwrap());
            tree.assert_invariants();
        }

        let found = tree.search(85, false).unwrap();
        assert_eq!(found.id, 85);
        assert!(std::ptr::eq(found.data, &data[1]));
        for (id, value) in SCENARIO_IDS.iter().zip(&data) {
            assert!(std::ptr::eq(*tree.get(*id).unwrap(), value));
        }
        assert_eq!(tree.get(50), None);

        assert_eq!(helper_ids(&mut tree), vec![10, 22, 26, 27, 45, 48, 49, 85, 92]);
    }

    #[test]
    fn duplicates_are_ignored() {
        let mut tree: BTree<&str, Global, 3> = BTree::new();
        assert!(tree.insert(7, "first").unwrap());
        assert!(tree.insert(8, "other").unwrap());
        assert!(!tree.insert(7, "second").unwrap());
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.get(7), Some(&"first"));
        assert_eq!(helper_ids(&mut tree), vec![7, 8]);
    }

    #[test]
    fn search_nearest() {
        let mut tree: BTree<()> = BTree::new();
        assert_eq!(tree.search(5, true), None);
        for id in [10, 20, 30].iter() {
            tree.insert(*id, ()).unwrap();
        }
        assert_eq!(tree.search(25, true).map(|key| key.id), Some(20));
        assert_eq!(tree.search(25, false), None);
        assert_eq!(tree.search(5, true), None);
        assert_eq!(tree.search(30, true).map(|key| key.id), Some(30));
        assert_eq!(tree.search(KeyId::MAX, true).map(|key| key.id), Some(30));

        // Nearest key found in a deeper level than the exact-match path would reach
        let mut tree: BTree<(), Global, 3> = BTree::new();
        for id in (0..200).map(|i| i * 10) {
            tree.insert(id, ()).unwrap();
        }
        for target in 0..2000 {
            let nearest = tree.search(target, true).unwrap().id;
            assert_eq!(nearest, target / 10 * 10);
        }
    }

    #[test]
    fn extreme_ids() {
        let mut tree: BTree<u8, Global, 3> = BTree::new();
        for (i, id) in [KeyId::MAX, 0, KeyId::MAX - 1, 1].iter().enumerate() {
            tree.insert(*id, i as u8).unwrap();
        }
        assert_eq!(helper_ids(&mut tree), vec![0, 1, KeyId::MAX - 1, KeyId::MAX]);
        assert_eq!(tree.get(KeyId::MAX), Some(&0));
        assert_eq!(tree.search(KeyId::MAX - 2, true).map(|key| key.id), Some(1));
    }

    #[test]
    fn height_grows_one_level_at_a_time() {
        fn check<const K: usize>() {
            let mut tree: BTree<(), Global, K> = BTree::new();
            let mut height = 0;
            for id in 0..2000 {
                tree.insert(id * 7 % 2003, ()).unwrap();
                let new_height = tree.height();
                assert!(new_height == height || new_height == height + 1);
                height = new_height;
            }
            tree.assert_invariants();
            assert!(height >= 3);
        }

        check::<3>();
        check::<4>();
        check::<5>();
        check::<16>();
    }

    #[test]
    fn insert_many() {
        fn check<const K: usize>(mut ids: Vec<KeyId>) {
            let mut tree: BTree<KeyId, Global, K> = BTree::new();
            for &id in &ids {
                tree.insert(id, id * 2).unwrap();
            }
            tree.assert_invariants();

            ids.sort();
            ids.dedup();
            assert_eq!(helper_ids(&mut tree), ids);
            for &id in &ids {
                assert_eq!(tree.get(id), Some(&(id * 2)));
            }
        }

        // Leaf tree
        check::<5>((0..4).collect());
        // Ascending, descending and interleaved
        check::<5>((0..1000).collect());
        check::<3>((0..1000).rev().collect());
        check::<4>((0..500).flat_map(|i| vec![i, 999 - i]).collect());
        // With repetitions
        check::<3>((0..300).map(|i| i * i % 97).collect());
    }

    #[test]
    fn refused_split_leaves_tree_untouched() {
        let mut tree: BTree<KeyId, TrackingAllocator, 3> =
            BTree::with_allocator(TrackingAllocator::new());
        for id in 1..=20 {
            tree.insert(id, id).unwrap();
        }

        // No more memory: inserting works until a split finds no room left in the arena
        let limit = tree.allocator().in_use();
        tree.allocator().set_limit(Some(limit));
        let mut refused = None;
        for id in 100..1100 {
            let before = helper_ids(&mut tree);
            let height = tree.height();
            match tree.insert(id, id) {
                Ok(inserted) => assert!(inserted),
                Err(err) => {
                    assert!(matches!(err, Error::AllocationFailed { context: "node", .. }));
                    assert_eq!(helper_ids(&mut tree), before);
                    assert_eq!(tree.height(), height);
                    assert!(!tree.contains(id));
                    refused = Some(id);
                    break;
                }
            }
        }
        tree.assert_invariants();
        let refused = refused.expect("the arena should have run out of room");
        assert!(tree.allocator().refusals() > 0);
        assert_eq!(tree.allocator().in_use(), limit);

        // Retrying with memory available succeeds
        tree.allocator().set_limit(None);
        assert!(tree.insert(refused, refused).unwrap());
        assert_eq!(tree.get(refused), Some(&refused));
        tree.assert_invariants();
    }

    #[test]
    fn refused_first_node() {
        let mut tree: BTree<(), TrackingAllocator> =
            BTree::with_allocator(TrackingAllocator::with_limit(0));
        let err = tree.insert(1, ()).unwrap_err();
        assert!(matches!(err, Error::AllocationFailed { .. }));
        assert!(tree.is_empty());
        assert_eq!(tree.height(), 0);
        tree.assert_invariants();
    }
}
