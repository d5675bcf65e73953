
use crate::{Allocator, BTree, KeyId, VisitMode};

/// Return every id of the tree, in increasing order
fn collect_ids<V, A: Allocator, const K: usize>(tree: &mut BTree<V, A, K>) -> Vec<KeyId> {
    let mut ids = Vec::with_capacity(tree.len());
    tree.visit(VisitMode::InOrder, |id, _| {
        ids.push(id);
        true
    })
    .unwrap();
    ids
}
