mod arena;
mod delete;
mod frame_stack;
mod node;
mod tree;
mod visit;

pub use tree::BTree;
pub use visit::VisitMode;

/// Unique identity of a key, ordered as an unsigned integer
pub type KeyId = u64;

/// Number of key slots per node used when the capacity is not given explicitly.
/// A node holds at most `K - 1` keys between operations: reaching `K` triggers a split.
pub const DEFAULT_KEY_CAPACITY: usize = 5;

/// An entry of the tree: the id it is ordered by and the caller's data for it.
/// `data` is moved between nodes as-is and never inspected by the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Key<V> {
    pub id: KeyId,
    pub data: V,
}
