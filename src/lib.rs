//! An embeddable B-tree index mapping `u64` ids to caller data.
//!
//! Nodes have a fixed number of key slots, chosen at compile time. Insert, delete and
//! traversals never recurse, and every byte the tree holds is requested through an
//! [`Allocator`] given at creation.

#[cfg(test)]
mod tests;

pub mod alloc;

pub mod btree;

mod error;

pub use alloc::{Allocator, Global, TrackingAllocator};
pub use btree::{BTree, Key, KeyId, VisitMode, DEFAULT_KEY_CAPACITY};
pub use error::{Error, Result};
