use crate::btree::KeyId;
use std::fmt;

/// Result type alias for tree operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything a tree operation can report besides success.
///
/// `IdNotFound` is an ordinary outcome of `delete`. The other variants mean the operation
/// was aborted before it could leave the tree in an inconsistent state.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The allocator refused a node or frame-stack request.
    AllocationFailed { bytes: usize, context: &'static str },
    /// The operation was attempted without its precondition holding.
    OpDenied { op: &'static str, reason: &'static str },
    /// A split or merge found the tree in a shape it cannot handle.
    RebalanceFailed { context: &'static str },
    /// The id to delete is not in the tree.
    IdNotFound { id: KeyId },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AllocationFailed { bytes, context } => {
                write!(f, "allocation of {bytes} bytes failed ({context})")
            }
            Error::OpDenied { op, reason } => write!(f, "{op} denied: {reason}"),
            Error::RebalanceFailed { context } => write!(f, "rebalance failed: {context}"),
            Error::IdNotFound { id } => write!(f, "id {id} not found"),
        }
    }
}

impl std::error::Error for Error {}
