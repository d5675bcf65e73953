//! Allocation capability injected into a tree at creation time.
//!
//! Node slots and the frame stack are `allocator_api2` vectors built over the tree's
//! allocator, so every byte the tree holds comes from it. A refused request surfaces as
//! [`Error::AllocationFailed`](crate::Error::AllocationFailed) and the tree is left as it was.

pub use allocator_api2::alloc::{AllocError, Allocator, Global, Layout};

use std::cell::Cell;
use std::ptr::NonNull;
use std::rc::Rc;

#[derive(Debug, Default)]
struct Usage {
    limit: Cell<Option<usize>>,
    in_use: Cell<usize>,
    peak: Cell<usize>,
    refusals: Cell<usize>,
}

/// Forwards requests to an inner allocator, keeping count of the bytes it holds and
/// optionally refusing requests past a limit.
///
/// Clones share their counters: a tree gets a clone and the caller keeps another one to
/// look at the usage, even after the tree is gone.
#[derive(Debug, Clone, Default)]
pub struct TrackingAllocator<A = Global> {
    inner: A,
    usage: Rc<Usage>,
}

impl TrackingAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse any request that would bring the bytes in use above `limit`
    pub fn with_limit(limit: usize) -> Self {
        let alloc = Self::new();
        alloc.set_limit(Some(limit));
        alloc
    }
}

impl<A> TrackingAllocator<A> {
    pub fn wrap(inner: A) -> Self {
        TrackingAllocator {
            inner,
            usage: Rc::default(),
        }
    }

    pub fn set_limit(&self, limit: Option<usize>) {
        self.usage.limit.set(limit);
    }

    /// Bytes currently held and not yet given back
    pub fn in_use(&self) -> usize {
        self.usage.in_use.get()
    }

    /// Highest value `in_use` has reached
    pub fn peak(&self) -> usize {
        self.usage.peak.get()
    }

    /// Number of requests refused so far
    pub fn refusals(&self) -> usize {
        self.usage.refusals.get()
    }

    /// Swap `released` held bytes for `acquired` new ones, if the limit allows it
    fn admit(&self, released: usize, acquired: usize) -> Result<(), AllocError> {
        let target = self.in_use() - released + acquired;
        if let Some(limit) = self.usage.limit.get() {
            if acquired > released && target > limit {
                self.usage.refusals.set(self.refusals() + 1);
                tracing::debug!(
                    requested = acquired,
                    in_use = self.in_use(),
                    limit,
                    "allocation refused"
                );
                return Err(AllocError);
            }
        }
        self.account(released, acquired);
        Ok(())
    }

    fn account(&self, released: usize, acquired: usize) {
        assert!(
            released <= self.in_use(),
            "giving back {} bytes with only {} in use",
            released,
            self.in_use()
        );
        let target = self.in_use() - released + acquired;
        self.usage.in_use.set(target);
        self.usage.peak.set(self.peak().max(target));
    }
}

// SAFETY: every request is forwarded unchanged to `inner`, which upholds the contract.
// Counting happens around the forwarded calls and never touches the memory.
unsafe impl<A: Allocator> Allocator for TrackingAllocator<A> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        self.admit(0, layout.size())?;
        self.inner.allocate(layout).map_err(|err| {
            self.account(layout.size(), 0);
            err
        })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: the caller guarantees `ptr` was allocated through `self`, hence `inner`
        unsafe { self.inner.deallocate(ptr, layout) };
        self.account(layout.size(), 0);
    }

    unsafe fn grow(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<[u8]>, AllocError> {
        self.admit(old_layout.size(), new_layout.size())?;
        // SAFETY: forwarded with the caller's guarantees
        unsafe { self.inner.grow(ptr, old_layout, new_layout) }.map_err(|err| {
            self.account(new_layout.size(), old_layout.size());
            err
        })
    }

    unsafe fn shrink(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<[u8]>, AllocError> {
        // SAFETY: forwarded with the caller's guarantees
        let shrunk = unsafe { self.inner.shrink(ptr, old_layout, new_layout) }?;
        self.account(old_layout.size(), new_layout.size());
        Ok(shrunk)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use allocator_api2::vec::Vec;

    fn helper_layout(size: usize) -> Layout {
        Layout::from_size_align(size, 8).unwrap()
    }

    #[test]
    fn tracks_usage() {
        let alloc = TrackingAllocator::new();
        let a = alloc.allocate(helper_layout(100)).unwrap();
        let b = alloc.allocate(helper_layout(50)).unwrap();
        let b = unsafe { alloc.grow(b.cast(), helper_layout(50), helper_layout(200)) }.unwrap();
        assert_eq!(alloc.in_use(), 300);

        unsafe {
            alloc.deallocate(a.cast(), helper_layout(100));
            alloc.deallocate(b.cast(), helper_layout(200));
        }
        assert_eq!(alloc.in_use(), 0);
        assert_eq!(alloc.peak(), 300);
        assert_eq!(alloc.refusals(), 0);
    }

    #[test]
    fn refuses_past_limit() {
        let alloc = TrackingAllocator::with_limit(100);
        let a = alloc.allocate(helper_layout(60)).unwrap();
        assert_eq!(alloc.allocate(helper_layout(41)), Err(AllocError));
        let grown = unsafe { alloc.grow(a.cast(), helper_layout(60), helper_layout(101)) };
        assert_eq!(grown, Err(AllocError));
        assert_eq!(alloc.in_use(), 60);
        assert_eq!(alloc.refusals(), 2);

        // Shrinking is always granted
        let a = unsafe { alloc.shrink(a.cast(), helper_layout(60), helper_layout(10)) }.unwrap();
        let b = alloc.allocate(helper_layout(90)).unwrap();

        alloc.set_limit(None);
        let c = alloc.allocate(helper_layout(1000)).unwrap();
        assert_eq!(alloc.in_use(), 1100);

        unsafe {
            alloc.deallocate(a.cast(), helper_layout(10));
            alloc.deallocate(b.cast(), helper_layout(90));
            alloc.deallocate(c.cast(), helper_layout(1000));
        }
        assert_eq!(alloc.in_use(), 0);
    }

    #[test]
    fn clones_share_counters() {
        let alloc = TrackingAllocator::new();
        {
            let mut values: Vec<u64, _> = Vec::new_in(alloc.clone());
            values.try_reserve_exact(16).unwrap();
            assert_eq!(alloc.in_use(), 16 * 8);
            values.extend(0..40);
            assert_eq!(alloc.in_use(), values.capacity() * 8);
        }
        assert_eq!(alloc.in_use(), 0);
        assert!(alloc.peak() >= 40 * 8);
    }

    #[test]
    fn refused_growth_keeps_vector() {
        let alloc = TrackingAllocator::with_limit(64);
        let mut values: Vec<u64, _> = Vec::new_in(alloc.clone());
        values.try_reserve_exact(8).unwrap();
        values.extend(0..8);
        assert!(values.try_reserve_exact(1).is_err());
        assert_eq!(values.len(), 8);
        assert_eq!(alloc.in_use(), 64);
        assert_eq!(alloc.refusals(), 1);
    }
}
