//! Allocators for context blobs
//!
//! Every blob goes through a [`BlobAllocator`]. The system allocator is the
//! default; the counting and budget allocators wrap it for accounting and for
//! forcing allocation failures.

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Source of context blob memory
///
/// Implementations must be usable from any thread since capsules are `Send`.
pub trait BlobAllocator: Send + Sync {
    /// Allocate a block for `layout`, or `None` if it cannot be obtained.
    ///
    /// `layout` always has a non-zero size.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Return a block to the allocator
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate` on this allocator with the same
    /// `layout`, and must not be deallocated twice.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// Global Rust allocator
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl BlobAllocator for SystemAllocator {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        if layout.size() == 0 {
            return None;
        }
        // SAFETY: layout has non-zero size.
        NonNull::new(unsafe { std::alloc::alloc(layout) })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        std::alloc::dealloc(ptr.as_ptr(), layout);
    }
}

/// Snapshot of allocator activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct AllocationStats {
    pub allocations: usize,
    pub deallocations: usize,
    pub live_bytes: usize,
    pub failed: usize,
}

/// Wraps another allocator and counts what passes through it
pub struct CountingAllocator<A = SystemAllocator> {
    inner: A,
    allocations: AtomicUsize,
    deallocations: AtomicUsize,
    live_bytes: AtomicUsize,
    failed: AtomicUsize,
}

impl CountingAllocator<SystemAllocator> {
    pub fn new() -> Self {
        Self::wrap(SystemAllocator)
    }
}

impl Default for CountingAllocator<SystemAllocator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: BlobAllocator> CountingAllocator<A> {
    pub fn wrap(inner: A) -> Self {
        Self {
            inner,
            allocations: AtomicUsize::new(0),
            deallocations: AtomicUsize::new(0),
            live_bytes: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    pub fn stats(&self) -> AllocationStats {
        AllocationStats {
            allocations: self.allocations.load(Ordering::Acquire),
            deallocations: self.deallocations.load(Ordering::Acquire),
            live_bytes: self.live_bytes.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
        }
    }
}

impl<A: BlobAllocator> BlobAllocator for CountingAllocator<A> {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        match self.inner.allocate(layout) {
            Some(ptr) => {
                self.allocations.fetch_add(1, Ordering::AcqRel);
                self.live_bytes.fetch_add(layout.size(), Ordering::AcqRel);
                Some(ptr)
            }
            None => {
                self.failed.fetch_add(1, Ordering::AcqRel);
                None
            }
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.deallocations.fetch_add(1, Ordering::AcqRel);
        self.live_bytes.fetch_sub(layout.size(), Ordering::AcqRel);
        self.inner.deallocate(ptr, layout);
    }
}

/// Refuses any request that would push live bytes over a fixed budget
pub struct BudgetAllocator<A = SystemAllocator> {
    inner: A,
    limit: usize,
    in_use: AtomicUsize,
}

impl BudgetAllocator<SystemAllocator> {
    pub fn new(limit: usize) -> Self {
        Self::wrap(SystemAllocator, limit)
    }
}

impl<A: BlobAllocator> BudgetAllocator<A> {
    pub fn wrap(inner: A, limit: usize) -> Self {
        Self {
            inner,
            limit,
            in_use: AtomicUsize::new(0),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }
}

impl<A: BlobAllocator> BlobAllocator for BudgetAllocator<A> {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        let size = layout.size();
        // Reserve first so concurrent callers cannot both squeeze under the limit.
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(size).filter(|total| *total <= self.limit)
            })
            .ok()?;

        let ptr = self.inner.allocate(layout);
        if ptr.is_none() {
            self.in_use.fetch_sub(size, Ordering::AcqRel);
        }
        ptr
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.inner.deallocate(ptr, layout);
        self.in_use.fetch_sub(layout.size(), Ordering::AcqRel);
    }
}

impl<T: BlobAllocator + ?Sized> BlobAllocator for Arc<T> {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        (**self).allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        (**self).deallocate(ptr, layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting_allocator_tracks_live_bytes() {
        let alloc = CountingAllocator::new();
        let layout = Layout::new::<[f64; 4]>();

        let ptr = alloc.allocate(layout).unwrap();
        assert_eq!(alloc.stats().live_bytes, 32);

        unsafe { alloc.deallocate(ptr, layout) };
        let stats = alloc.stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.deallocations, 1);
        assert_eq!(stats.live_bytes, 0);
    }

    #[test]
    fn test_budget_allocator_refuses_over_limit() {
        let alloc = BudgetAllocator::new(16);
        let small = Layout::new::<f64>();

        let a = alloc.allocate(small).unwrap();
        let b = alloc.allocate(small).unwrap();
        assert!(alloc.allocate(small).is_none());
        assert_eq!(alloc.in_use(), 16);

        unsafe {
            alloc.deallocate(a, small);
            alloc.deallocate(b, small);
        }
        assert_eq!(alloc.in_use(), 0);
        assert!(alloc.allocate(Layout::new::<[f64; 3]>()).is_none());
    }

    #[test]
    fn test_zero_budget_counts_failures() {
        let alloc = CountingAllocator::wrap(BudgetAllocator::new(0));
        assert!(alloc.allocate(Layout::new::<isize>()).is_none());
        assert_eq!(alloc.stats().failed, 1);
        assert_eq!(alloc.stats().allocations, 0);
    }
}
