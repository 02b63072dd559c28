//! Context blobs
//!
//! A blob is the raw, fixed-layout copy of a [`ContextData`] value that the
//! host hands back to a kernel as `void *`. The blob owns its allocation and
//! returns it to the allocator it came from when dropped.
//!
//! Layouts (native endianness):
//! - window: a single `isize`
//! - shift: a single `f64`
//! - weights: a `usize` count, padded to `f64` alignment, then `count` `f64`s

use crate::alloc::BlobAllocator;
use crate::types::{CapsuleError, ContextData, Result};
use std::alloc::Layout;
use std::ffi::c_void;
use std::mem::{align_of, size_of};
use std::ptr::NonNull;
use std::sync::Arc;

/// Byte offset of the first weight after the count header
pub(crate) const WEIGHTS_OFFSET: usize = {
    let header = size_of::<usize>();
    let align = align_of::<f64>();
    (header + align - 1) / align * align
};

/// Heap block holding a kernel's parameters
pub struct ContextBlob {
    ptr: NonNull<u8>,
    layout: Layout,
    allocator: Arc<dyn BlobAllocator>,
}

// SAFETY: the block is written once in `allocate` and only read afterwards;
// the allocator is required to be Send + Sync.
unsafe impl Send for ContextBlob {}
unsafe impl Sync for ContextBlob {}

impl ContextBlob {
    /// Validate `data`, allocate a block for it and copy it in
    pub fn allocate(data: &ContextData, allocator: Arc<dyn BlobAllocator>) -> Result<Self> {
        data.validate()?;
        let layout = layout_for(data)?;

        let ptr = allocator
            .allocate(layout)
            .ok_or(CapsuleError::AllocationError {
                size: layout.size(),
            })?;

        // SAFETY: `ptr` is a fresh block of `layout`, which `layout_for`
        // sized for exactly this value.
        unsafe { write_into(data, ptr) };

        Ok(Self {
            ptr,
            layout,
            allocator,
        })
    }

    /// Pointer handed to the host as the callback's user data
    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr.as_ptr().cast()
    }

    /// Size of the block in bytes
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }
}

impl Drop for ContextBlob {
    fn drop(&mut self) {
        // SAFETY: ptr/layout came from this allocator and drop runs once.
        unsafe { self.allocator.deallocate(self.ptr, self.layout) };
        log::trace!("Context blob of {} bytes freed", self.layout.size());
    }
}

fn layout_for(data: &ContextData) -> Result<Layout> {
    match data {
        ContextData::Window { .. } => Ok(Layout::new::<isize>()),
        ContextData::Shift { .. } => Ok(Layout::new::<f64>()),
        ContextData::Weights { values } => weights_layout(values.len()),
    }
}

/// Layout of a weights blob with `count` entries
pub(crate) fn weights_layout(count: usize) -> Result<Layout> {
    let unsatisfiable = |_: std::alloc::LayoutError| CapsuleError::AllocationError {
        size: count.saturating_mul(size_of::<f64>()),
    };
    let (layout, offset) = Layout::new::<usize>()
        .extend(Layout::array::<f64>(count).map_err(unsatisfiable)?)
        .map_err(unsatisfiable)?;
    debug_assert_eq!(offset, WEIGHTS_OFFSET);
    Ok(layout.pad_to_align())
}

unsafe fn write_into(data: &ContextData, dst: NonNull<u8>) {
    match data {
        ContextData::Window { size } => {
            // validate() guarantees the size fits.
            dst.cast::<isize>().as_ptr().write(*size as isize);
        }
        ContextData::Shift { offset } => {
            dst.cast::<f64>().as_ptr().write(*offset);
        }
        ContextData::Weights { values } => {
            dst.cast::<usize>().as_ptr().write(values.len());
            let weights = dst.as_ptr().add(WEIGHTS_OFFSET).cast::<f64>();
            std::ptr::copy_nonoverlapping(values.as_ptr(), weights, values.len());
        }
    }
}

/// Read the window size out of a window blob
///
/// # Safety
///
/// `ctx` must point at a live window blob.
pub(crate) unsafe fn read_window(ctx: *const c_void) -> isize {
    ctx.cast::<isize>().read()
}

/// Read the shift out of a shift blob
///
/// # Safety
///
/// `ctx` must point at a live shift blob.
pub(crate) unsafe fn read_shift(ctx: *const c_void) -> f64 {
    ctx.cast::<f64>().read()
}

/// Borrow the weights stored in a weights blob
///
/// # Safety
///
/// `ctx` must point at a live weights blob that outlives `'a`.
pub(crate) unsafe fn read_weights<'a>(ctx: *const c_void) -> &'a [f64] {
    let count = ctx.cast::<usize>().read();
    let weights = ctx.cast::<u8>().add(WEIGHTS_OFFSET).cast::<f64>();
    std::slice::from_raw_parts(weights, count)
}
