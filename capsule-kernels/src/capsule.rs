//! Owned callback capsules
//!
//! A [`Capsule`] pairs a host-callable entry point with the context blob the
//! entry point reads on every call. The capsule is the blob's only owner: the
//! blob is freed exactly once, either by [`Capsule::release`] or when the
//! capsule is dropped, whichever comes first.

use crate::alloc::{BlobAllocator, SystemAllocator};
use crate::blob::ContextBlob;
use crate::kernels::Kernel;
use crate::types::{CapsuleError, ContextData, KernelKind, Result};
use std::ffi::{c_int, c_void};
use std::fmt;
use std::sync::Arc;

/// `int (double *, npy_intp, double *, npy_intp, void *)`
pub type Filter1dFn =
    unsafe extern "C" fn(*const f64, isize, *mut f64, isize, *mut c_void) -> c_int;

/// `int (double *, npy_intp, double *, void *)`
pub type StencilFn = unsafe extern "C" fn(*const f64, isize, *mut f64, *mut c_void) -> c_int;

/// `int (npy_intp *, double *, int, int, void *)`
pub type TransformFn =
    unsafe extern "C" fn(*const isize, *mut f64, c_int, c_int, *mut c_void) -> c_int;

/// A kernel entry point tagged with the call shape it implements
#[derive(Clone, Copy)]
pub enum KernelEntry {
    Filter1d(Filter1dFn),
    Stencil(StencilFn),
    Transform(TransformFn),
}

impl KernelEntry {
    pub fn kind(&self) -> KernelKind {
        match self {
            KernelEntry::Filter1d(_) => KernelKind::Filter1d,
            KernelEntry::Stencil(_) => KernelKind::Stencil,
            KernelEntry::Transform(_) => KernelKind::Transform,
        }
    }

    /// Untyped function pointer, as the host stores it
    pub fn as_ptr(&self) -> *const c_void {
        match self {
            KernelEntry::Filter1d(f) => *f as *const c_void,
            KernelEntry::Stencil(f) => *f as *const c_void,
            KernelEntry::Transform(f) => *f as *const c_void,
        }
    }
}

impl fmt::Debug for KernelEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:p}", self.kind(), self.as_ptr())
    }
}

/// Function pointer plus its exclusively owned context blob
pub struct Capsule {
    entry: KernelEntry,
    context: Option<ContextBlob>,
    context_len: usize,
}

impl Capsule {
    /// Build a built-in capsule whose blob comes from the global allocator
    ///
    /// Fails with `AllocationError` if the blob cannot be obtained and with
    /// `InvalidContext` if `data` is rejected or is not the layout `kernel`
    /// reads. Nothing is allocated or leaked on any of these paths.
    pub fn create(kernel: Kernel, data: &ContextData) -> Result<Self> {
        Self::create_in(kernel, data, Arc::new(SystemAllocator))
    }

    /// Build a built-in capsule whose blob comes from `allocator`
    pub fn create_in(
        kernel: Kernel,
        data: &ContextData,
        allocator: Arc<dyn BlobAllocator>,
    ) -> Result<Self> {
        if kernel.kind() != data.kind() {
            return Err(CapsuleError::InvalidContext(format!(
                "{} kernel cannot read a {} context",
                kernel, data
            )));
        }
        Self::build(kernel.entry(), data, allocator)
    }

    /// Wrap an entry point that did not come from this crate
    ///
    /// No pairing check is made between `entry` and `data`.
    ///
    /// # Safety
    ///
    /// `entry` must read its `void *` argument using the blob layout that
    /// `data` produces (see [`crate::blob`]) and must not retain it past a call.
    pub unsafe fn from_entry(
        entry: KernelEntry,
        data: &ContextData,
        allocator: Arc<dyn BlobAllocator>,
    ) -> Result<Self> {
        Self::build(entry, data, allocator)
    }

    fn build(
        entry: KernelEntry,
        data: &ContextData,
        allocator: Arc<dyn BlobAllocator>,
    ) -> Result<Self> {
        let blob = ContextBlob::allocate(data, allocator)?;
        log::debug!(
            "Capsule created: {:?} with {} ({} byte context)",
            entry,
            data,
            blob.len()
        );
        Ok(Self {
            entry,
            context_len: blob.len(),
            context: Some(blob),
        })
    }

    /// Free the context blob
    ///
    /// Returns `true` on the call that actually freed it. Later calls, and the
    /// eventual drop, do nothing.
    pub fn release(&mut self) -> bool {
        match self.context.take() {
            Some(blob) => {
                drop(blob);
                log::debug!("Capsule released: {:?}", self.entry);
                true
            }
            None => false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.context.is_none()
    }

    pub fn entry(&self) -> KernelEntry {
        self.entry
    }

    pub fn kind(&self) -> KernelKind {
        self.entry.kind()
    }

    /// C prototype the host checks before accepting the callback
    pub fn signature(&self) -> &'static str {
        self.entry.kind().signature()
    }

    pub fn function_ptr(&self) -> *const c_void {
        self.entry.as_ptr()
    }

    /// Context pointer for the host; null once released
    pub fn user_data(&self) -> *mut c_void {
        self.context
            .as_ref()
            .map_or(std::ptr::null_mut(), ContextBlob::as_ptr)
    }

    /// Size of the context blob in bytes (kept after release)
    pub fn context_len(&self) -> usize {
        self.context_len
    }
}

impl fmt::Debug for Capsule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capsule")
            .field("entry", &self.entry)
            .field("context_len", &self.context_len)
            .field("released", &self.is_released())
            .finish()
    }
}
