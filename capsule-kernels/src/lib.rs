//! Capsule Kernels Library
//!
//! Owned callback capsules for native array-processing hosts.
//!
//! A host library iterates over array data and calls an opaque C callback
//! with raw buffer pointers and a `void *` context. This crate builds those
//! (callback, context) pairs so that the context memory has exactly one
//! owner and is freed exactly once.
//!
//! # Architecture
//!
//! - [`ContextData`] is the typed parameter value (window, weights, shift)
//! - [`ContextBlob`] is its raw, fixed-layout copy handed to the host
//! - [`Capsule`] owns the blob and pairs it with a [`KernelEntry`]; safe
//!   construction only accepts a built-in [`Kernel`] whose layout matches
//! - [`kernels`] provides three built-in entry points and their factories
//! - [`host`] drives capsules the way the host does, for tests and tools
//! - [`ffi`] exposes construction and release over the C ABI
//!
//! The library does NOT implement the host's array iteration (boundary
//! handling, n-D footprints, output allocation).
//!
//! # Example Usage
//!
//! ```no_run
//! use capsule_kernels::{host, kernels};
//!
//! let mut capsule = kernels::moving_average(3).unwrap();
//! let smoothed = host::filter_line(&capsule, &[1.0, 2.0, 3.0, 4.0, 5.0], 3).unwrap();
//! assert_eq!(smoothed, vec![2.0, 3.0, 4.0]);
//!
//! // Explicit release is optional; dropping the capsule frees the blob too.
//! capsule.release();
//! capsule.release(); // no-op
//! ```

// Public modules
pub mod alloc;
pub mod blob;
pub mod capsule;
pub mod ffi;
pub mod host;
pub mod kernels;
pub mod types;

// Re-export main types for convenience
pub use alloc::{AllocationStats, BlobAllocator, BudgetAllocator, CountingAllocator, SystemAllocator};
pub use blob::ContextBlob;
pub use capsule::{Capsule, Filter1dFn, KernelEntry, StencilFn, TransformFn};
pub use kernels::Kernel;
pub use types::{CapsuleError, ContextData, KernelKind, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // Smoke test: a capsule can be built and released
        let mut capsule = kernels::coordinate_shift(1.0).unwrap();
        assert_eq!(capsule.kind(), KernelKind::Transform);
        assert!(capsule.release());
    }
}
