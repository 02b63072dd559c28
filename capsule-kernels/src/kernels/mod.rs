//! Built-in kernel adapters
//!
//! Each submodule provides an `extern "C"` entry point with the host's fixed
//! signature plus a factory that wraps it in a [`Capsule`] with the matching
//! context blob.

use crate::alloc::BlobAllocator;
use crate::capsule::{Capsule, KernelEntry};
use crate::types::{ContextData, KernelKind, Result};
use std::ffi::c_int;
use std::fmt;
use std::sync::Arc;

pub mod moving_average;
pub mod shift;
pub mod stencil;

pub use moving_average::moving_average_filter1d;
pub use shift::shift_transform;
pub use stencil::weighted_stencil_filter;

/// Status returned to the host when a call succeeded
pub const STATUS_OK: c_int = 1;
/// Status that makes the host stop iterating
pub const STATUS_FAILED: c_int = 0;

/// The built-in entry points, each tied to the blob layout it reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    MovingAverage,
    WeightedStencil,
    CoordinateShift,
}

impl Kernel {
    /// Pick the kernel that understands `data`
    pub fn for_context(data: &ContextData) -> Self {
        match data {
            ContextData::Window { .. } => Kernel::MovingAverage,
            ContextData::Weights { .. } => Kernel::WeightedStencil,
            ContextData::Shift { .. } => Kernel::CoordinateShift,
        }
    }

    pub fn entry(self) -> KernelEntry {
        match self {
            Kernel::MovingAverage => KernelEntry::Filter1d(moving_average_filter1d),
            Kernel::WeightedStencil => KernelEntry::Stencil(weighted_stencil_filter),
            Kernel::CoordinateShift => KernelEntry::Transform(shift_transform),
        }
    }

    pub fn kind(self) -> KernelKind {
        self.entry().kind()
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kernel::MovingAverage => write!(f, "moving average"),
            Kernel::WeightedStencil => write!(f, "weighted stencil"),
            Kernel::CoordinateShift => write!(f, "coordinate shift"),
        }
    }
}

/// Sliding-window average over `window` samples
pub fn moving_average(window: usize) -> Result<Capsule> {
    Capsule::create(Kernel::MovingAverage, &ContextData::window(window))
}

/// Dot product of each neighbourhood with `weights`
pub fn weighted_stencil(weights: impl Into<Vec<f64>>) -> Result<Capsule> {
    Capsule::create(Kernel::WeightedStencil, &ContextData::weights(weights))
}

/// Maps every output coordinate to `coordinate - offset`
pub fn coordinate_shift(offset: f64) -> Result<Capsule> {
    Capsule::create(Kernel::CoordinateShift, &ContextData::shift(offset))
}

/// Build the built-in capsule for `data` using `allocator`
pub fn builtin_capsule(data: &ContextData, allocator: Arc<dyn BlobAllocator>) -> Result<Capsule> {
    Capsule::create_in(Kernel::for_context(data), data, allocator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_for_context_matches_layout() {
        for data in [
            ContextData::window(2),
            ContextData::weights(vec![1.0]),
            ContextData::shift(0.0),
        ] {
            let kernel = Kernel::for_context(&data);
            assert_eq!(kernel.kind(), data.kind());
            assert_eq!(kernel.entry().kind(), data.kind());
        }
        assert_eq!(Kernel::for_context(&ContextData::window(2)), Kernel::MovingAverage);
    }

    #[test]
    fn test_factories_reject_bad_context() {
        assert!(moving_average(0).is_err());
        assert!(weighted_stencil(Vec::<f64>::new()).is_err());
        assert!(coordinate_shift(f64::NAN).is_err());
    }
}
