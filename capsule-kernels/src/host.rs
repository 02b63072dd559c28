//! Host-side invocation of capsules
//!
//! The real host is an external filtering library that calls the raw entry
//! point with buffer pointers. This module does the same from Rust: the
//! `call_*` methods perform one callback invocation, and the free functions
//! iterate the way the host does (whole line, sliding neighbourhood, one
//! coordinate tuple at a time). A failure status stops the iteration.

use crate::capsule::{Capsule, KernelEntry};
use crate::types::{CapsuleError, KernelKind, Result};
use std::ffi::c_int;

impl Capsule {
    /// Invoke a line filter once over `input`, filling `output`
    pub fn call_filter1d(&self, input: &[f64], output: &mut [f64]) -> Result<()> {
        let KernelEntry::Filter1d(entry) = self.entry() else {
            return Err(self.mismatch(KernelKind::Filter1d));
        };
        let ctx = self.live_context()?;
        let input_len = to_intp(input.len())?;
        let output_len = to_intp(output.len())?;

        // SAFETY: slices are valid for their lengths and the blob lives as
        // long as `self` is borrowed.
        let status =
            unsafe { entry(input.as_ptr(), input_len, output.as_mut_ptr(), output_len, ctx) };
        self.check(status)
    }

    /// Invoke a neighbourhood filter once over `samples`
    pub fn call_stencil(&self, samples: &[f64]) -> Result<f64> {
        let KernelEntry::Stencil(entry) = self.entry() else {
            return Err(self.mismatch(KernelKind::Stencil));
        };
        let ctx = self.live_context()?;
        let size = to_intp(samples.len())?;

        let mut value = 0.0;
        // SAFETY: as above; `value` is a valid write target.
        let status = unsafe { entry(samples.as_ptr(), size, &mut value, ctx) };
        self.check(status)?;
        Ok(value)
    }

    /// Invoke a geometric transform once for one output coordinate tuple
    pub fn call_transform(&self, output_coords: &[isize], input_rank: usize) -> Result<Vec<f64>> {
        let KernelEntry::Transform(entry) = self.entry() else {
            return Err(self.mismatch(KernelKind::Transform));
        };
        let ctx = self.live_context()?;
        let output_rank = to_rank(output_coords.len())?;
        let rank = to_rank(input_rank)?;

        let mut input_coords = vec![0.0; input_rank];
        // SAFETY: as above; `input_coords` holds `input_rank` slots.
        let status = unsafe {
            entry(
                output_coords.as_ptr(),
                input_coords.as_mut_ptr(),
                output_rank,
                rank,
                ctx,
            )
        };
        self.check(status)?;
        Ok(input_coords)
    }

    fn live_context(&self) -> Result<*mut std::ffi::c_void> {
        let ctx = self.user_data();
        if ctx.is_null() {
            return Err(CapsuleError::Released);
        }
        Ok(ctx)
    }

    fn mismatch(&self, expected: KernelKind) -> CapsuleError {
        CapsuleError::SignatureMismatch {
            expected: expected.signature(),
            actual: self.signature(),
        }
    }

    fn check(&self, status: c_int) -> Result<()> {
        if status == 0 {
            log::trace!("Kernel {:?} returned failure", self.entry());
            return Err(CapsuleError::KernelFailure {
                signature: self.signature(),
            });
        }
        Ok(())
    }
}

fn to_intp(len: usize) -> Result<isize> {
    isize::try_from(len)
        .map_err(|_| CapsuleError::InvalidInput(format!("length {} exceeds npy_intp", len)))
}

fn to_rank(rank: usize) -> Result<c_int> {
    c_int::try_from(rank)
        .map_err(|_| CapsuleError::InvalidInput(format!("rank {} exceeds int", rank)))
}

/// Run a line filter over `input` with a host-side filter size
///
/// The output has `input.len() - filter_size + 1` elements, one per full
/// window.
pub fn filter_line(capsule: &Capsule, input: &[f64], filter_size: usize) -> Result<Vec<f64>> {
    let output_len = valid_len(input.len(), filter_size)?;
    log::trace!(
        "filter_line: {} samples, filter size {}, {} outputs",
        input.len(),
        filter_size,
        output_len
    );

    let mut output = vec![0.0; output_len];
    capsule.call_filter1d(input, &mut output)?;
    Ok(output)
}

/// Slide a `size`-wide neighbourhood over `input`, one stencil call per
/// position
pub fn filter_neighbourhoods(capsule: &Capsule, input: &[f64], size: usize) -> Result<Vec<f64>> {
    valid_len(input.len(), size)?;
    log::trace!(
        "filter_neighbourhoods: {} samples, neighbourhood {}",
        input.len(),
        size
    );

    input
        .windows(size)
        .map(|window| capsule.call_stencil(window))
        .collect()
}

/// Map each output coordinate tuple to an input coordinate tuple
pub fn transform_coordinates(
    capsule: &Capsule,
    coords: &[Vec<isize>],
    input_rank: usize,
) -> Result<Vec<Vec<f64>>> {
    log::trace!(
        "transform_coordinates: {} points, input rank {}",
        coords.len(),
        input_rank
    );

    coords
        .iter()
        .map(|point| capsule.call_transform(point, input_rank))
        .collect()
}

fn valid_len(input_len: usize, size: usize) -> Result<usize> {
    if size == 0 {
        return Err(CapsuleError::InvalidInput(
            "filter size must be at least 1".to_string(),
        ));
    }
    if input_len < size {
        return Err(CapsuleError::InvalidInput(format!(
            "input of {} samples is shorter than filter size {}",
            input_len, size
        )));
    }
    Ok(input_len - size + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::{coordinate_shift, moving_average, weighted_stencil};

    #[test]
    fn test_filter_line() {
        let capsule = moving_average(3).unwrap();
        let output = filter_line(&capsule, &[1.0, 2.0, 3.0, 4.0, 5.0], 3).unwrap();
        assert_eq!(output, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_host_size_larger_than_window_still_succeeds() {
        // Host picks the output length; the kernel only needs enough input.
        let capsule = moving_average(2).unwrap();
        let output = filter_line(&capsule, &[2.0, 4.0, 6.0, 8.0], 3).unwrap();
        assert_eq!(output, vec![3.0, 5.0]);
    }

    #[test]
    fn test_host_size_smaller_than_window_fails() {
        let capsule = moving_average(4).unwrap();
        let err = filter_line(&capsule, &[1.0, 2.0, 3.0, 4.0], 2).unwrap_err();
        assert!(matches!(err, CapsuleError::KernelFailure { .. }));
    }

    #[test]
    fn test_filter_neighbourhoods() {
        let capsule = weighted_stencil(vec![0.5, 0.5, 0.5]).unwrap();
        let output = filter_neighbourhoods(&capsule, &[1.0, 2.0, 3.0, 4.0], 3).unwrap();
        assert_eq!(output, vec![3.0, 4.5]);
    }

    #[test]
    fn test_neighbourhood_size_mismatch_stops() {
        let capsule = weighted_stencil(vec![1.0, 1.0]).unwrap();
        let err = filter_neighbourhoods(&capsule, &[1.0, 2.0, 3.0], 3).unwrap_err();
        assert!(matches!(err, CapsuleError::KernelFailure { .. }));
    }

    #[test]
    fn test_transform_coordinates() {
        let capsule = coordinate_shift(2.0).unwrap();
        let mapped = transform_coordinates(&capsule, &[vec![5, 5], vec![0, 10]], 2).unwrap();
        assert_eq!(mapped, vec![vec![3.0, 3.0], vec![-2.0, 8.0]]);
    }

    #[test]
    fn test_wrong_signature() {
        let capsule = coordinate_shift(1.0).unwrap();
        let err = capsule.call_stencil(&[1.0]).unwrap_err();
        assert!(matches!(err, CapsuleError::SignatureMismatch { .. }));
    }

    #[test]
    fn test_released_capsule_is_not_invoked() {
        let mut capsule = moving_average(1).unwrap();
        capsule.release();
        let err = filter_line(&capsule, &[1.0], 1).unwrap_err();
        assert!(matches!(err, CapsuleError::Released));
    }

    #[test]
    fn test_short_input_rejected_before_call() {
        let capsule = moving_average(3).unwrap();
        let err = filter_line(&capsule, &[1.0], 3).unwrap_err();
        assert!(matches!(err, CapsuleError::InvalidInput(_)));
    }
}
