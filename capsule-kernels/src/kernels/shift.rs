//! Uniform coordinate shift for geometric transforms

use super::{STATUS_FAILED, STATUS_OK};
use crate::blob::read_shift;
use std::ffi::{c_int, c_void};

/// `input_coords[i] = output_coords[i] - shift` on every axis
///
/// The shift is read from the shift blob. Both ranks must be equal and
/// non-negative.
///
/// # Safety
///
/// `output_coords` must be valid for `output_rank` reads, `input_coords` for
/// `input_rank` writes, and `ctx` must point at a live shift blob.
#[no_mangle]
pub unsafe extern "C" fn shift_transform(
    output_coords: *const isize,
    input_coords: *mut f64,
    output_rank: c_int,
    input_rank: c_int,
    ctx: *mut c_void,
) -> c_int {
    if output_coords.is_null() || input_coords.is_null() || ctx.is_null() {
        return STATUS_FAILED;
    }
    if output_rank < 0 || output_rank != input_rank {
        return STATUS_FAILED;
    }

    let shift = read_shift(ctx);
    let rank = input_rank as usize;
    let from = std::slice::from_raw_parts(output_coords, rank);
    let to = std::slice::from_raw_parts_mut(input_coords, rank);
    for (dst, src) in to.iter_mut().zip(from) {
        *dst = *src as f64 - shift;
    }
    STATUS_OK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_two_axes() {
        let mut shift = 2.0f64;
        let out = [5isize, 5];
        let mut input = [0.0; 2];

        let status = unsafe {
            shift_transform(
                out.as_ptr(),
                input.as_mut_ptr(),
                2,
                2,
                (&mut shift as *mut f64).cast(),
            )
        };
        assert_eq!(status, STATUS_OK);
        assert_eq!(input, [3.0, 3.0]);
    }

    #[test]
    fn test_rank_mismatch_fails() {
        let mut shift = 1.0f64;
        let out = [1isize, 2, 3];
        let mut input = [0.0; 2];

        let status = unsafe {
            shift_transform(
                out.as_ptr(),
                input.as_mut_ptr(),
                3,
                2,
                (&mut shift as *mut f64).cast(),
            )
        };
        assert_eq!(status, STATUS_FAILED);
    }
}
