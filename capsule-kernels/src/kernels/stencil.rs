//! Weighted neighbourhood filter

use super::{STATUS_FAILED, STATUS_OK};
use crate::blob::read_weights;
use std::ffi::{c_int, c_void};

/// Writes the dot product of the `size` samples in `buffer` and the stored
/// weights to `*result`
///
/// Fails if a pointer is null or `size` differs from the number of stored
/// weights.
///
/// # Safety
///
/// `buffer` must be valid for `size` reads, `result` for one write, and `ctx`
/// must point at a live weights blob.
#[no_mangle]
pub unsafe extern "C" fn weighted_stencil_filter(
    buffer: *const f64,
    size: isize,
    result: *mut f64,
    ctx: *mut c_void,
) -> c_int {
    if buffer.is_null() || result.is_null() || ctx.is_null() {
        return STATUS_FAILED;
    }
    let weights = read_weights(ctx);
    if size < 0 || size as usize != weights.len() {
        return STATUS_FAILED;
    }

    let samples = std::slice::from_raw_parts(buffer, size as usize);
    *result = samples.iter().zip(weights).map(|(s, w)| s * w).sum();
    STATUS_OK
}
