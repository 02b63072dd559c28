//! Sliding-window average line filter

use super::{STATUS_FAILED, STATUS_OK};
use crate::blob::read_window;
use std::ffi::{c_int, c_void};

/// `out[i]` = mean of `input[i..i + w]` for every output position
///
/// `w` is read from the window blob. Returns failure if a pointer is null,
/// the window is not positive, or the input line is too short to supply
/// `output_len` full windows.
///
/// # Safety
///
/// `input` must be valid for `input_len` reads, `output` for `output_len`
/// writes, and `ctx` must point at a live window blob.
#[no_mangle]
pub unsafe extern "C" fn moving_average_filter1d(
    input: *const f64,
    input_len: isize,
    output: *mut f64,
    output_len: isize,
    ctx: *mut c_void,
) -> c_int {
    if input.is_null() || output.is_null() || ctx.is_null() {
        return STATUS_FAILED;
    }
    let window = read_window(ctx);
    if window < 1 || input_len < 0 || output_len < 0 {
        return STATUS_FAILED;
    }
    match output_len.checked_add(window - 1) {
        Some(needed) if needed <= input_len => {}
        _ => return STATUS_FAILED,
    }

    let input = std::slice::from_raw_parts(input, input_len as usize);
    let output = std::slice::from_raw_parts_mut(output, output_len as usize);
    average_windows(input, output, window as usize);
    STATUS_OK
}

fn average_windows(input: &[f64], output: &mut [f64], window: usize) {
    let scale = window as f64;
    for (slot, samples) in output.iter_mut().zip(input.windows(window)) {
        *slot = samples.iter().sum::<f64>() / scale;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(input: &[f64], output_len: usize, window: isize) -> (c_int, Vec<f64>) {
        let mut ctx = window;
        let mut output = vec![0.0; output_len];
        let status = unsafe {
            moving_average_filter1d(
                input.as_ptr(),
                input.len() as isize,
                output.as_mut_ptr(),
                output.len() as isize,
                (&mut ctx as *mut isize).cast(),
            )
        };
        (status, output)
    }

    #[test]
    fn test_window_of_three() {
        let (status, output) = run(&[1.0, 2.0, 3.0, 4.0, 5.0], 3, 3);
        assert_eq!(status, STATUS_OK);
        assert_eq!(output, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_window_of_one_copies() {
        let (status, output) = run(&[4.0, -1.0], 2, 1);
        assert_eq!(status, STATUS_OK);
        assert_eq!(output, vec![4.0, -1.0]);
    }

    #[test]
    fn test_short_input_fails() {
        let (status, _) = run(&[1.0, 2.0], 2, 2);
        assert_eq!(status, STATUS_FAILED);
    }

    #[test]
    fn test_zero_window_fails() {
        let (status, _) = run(&[1.0, 2.0], 1, 0);
        assert_eq!(status, STATUS_FAILED);
    }
}
