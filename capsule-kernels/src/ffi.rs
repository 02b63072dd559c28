//! C ABI for binding layers
//!
//! A foreign binding layer builds capsules through the `ck_*_create`
//! functions, hands `ck_capsule_function` / `ck_capsule_user_data` to the
//! host, and frees the capsule with `ck_capsule_release` or
//! `ck_capsule_destroy`. Panics are caught at this boundary.

use crate::capsule::Capsule;
use crate::kernels;
use crate::types::{CapsuleError, KernelKind, Result};
use std::ffi::{c_char, c_int, c_void, CStr};
use std::panic;

pub const CK_OK: c_int = 0;
pub const CK_ERR_ALLOC: c_int = 1;
pub const CK_ERR_INVALID: c_int = 2;
pub const CK_ERR_PANIC: c_int = 3;

fn status_of(err: &CapsuleError) -> c_int {
    match err {
        CapsuleError::AllocationError { .. } => CK_ERR_ALLOC,
        _ => CK_ERR_INVALID,
    }
}

fn into_handle<F>(status: *mut c_int, build: F) -> *mut Capsule
where
    F: FnOnce() -> Result<Capsule> + panic::UnwindSafe,
{
    let (code, handle) = match panic::catch_unwind(build) {
        Ok(Ok(capsule)) => (CK_OK, Box::into_raw(Box::new(capsule))),
        Ok(Err(e)) => {
            log::debug!("Capsule construction failed: {}", e);
            (status_of(&e), std::ptr::null_mut())
        }
        Err(_) => (CK_ERR_PANIC, std::ptr::null_mut()),
    };
    if !status.is_null() {
        // SAFETY: caller passes either null or a writable int.
        unsafe { *status = code };
    }
    handle
}

/// Create a sliding-window average capsule.
///
/// Returns null and sets `*status` (if non-null) on failure.
#[no_mangle]
pub extern "C" fn ck_moving_average_create(window: isize, status: *mut c_int) -> *mut Capsule {
    into_handle(status, move || {
        let window = usize::try_from(window).map_err(|_| {
            CapsuleError::InvalidContext(format!("negative window size {}", window))
        })?;
        kernels::moving_average(window)
    })
}

/// Create a weighted stencil capsule; the weights are copied.
///
/// # Safety
///
/// `weights` must be valid for `len` reads (or null when `len` is 0).
#[no_mangle]
pub unsafe extern "C" fn ck_weighted_stencil_create(
    weights: *const f64,
    len: usize,
    status: *mut c_int,
) -> *mut Capsule {
    let values = if weights.is_null() || len == 0 {
        Vec::new()
    } else {
        std::slice::from_raw_parts(weights, len).to_vec()
    };
    into_handle(status, move || kernels::weighted_stencil(values))
}

/// Create a coordinate shift capsule.
#[no_mangle]
pub extern "C" fn ck_coordinate_shift_create(shift: f64, status: *mut c_int) -> *mut Capsule {
    into_handle(status, move || kernels::coordinate_shift(shift))
}

/// Entry point to give the host, or null for a null capsule.
///
/// # Safety
///
/// `capsule` must be null or a live pointer from a `ck_*_create` function.
#[no_mangle]
pub unsafe extern "C" fn ck_capsule_function(capsule: *const Capsule) -> *const c_void {
    match capsule.as_ref() {
        Some(c) => c.function_ptr(),
        None => std::ptr::null(),
    }
}

/// Context pointer to give the host; null for a null capsule.
///
/// # Safety
///
/// Same as [`ck_capsule_function`].
#[no_mangle]
pub unsafe extern "C" fn ck_capsule_user_data(capsule: *const Capsule) -> *mut c_void {
    match capsule.as_ref() {
        Some(c) => c.user_data(),
        None => std::ptr::null_mut(),
    }
}

/// Static, NUL-terminated signature string; null for a null capsule.
///
/// # Safety
///
/// Same as [`ck_capsule_function`].
#[no_mangle]
pub unsafe extern "C" fn ck_capsule_signature(capsule: *const Capsule) -> *const c_char {
    match capsule.as_ref() {
        Some(c) => signature_cstr(c.kind()).as_ptr(),
        None => std::ptr::null(),
    }
}

fn signature_cstr(kind: KernelKind) -> &'static CStr {
    match kind {
        KernelKind::Filter1d => c"int (double *, npy_intp, double *, npy_intp, void *)",
        KernelKind::Stencil => c"int (double *, npy_intp, double *, void *)",
        KernelKind::Transform => c"int (npy_intp *, double *, int, int, void *)",
    }
}

/// Free the capsule held in `*slot` and null the slot.
///
/// A null `slot`, or a slot that already holds null, is a no-op, so
/// redundant release calls are safe.
///
/// # Safety
///
/// `slot` must be null or point at a pointer that is null or came from a
/// `ck_*_create` function and has not been freed through another copy.
#[no_mangle]
pub unsafe extern "C" fn ck_capsule_release(slot: *mut *mut Capsule) {
    if slot.is_null() {
        return;
    }
    let capsule = std::mem::replace(&mut *slot, std::ptr::null_mut());
    ck_capsule_destroy(capsule);
}

/// Free a capsule pointer; null is a no-op.
///
/// # Safety
///
/// `capsule` must be null or a pointer from a `ck_*_create` function that
/// has not been freed. It must not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn ck_capsule_destroy(capsule: *mut Capsule) {
    if !capsule.is_null() {
        drop(Box::from_raw(capsule));
    }
}
