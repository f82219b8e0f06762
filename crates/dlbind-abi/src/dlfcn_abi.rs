//! ABI layer over a caller-allocated `lib_t` record.
//!
//! A foreign runtime allocates `dlbind_sizeof_lib_t()` bytes in memory it
//! manages (a GC'd buffer, say), hands the block to `dlbind_open`, and passes
//! it back to every later call. The record owns the `dlopen` handle and the
//! last diagnostic; the caller owns the record.
//!
//! A record may also hold a loader pseudo-handle (`dlbind_open_pseudo`, or a
//! value from `dlbind_pseudo_handle` stored in `handle` directly). On Linux
//! `RTLD_DEFAULT` is the null pointer, so a null handle is a valid lookup
//! scope and is passed to `dlsym` as is.
//!
//! Calls on an unopened or reused-without-close record are undefined by
//! contract. Null records are still refused.

use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::ptr;

use dlbind_core::dlfcn::{self as dlfcn_core, NO_ERROR};
use dlbind_core::{PseudoHandle, default_mode};
use tracing::debug;

use crate::loader;
use crate::pseudo::{is_pseudo_handle, pseudo_handle_ptr};

// ---------------------------------------------------------------------------
// lib_t
// ---------------------------------------------------------------------------

/// Handle record shared with the foreign caller.
#[repr(C)]
#[derive(Debug)]
pub struct LibT {
    /// `dlopen` handle, or null when unopened/closed.
    pub handle: *mut c_void,
    /// Last diagnostic, owned by this library, or null after a success.
    pub errmsg: *mut c_char,
}

impl LibT {
    pub const EMPTY: Self = Self {
        handle: ptr::null_mut(),
        errmsg: ptr::null_mut(),
    };

    /// Free the retained message, if any.
    fn clear_error(&mut self) {
        if !self.errmsg.is_null() {
            // SAFETY: errmsg is only ever set from CString::into_raw below.
            drop(unsafe { CString::from_raw(self.errmsg) });
            self.errmsg = ptr::null_mut();
        }
    }

    /// Replace the retained message and return the failure status.
    fn fail(&mut self, message: &str) -> c_int {
        self.clear_error();
        debug!(%message, "lib_t operation failed");
        self.errmsg = loader::to_c_message(message).into_raw();
        -1
    }
}

/// Bytes the caller must allocate for one record.
#[unsafe(no_mangle)]
pub extern "C" fn dlbind_sizeof_lib_t() -> usize {
    std::mem::size_of::<LibT>()
}

// ---------------------------------------------------------------------------
// open
// ---------------------------------------------------------------------------

/// Open `filename` (or the main program if null) into `lib`.
///
/// Returns 0 on success and -1 on failure, with the diagnostic available from
/// `dlbind_error`. The record's previous contents are never read; to reuse a
/// record, `dlbind_close` it first.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dlbind_open(
    filename: *const c_char,
    lib: *mut LibT,
    mode: c_int,
) -> c_int {
    if lib.is_null() {
        return -1;
    }
    // SAFETY: caller provides at least dlbind_sizeof_lib_t() writable bytes.
    unsafe { ptr::write(lib, LibT::EMPTY) };
    let lib = unsafe { &mut *lib };

    let flags = match loader::effective_flags(mode) {
        Ok(flags) => flags,
        Err(err) => return lib.fail(&err.message()),
    };

    let path = if filename.is_null() {
        None
    } else {
        // SAFETY: non-null filename is a NUL-terminated string per contract.
        Some(unsafe { CStr::from_ptr(filename) })
    };

    match loader::open_raw(path, flags) {
        Ok(handle) => {
            lib.handle = handle.as_ptr();
            0
        }
        Err(message) => lib.fail(&message),
    }
}

// ---------------------------------------------------------------------------
// sym
// ---------------------------------------------------------------------------

/// Resolve `symbol` in `lib`, writing the address to `out` on success.
///
/// Failure is decided by the loader's diagnostic, not the address, so a symbol
/// that resolves to zero still returns 0.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dlbind_sym(
    lib: *mut LibT,
    symbol: *const c_char,
    out: *mut *mut c_void,
) -> c_int {
    if lib.is_null() {
        return -1;
    }
    // SAFETY: non-null lib was initialized by dlbind_open.
    let lib = unsafe { &mut *lib };

    if symbol.is_null() {
        return lib.fail(dlfcn_core::ERR_SYMBOL_NOT_FOUND);
    }

    lib.clear_error();
    // SAFETY: handle is a live dlopen handle or a pseudo-handle; symbol is a
    // NUL-terminated string per contract.
    match unsafe { loader::sym_raw(lib.handle, CStr::from_ptr(symbol)) } {
        Ok(addr) => {
            if !out.is_null() {
                unsafe { *out = addr };
            }
            0
        }
        Err(message) => lib.fail(&message),
    }
}

// ---------------------------------------------------------------------------
// error
// ---------------------------------------------------------------------------

/// Most recent diagnostic for `lib`, or `"no error"`.
///
/// The pointer stays valid until the next call on the same record.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dlbind_error(lib: *const LibT) -> *const c_char {
    if lib.is_null() {
        return NO_ERROR.as_ptr();
    }
    // SAFETY: non-null lib was initialized by dlbind_open.
    let errmsg = unsafe { (*lib).errmsg };
    if errmsg.is_null() {
        NO_ERROR.as_ptr()
    } else {
        errmsg
    }
}

// ---------------------------------------------------------------------------
// close
// ---------------------------------------------------------------------------

/// Release the handle and any retained message. Safe to call repeatedly.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dlbind_close(lib: *mut LibT) {
    if lib.is_null() {
        return;
    }
    // SAFETY: non-null lib was initialized by dlbind_open.
    let lib = unsafe { &mut *lib };
    lib.clear_error();

    let handle = std::mem::replace(&mut lib.handle, ptr::null_mut());
    if is_pseudo_handle(handle) {
        return;
    }
    if let Some(handle) = std::ptr::NonNull::new(handle) {
        // Ignore errors: nowhere to report them once the record is released.
        let _ = unsafe { loader::close_raw(handle) };
    }
}

// ---------------------------------------------------------------------------
// constants
// ---------------------------------------------------------------------------

/// Look up a mode constant (`"RTLD_NOW"`, ...) and write it to `out`.
///
/// Returns 0 if the name is known on this platform, -1 otherwise.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dlbind_mode_constant(name: *const c_char, out: *mut c_int) -> c_int {
    let Some(name) = (unsafe { c_name(name) }) else {
        return -1;
    };
    match dlfcn_core::mode_constant(name) {
        Ok(value) => {
            if !out.is_null() {
                unsafe { *out = value };
            }
            0
        }
        Err(_) => -1,
    }
}

/// Look up a pseudo-handle (`"RTLD_DEFAULT"`, ...) and write it to `out`.
///
/// Returns 0 if the name is known on this platform, -1 otherwise.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dlbind_pseudo_handle(
    name: *const c_char,
    out: *mut *mut c_void,
) -> c_int {
    let Some(name) = (unsafe { c_name(name) }) else {
        return -1;
    };
    match PseudoHandle::from_name(name) {
        Ok(handle) => {
            if !out.is_null() {
                unsafe { *out = pseudo_handle_ptr(handle) };
            }
            0
        }
        Err(_) => -1,
    }
}

/// Point `lib` at a pseudo-handle (`"RTLD_DEFAULT"`, `"RTLD_NEXT"`, ...) so
/// `dlbind_sym` searches that scope. Nothing is loaded; `dlbind_close` only
/// clears the record.
///
/// Like `dlbind_open`, the record's previous contents are never read.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dlbind_open_pseudo(name: *const c_char, lib: *mut LibT) -> c_int {
    if lib.is_null() {
        return -1;
    }
    // SAFETY: caller provides at least dlbind_sizeof_lib_t() writable bytes.
    unsafe { ptr::write(lib, LibT::EMPTY) };
    let lib = unsafe { &mut *lib };

    let Some(raw) = (unsafe { c_name(name) }) else {
        return lib.fail(dlfcn_core::ERR_INVALID_HANDLE);
    };
    match PseudoHandle::from_name(raw) {
        Ok(handle) => {
            lib.handle = pseudo_handle_ptr(handle);
            0
        }
        Err(err) => lib.fail(&err.message()),
    }
}

/// Mode `dlbind_open` callers should pass when they have no preference:
/// `RTLD_LAZY`, or `RTLD_NOW` under `DLBIND_DEFAULT_BINDING=now`.
#[unsafe(no_mangle)]
pub extern "C" fn dlbind_default_mode() -> c_int {
    default_mode().bits()
}

unsafe fn c_name<'a>(name: *const c_char) -> Option<&'a str> {
    if name.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(name) }.to_str().ok()
}
