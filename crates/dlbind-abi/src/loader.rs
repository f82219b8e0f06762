//! Raw loader primitives shared by [`crate::Library`] and the `lib_t` ABI.
//!
//! Every call follows the same discipline: reset the thread's `dlerror`
//! state, make the loader call, then capture whatever `dlerror` reports. The
//! captured text is copied out immediately because the loader's buffer is only
//! valid until the next `dl*` call on this thread.

use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::ptr::NonNull;

use dlbind_core::dlfcn::{self as dlfcn_core, ModeCheck};
use dlbind_core::{DlError, safety_level};
use tracing::debug;

/// Reset the thread's `dlerror` state.
pub(crate) fn clear_dlerror() {
    // SAFETY: dlerror takes no arguments; discarding the returned pointer is
    // exactly how POSIX says to clear the pending error.
    unsafe {
        libc::dlerror();
    }
}

/// Take the pending `dlerror` message, if any, as owned text.
pub(crate) fn take_dlerror() -> Option<String> {
    // SAFETY: dlerror returns null or a NUL-terminated string valid until the
    // next dl* call on this thread; it is copied before returning.
    let msg = unsafe { libc::dlerror() };
    if msg.is_null() {
        None
    } else {
        Some(unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned())
    }
}

/// Flags to pass to `dlopen` under the configured safety level.
pub(crate) fn effective_flags(flags: c_int) -> Result<c_int, DlError> {
    match dlfcn_core::check_mode(flags, safety_level()) {
        ModeCheck::Pass(flags) => {
            if !dlfcn_core::known_modifiers(flags) {
                debug!(flags, "forwarding unrecognized dlopen modifier bits");
            }
            Ok(flags)
        }
        ModeCheck::Healed { requested, healed } => {
            debug!(requested, healed, "healed dlopen mode");
            Ok(healed)
        }
        ModeCheck::Rejected(mode) => Err(DlError::InvalidMode { mode }),
    }
}

/// `dlopen(path, flags)`. `None` opens the main program.
pub(crate) fn open_raw(path: Option<&CStr>, flags: c_int) -> Result<NonNull<c_void>, String> {
    clear_dlerror();
    let filename: *const c_char = path.map_or(std::ptr::null(), CStr::as_ptr);
    // SAFETY: filename is null or a valid NUL-terminated string borrowed for
    // the duration of the call.
    let handle = unsafe { libc::dlopen(filename, flags) };
    NonNull::new(handle)
        .ok_or_else(|| take_dlerror().unwrap_or_else(|| dlfcn_core::ERR_NOT_FOUND.to_string()))
}

/// `dlsym(handle, name)`, with failure decided by `dlerror` rather than by a
/// null address.
///
/// # Safety
///
/// `handle` must be a live handle from `dlopen` or a loader pseudo-handle.
pub(crate) unsafe fn sym_raw(handle: *mut c_void, name: &CStr) -> Result<*mut c_void, String> {
    clear_dlerror();
    let addr = unsafe { libc::dlsym(handle, name.as_ptr()) };
    match take_dlerror() {
        Some(message) => Err(message),
        None => Ok(addr),
    }
}

/// `dlclose(handle)`.
///
/// # Safety
///
/// `handle` must be a live handle from `dlopen` that is not used afterwards.
pub(crate) unsafe fn close_raw(handle: NonNull<c_void>) -> Result<(), String> {
    clear_dlerror();
    let rc = unsafe { libc::dlclose(handle.as_ptr()) };
    if rc == 0 {
        Ok(())
    } else {
        Err(take_dlerror().unwrap_or_else(|| dlfcn_core::ERR_INVALID_HANDLE.to_string()))
    }
}

/// Convert a diagnostic into a C string, replacing interior NULs.
pub(crate) fn to_c_message(message: &str) -> CString {
    CString::new(message.replace('\0', "\u{fffd}")).unwrap_or_default()
}

/// Convert a caller-supplied name, rejecting interior NULs.
pub(crate) fn to_c_name(name: &str) -> Result<CString, DlError> {
    CString::new(name).map_err(|_| DlError::InvalidName {
        name: name.to_string(),
    })
}
