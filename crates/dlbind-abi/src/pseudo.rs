//! Lookups through loader sentinel handles (`RTLD_DEFAULT`, `RTLD_NEXT`, ...).

use std::ffi::c_void;

use dlbind_core::{DlError, PseudoHandle};
use tracing::debug;

use crate::loader;

/// The loader's value for `handle`.
#[must_use]
pub fn pseudo_handle_ptr(handle: PseudoHandle) -> *mut c_void {
    match handle {
        PseudoHandle::Default => libc::RTLD_DEFAULT,
        PseudoHandle::Next => libc::RTLD_NEXT,
        #[cfg(target_vendor = "apple")]
        PseudoHandle::SelfObject => libc::RTLD_SELF,
        #[cfg(target_vendor = "apple")]
        PseudoHandle::MainOnly => libc::RTLD_MAIN_ONLY,
    }
}

/// Returns `true` if `handle` is one of the loader's sentinel values rather
/// than something `dlopen` returned.
#[must_use]
pub fn is_pseudo_handle(handle: *mut c_void) -> bool {
    PseudoHandle::ALL
        .iter()
        .any(|&pseudo| pseudo_handle_ptr(pseudo) == handle)
}

/// Resolve `symbol` through a pseudo-handle without opening anything.
///
/// `RTLD_NEXT` searches the objects loaded after the one containing this
/// crate's code, which is what interposers want.
pub fn resolve_in(handle: PseudoHandle, symbol: &str) -> Result<*mut c_void, DlError> {
    debug!(%handle, symbol, "dlsym via pseudo-handle");
    let c_name = loader::to_c_name(symbol)?;
    // SAFETY: pseudo-handles are always acceptable to dlsym.
    unsafe { loader::sym_raw(pseudo_handle_ptr(handle), &c_name) }.map_err(|message| {
        DlError::Symbol {
            symbol: symbol.to_string(),
            message,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scope_finds_libc_symbols() {
        let addr = resolve_in(PseudoHandle::Default, "strlen").unwrap();
        assert!(!addr.is_null());
    }

    #[test]
    fn default_scope_reports_missing_symbols() {
        let err = resolve_in(PseudoHandle::Default, "dlbind_no_such_symbol_xyz").unwrap_err();
        assert!(!err.message().is_empty());
    }

    #[test]
    fn next_scope_skips_to_later_objects() {
        let addr = resolve_in(PseudoHandle::Next, "malloc").unwrap();
        assert!(!addr.is_null());
    }

    #[test]
    fn sentinels_are_recognized() {
        for &handle in PseudoHandle::ALL {
            assert!(is_pseudo_handle(pseudo_handle_ptr(handle)));
        }
        let lib = crate::Library::open(None, dlbind_core::Mode::LAZY).unwrap();
        assert!(!is_pseudo_handle(lib.as_raw()));
    }

    #[test]
    fn sentinels_are_distinct() {
        assert_ne!(
            pseudo_handle_ptr(PseudoHandle::Default),
            pseudo_handle_ptr(PseudoHandle::Next)
        );
    }
}
