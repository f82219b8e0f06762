//! Integration tests for the lib_t C ABI, driven the way a foreign runtime
//! drives it: a raw buffer of `dlbind_sizeof_lib_t()` bytes that it owns.

mod common;

use std::ffi::{CStr, CString, c_void};
use std::ptr;

use common::{KNOWN_LIBRARY, MISSING_LIBRARY, MISSING_SYMBOL};
use dlbind_abi::dlfcn_abi::{
    LibT, dlbind_close, dlbind_default_mode, dlbind_error, dlbind_mode_constant, dlbind_open,
    dlbind_open_pseudo, dlbind_pseudo_handle, dlbind_sizeof_lib_t, dlbind_sym,
};

/// Caller-managed storage, deliberately filled with garbage before open.
struct Record {
    words: Vec<usize>,
}

impl Record {
    fn new() -> Self {
        let size = dlbind_sizeof_lib_t();
        let words = size.div_ceil(std::mem::size_of::<usize>());
        Self {
            words: vec![0xDEAD_BEEF; words],
        }
    }

    fn as_ptr(&mut self) -> *mut LibT {
        self.words.as_mut_ptr().cast::<LibT>()
    }

    fn error(&mut self) -> String {
        let msg = unsafe { dlbind_error(self.as_ptr()) };
        unsafe { CStr::from_ptr(msg) }.to_str().unwrap().to_string()
    }
}

fn c(s: &str) -> CString {
    CString::new(s).unwrap()
}

#[test]
fn sizeof_lib_t_covers_two_pointers() {
    assert_eq!(dlbind_sizeof_lib_t(), std::mem::size_of::<LibT>());
    assert!(dlbind_sizeof_lib_t() >= 2 * std::mem::size_of::<*mut c_void>());
}

#[test]
fn opening_a_nonexistent_path_fails_with_message() {
    let mut rec = Record::new();
    let path = c(MISSING_LIBRARY);
    let rc = unsafe { dlbind_open(path.as_ptr(), rec.as_ptr(), libc::RTLD_LAZY) };
    assert_eq!(rc, -1);
    let msg = rec.error();
    assert!(!msg.is_empty());
    assert_ne!(msg, "no error");
    unsafe { dlbind_close(rec.as_ptr()) };
    assert_eq!(rec.error(), "no error");
}

#[test]
fn open_then_resolve_known_and_unknown_symbols() {
    let (name, symbol) = KNOWN_LIBRARY;
    let mut rec = Record::new();
    let path = c(name);
    assert_eq!(
        unsafe { dlbind_open(path.as_ptr(), rec.as_ptr(), libc::RTLD_NOW) },
        0
    );
    assert_eq!(rec.error(), "no error");

    let mut addr: *mut c_void = ptr::null_mut();
    let sym = c(symbol);
    assert_eq!(
        unsafe { dlbind_sym(rec.as_ptr(), sym.as_ptr(), &mut addr) },
        0
    );
    assert!(!addr.is_null());
    assert_eq!(rec.error(), "no error");

    let mut untouched: *mut c_void = ptr::null_mut();
    let missing = c(MISSING_SYMBOL);
    assert_eq!(
        unsafe { dlbind_sym(rec.as_ptr(), missing.as_ptr(), &mut untouched) },
        -1
    );
    assert!(untouched.is_null());
    let msg = rec.error();
    assert_ne!(msg, "no error");
    assert!(!msg.is_empty());

    unsafe { dlbind_close(rec.as_ptr()) };
}

#[test]
fn success_after_failure_restores_no_error() {
    let mut rec = Record::new();
    assert_eq!(
        unsafe { dlbind_open(ptr::null(), rec.as_ptr(), libc::RTLD_LAZY) },
        0
    );
    let missing = c(MISSING_SYMBOL);
    let mut addr = ptr::null_mut();
    assert_eq!(
        unsafe { dlbind_sym(rec.as_ptr(), missing.as_ptr(), &mut addr) },
        -1
    );
    assert_ne!(rec.error(), "no error");

    let malloc = c("malloc");
    assert_eq!(
        unsafe { dlbind_sym(rec.as_ptr(), malloc.as_ptr(), &mut addr) },
        0
    );
    assert_eq!(rec.error(), "no error");
    unsafe { dlbind_close(rec.as_ptr()) };
}

#[test]
fn closing_twice_does_not_crash() {
    let mut rec = Record::new();
    assert_eq!(
        unsafe { dlbind_open(ptr::null(), rec.as_ptr(), libc::RTLD_LAZY) },
        0
    );
    unsafe {
        dlbind_close(rec.as_ptr());
        dlbind_close(rec.as_ptr());
    }
    assert_eq!(rec.error(), "no error");
}

#[test]
fn closed_record_releases_its_handle() {
    let mut rec = Record::new();
    assert_eq!(
        unsafe { dlbind_open(ptr::null(), rec.as_ptr(), libc::RTLD_LAZY) },
        0
    );
    unsafe { dlbind_close(rec.as_ptr()) };
    assert!(unsafe { (*rec.as_ptr()).handle }.is_null());
    assert!(unsafe { (*rec.as_ptr()).errmsg }.is_null());
    assert_eq!(rec.error(), "no error");
}

#[test]
fn null_symbol_name_fails() {
    let mut rec = Record::new();
    assert_eq!(
        unsafe { dlbind_open(ptr::null(), rec.as_ptr(), libc::RTLD_LAZY) },
        0
    );
    let mut addr = ptr::null_mut();
    assert_eq!(
        unsafe { dlbind_sym(rec.as_ptr(), ptr::null(), &mut addr) },
        -1
    );
    assert_eq!(rec.error(), "undefined symbol");
    unsafe { dlbind_close(rec.as_ptr()) };
}

#[test]
fn record_is_reusable_after_close() {
    let mut rec = Record::new();
    let missing = c(MISSING_LIBRARY);
    assert_eq!(
        unsafe { dlbind_open(missing.as_ptr(), rec.as_ptr(), libc::RTLD_LAZY) },
        -1
    );
    unsafe { dlbind_close(rec.as_ptr()) };
    assert_eq!(
        unsafe { dlbind_open(ptr::null(), rec.as_ptr(), libc::RTLD_LAZY) },
        0
    );
    assert_eq!(rec.error(), "no error");
    unsafe { dlbind_close(rec.as_ptr()) };
}

#[test]
fn null_out_pointer_is_tolerated() {
    let mut rec = Record::new();
    assert_eq!(
        unsafe { dlbind_open(ptr::null(), rec.as_ptr(), libc::RTLD_LAZY) },
        0
    );
    let malloc = c("malloc");
    assert_eq!(
        unsafe { dlbind_sym(rec.as_ptr(), malloc.as_ptr(), ptr::null_mut()) },
        0
    );
    unsafe { dlbind_close(rec.as_ptr()) };
}

#[test]
fn exported_constants_match_the_loader() {
    let mut value = -1;
    let lazy = c("RTLD_LAZY");
    assert_eq!(unsafe { dlbind_mode_constant(lazy.as_ptr(), &mut value) }, 0);
    assert_eq!(value, libc::RTLD_LAZY);
    let global = c("RTLD_GLOBAL");
    assert_eq!(
        unsafe { dlbind_mode_constant(global.as_ptr(), &mut value) },
        0
    );
    assert_eq!(value, libc::RTLD_GLOBAL);

    let mut handle: *mut c_void = ptr::null_mut();
    let next = c("RTLD_NEXT");
    assert_eq!(
        unsafe { dlbind_pseudo_handle(next.as_ptr(), &mut handle) },
        0
    );
    assert_eq!(handle, libc::RTLD_NEXT);
    let bogus = c("RTLD_ELSEWHERE");
    assert_eq!(
        unsafe { dlbind_pseudo_handle(bogus.as_ptr(), &mut handle) },
        -1
    );
}

#[test]
fn exported_pseudo_handles_resolve_through_sym() {
    for name in ["RTLD_DEFAULT", "RTLD_NEXT"] {
        let mut handle: *mut c_void = ptr::null_mut();
        let c_handle = c(name);
        assert_eq!(
            unsafe { dlbind_pseudo_handle(c_handle.as_ptr(), &mut handle) },
            0
        );

        // Store the exported value into a caller-managed record, as a foreign
        // runtime would, and look up through it.
        let mut rec = Record::new();
        unsafe {
            rec.as_ptr().write(LibT {
                handle,
                errmsg: ptr::null_mut(),
            });
        }
        let malloc = c("malloc");
        let mut addr: *mut c_void = ptr::null_mut();
        assert_eq!(
            unsafe { dlbind_sym(rec.as_ptr(), malloc.as_ptr(), &mut addr) },
            0,
            "{name}: {}",
            rec.error()
        );
        assert!(!addr.is_null(), "{name}");
        assert_eq!(rec.error(), "no error");
        unsafe { dlbind_close(rec.as_ptr()) };
    }
}

#[test]
fn pseudo_record_resolves_and_closes_without_unloading() {
    let mut rec = Record::new();
    let name = c("RTLD_DEFAULT");
    assert_eq!(
        unsafe { dlbind_open_pseudo(name.as_ptr(), rec.as_ptr()) },
        0
    );
    assert_eq!(unsafe { (*rec.as_ptr()).handle }, libc::RTLD_DEFAULT);

    let mut addr: *mut c_void = ptr::null_mut();
    let strlen = c("strlen");
    assert_eq!(
        unsafe { dlbind_sym(rec.as_ptr(), strlen.as_ptr(), &mut addr) },
        0
    );
    assert!(!addr.is_null());

    let missing = c(MISSING_SYMBOL);
    assert_eq!(
        unsafe { dlbind_sym(rec.as_ptr(), missing.as_ptr(), &mut addr) },
        -1
    );
    assert_ne!(rec.error(), "no error");

    unsafe {
        dlbind_close(rec.as_ptr());
        dlbind_close(rec.as_ptr());
    }
    assert_eq!(rec.error(), "no error");
}

#[test]
fn unknown_pseudo_name_fails_open() {
    let mut rec = Record::new();
    let bogus = c("RTLD_ELSEWHERE");
    assert_eq!(
        unsafe { dlbind_open_pseudo(bogus.as_ptr(), rec.as_ptr()) },
        -1
    );
    assert!(rec.error().contains("RTLD_ELSEWHERE"));
    unsafe { dlbind_close(rec.as_ptr()) };
}

#[test]
fn default_mode_export_opens_the_main_program() {
    let mode = dlbind_default_mode();
    let mut value = 0;
    let lazy = c("RTLD_LAZY");
    let now = c("RTLD_NOW");
    let is_lazy = unsafe { dlbind_mode_constant(lazy.as_ptr(), &mut value) } == 0 && value == mode;
    let is_now = unsafe { dlbind_mode_constant(now.as_ptr(), &mut value) } == 0 && value == mode;
    assert!(is_lazy || is_now, "mode={mode:#x}");

    let mut rec = Record::new();
    assert_eq!(
        unsafe { dlbind_open(ptr::null(), rec.as_ptr(), mode) },
        0
    );
    assert_eq!(rec.error(), "no error");
    unsafe { dlbind_close(rec.as_ptr()) };
}
