//! Shared fixtures for the dlbind benchmarks.

use dlbind_abi::dlfcn_abi::dlbind_sizeof_lib_t;

/// Caller-style storage for a `LibT` record, sized by the library itself.
pub fn record_storage() -> Vec<usize> {
    let words = dlbind_sizeof_lib_t().div_ceil(std::mem::size_of::<usize>());
    vec![0; words]
}

/// Symbols every process image exports.
pub const HOT_SYMBOLS: &[&str] = &["malloc", "free", "strlen", "memcpy"];
