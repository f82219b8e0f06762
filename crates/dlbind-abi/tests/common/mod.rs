//! Shared fixtures for dlbind-abi integration tests.

#![allow(dead_code)]

/// A system library that is always present, and a function it exports.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub const KNOWN_LIBRARY: (&str, &str) = ("libm.so.6", "cos");
#[cfg(target_vendor = "apple")]
pub const KNOWN_LIBRARY: (&str, &str) = ("/usr/lib/libSystem.B.dylib", "cos");
#[cfg(not(any(all(target_os = "linux", target_env = "gnu"), target_vendor = "apple")))]
pub const KNOWN_LIBRARY: (&str, &str) = ("libc.so", "strlen");

pub const MISSING_LIBRARY: &str = "/nonexistent/dlbind/libdlbind_missing.so";
pub const MISSING_SYMBOL: &str = "dlbind_symbol_that_nobody_exports";
