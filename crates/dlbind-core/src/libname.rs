//! Platform shared-object naming.
//!
//! Callers usually name a library without its extension (`"libm"`); the loader
//! needs the platform suffix. A missing name means "the main program" and is
//! handled by the caller, not here.

/// Suffix for each `std::env::consts::OS` value this crate knows about.
const SUFFIXES: &[(&str, &str)] = &[
    ("linux", ".so"),
    ("android", ".so"),
    ("sunos", ".so"),
    ("solaris", ".so"),
    ("illumos", ".so"),
    ("freebsd", ".so"),
    ("openbsd", ".so"),
    ("netbsd", ".so"),
    ("dragonfly", ".so"),
    ("macos", ".dylib"),
    ("ios", ".dylib"),
    ("windows", ".dll"),
];

/// Shared-object suffix for `os`, if known.
#[must_use]
pub fn suffix_for_os(os: &str) -> Option<&'static str> {
    SUFFIXES
        .iter()
        .find(|(name, _)| *name == os)
        .map(|&(_, suffix)| suffix)
}

/// Shared-object suffix for the running platform (`.so` when unknown).
#[must_use]
pub fn platform_suffix() -> &'static str {
    suffix_for_os(std::env::consts::OS).unwrap_or(".so")
}

/// Append `suffix` to `name` unless it is already there.
///
/// Versioned sonames (`libc.so.6`) are left alone. Only the final path
/// component is inspected, so a directory such as `lib.so.d/` does not count.
#[must_use]
pub fn with_suffix(name: &str, suffix: &str) -> String {
    let file = name.rsplit(['/', '\\']).next().unwrap_or(name);
    if file.ends_with(suffix) || file.contains(&format!("{suffix}.")) {
        name.to_string()
    } else {
        format!("{name}{suffix}")
    }
}

/// File name the loader should see for `name` on this platform.
#[must_use]
pub fn library_file_name(name: &str) -> String {
    with_suffix(name, platform_suffix())
}
