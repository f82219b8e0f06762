//! Dynamic linking: mode flags, validators and message constants.
//!
//! Implements the `<dlfcn.h>` pure-logic helpers. Actual dlopen/dlsym/dlclose
//! invocations live in the ABI crate.

mod pseudo;

pub use pseudo::PseudoHandle;

use std::ffi::{CStr, c_int};
use std::fmt;
use std::ops::BitOr;

use crate::config::SafetyLevel;
use crate::error::DlError;

/// dlopen mode flags.
pub const RTLD_LAZY: c_int = libc::RTLD_LAZY;
pub const RTLD_NOW: c_int = libc::RTLD_NOW;
pub const RTLD_GLOBAL: c_int = libc::RTLD_GLOBAL;
pub const RTLD_LOCAL: c_int = libc::RTLD_LOCAL;
#[cfg(any(target_os = "linux", target_os = "android", target_vendor = "apple"))]
pub const RTLD_NOLOAD: c_int = libc::RTLD_NOLOAD;
#[cfg(any(target_os = "linux", target_os = "android", target_vendor = "apple"))]
pub const RTLD_NODELETE: c_int = libc::RTLD_NODELETE;
/// Prefer the object's own symbols over the global scope (glibc).
#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub const RTLD_DEEPBIND: c_int = libc::RTLD_DEEPBIND;
/// Search only the named image, not its dependencies (macOS 10.5+).
#[cfg(target_vendor = "apple")]
pub const RTLD_FIRST: c_int = libc::RTLD_FIRST;

/// Valid binding mode bits (exactly one of LAZY or NOW must be set).
const BINDING_MASK: c_int = RTLD_LAZY | RTLD_NOW;

/// Modifier bits hardened repair keeps. Strict mode forwards every modifier
/// bit and lets the loader judge the ones it does not know.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
const MODIFIER_MASK: c_int = RTLD_GLOBAL | RTLD_LOCAL | RTLD_NOLOAD | RTLD_NODELETE | RTLD_DEEPBIND;
#[cfg(any(all(target_os = "linux", not(target_env = "gnu")), target_os = "android"))]
const MODIFIER_MASK: c_int = RTLD_GLOBAL | RTLD_LOCAL | RTLD_NOLOAD | RTLD_NODELETE;
#[cfg(target_vendor = "apple")]
const MODIFIER_MASK: c_int = RTLD_GLOBAL | RTLD_LOCAL | RTLD_NOLOAD | RTLD_NODELETE | RTLD_FIRST;
#[cfg(not(any(target_os = "linux", target_os = "android", target_vendor = "apple")))]
const MODIFIER_MASK: c_int = RTLD_GLOBAL | RTLD_LOCAL;

/// Named mode constants, in the order the loader headers define them.
pub const MODE_CONSTANTS: &[(&str, c_int)] = &[
    ("RTLD_LAZY", RTLD_LAZY),
    ("RTLD_NOW", RTLD_NOW),
    ("RTLD_LOCAL", RTLD_LOCAL),
    ("RTLD_GLOBAL", RTLD_GLOBAL),
    #[cfg(any(target_os = "linux", target_os = "android", target_vendor = "apple"))]
    ("RTLD_NOLOAD", RTLD_NOLOAD),
    #[cfg(any(target_os = "linux", target_os = "android", target_vendor = "apple"))]
    ("RTLD_NODELETE", RTLD_NODELETE),
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    ("RTLD_DEEPBIND", RTLD_DEEPBIND),
    #[cfg(target_vendor = "apple")]
    ("RTLD_FIRST", RTLD_FIRST),
];

/// Look up a mode constant by its header name (`"RTLD_NOW"`, ...).
pub fn mode_constant(name: &str) -> Result<c_int, DlError> {
    MODE_CONSTANTS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|&(_, value)| value)
        .ok_or_else(|| DlError::UnknownConstant {
            name: name.to_string(),
        })
}

/// Returns `true` if `flags` name exactly one of RTLD_LAZY or RTLD_NOW.
///
/// Modifier bits are not inspected; they are OS-defined and go to the loader
/// as given.
#[inline]
pub fn valid_flags(flags: c_int) -> bool {
    let binding = flags & BINDING_MASK;
    binding == RTLD_LAZY || binding == RTLD_NOW
}

/// Returns `true` if every modifier bit in `flags` is one this platform
/// defines.
#[inline]
pub fn known_modifiers(flags: c_int) -> bool {
    flags & !BINDING_MASK & !MODIFIER_MASK == 0
}

/// Repair an invalid mode: keep known modifiers, drop unknown bits, and force
/// immediate binding when the binding bits are missing or ambiguous.
#[inline]
pub fn heal_flags(flags: c_int) -> c_int {
    let binding = match flags & BINDING_MASK {
        b if b == RTLD_LAZY || b == RTLD_NOW => b,
        _ => RTLD_NOW,
    };
    binding | (flags & MODIFIER_MASK)
}

/// Outcome of checking a requested dlopen mode against the runtime config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeCheck {
    /// Pass the flags to the loader unchanged.
    Pass(c_int),
    /// Hardened mode repaired the flags.
    Healed { requested: c_int, healed: c_int },
    /// Strict mode refuses the flags.
    Rejected(c_int),
}

impl ModeCheck {
    /// Flags to hand to `dlopen`, or `None` if the call must not proceed.
    #[must_use]
    pub const fn effective(self) -> Option<c_int> {
        match self {
            Self::Pass(flags) => Some(flags),
            Self::Healed { healed, .. } => Some(healed),
            Self::Rejected(_) => None,
        }
    }
}

/// Decide what to do with `flags` under `level`.
#[must_use]
pub fn check_mode(flags: c_int, level: SafetyLevel) -> ModeCheck {
    if !level.validation_enabled() || valid_flags(flags) {
        return ModeCheck::Pass(flags);
    }
    if level.heals_enabled() {
        ModeCheck::Healed {
            requested: flags,
            healed: heal_flags(flags),
        }
    } else {
        ModeCheck::Rejected(flags)
    }
}

/// A dlopen resolution mode.
///
/// Wraps the raw flag word so callers can compose modes with `|` and the
/// named constructors instead of juggling integers.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mode(c_int);

impl Mode {
    /// Resolve symbols as code references them.
    pub const LAZY: Self = Self(RTLD_LAZY);
    /// Resolve all symbols before `dlopen` returns.
    pub const NOW: Self = Self(RTLD_NOW);
    /// Make symbols available to subsequently loaded objects.
    pub const GLOBAL: Self = Self(RTLD_GLOBAL);
    pub const LOCAL: Self = Self(RTLD_LOCAL);
    /// Only succeed if the object is already resident.
    #[cfg(any(target_os = "linux", target_os = "android", target_vendor = "apple"))]
    pub const NOLOAD: Self = Self(RTLD_NOLOAD);
    /// Never unload the object on `dlclose`.
    #[cfg(any(target_os = "linux", target_os = "android", target_vendor = "apple"))]
    pub const NODELETE: Self = Self(RTLD_NODELETE);
    /// Bind the object's references to its own definitions first.
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    pub const DEEPBIND: Self = Self(RTLD_DEEPBIND);

    /// Wrap raw flags without validation.
    #[must_use]
    pub const fn from_bits(bits: c_int) -> Self {
        Self(bits)
    }

    /// Convert a wide integer, rejecting values outside the C `int` range.
    pub fn from_i64(value: i64) -> Result<Self, DlError> {
        c_int::try_from(value)
            .map(Self)
            .map_err(|_| DlError::ModeOutOfRange { value })
    }

    #[must_use]
    pub const fn bits(self) -> c_int {
        self.0
    }

    #[must_use]
    pub fn is_valid(self) -> bool {
        valid_flags(self.0)
    }

    /// Parse `lazy`, `now`, a header name like `RTLD_NOW`, or a decimal/hex
    /// integer.
    pub fn parse(s: &str) -> Result<Self, DlError> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "lazy" => return Ok(Self::LAZY),
            "now" => return Ok(Self::NOW),
            _ => {}
        }
        if let Ok(value) = mode_constant(trimmed) {
            return Ok(Self(value));
        }
        let parsed = match trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            Some(hex) => i64::from_str_radix(hex, 16),
            None => trimmed.parse::<i64>(),
        };
        match parsed {
            Ok(value) => Self::from_i64(value),
            Err(_) => Err(DlError::UnknownConstant {
                name: trimmed.to_string(),
            }),
        }
    }
}

impl Default for Mode {
    fn default() -> Self {
        Self::LAZY
    }
}

impl BitOr for Mode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = MODE_CONSTANTS
            .iter()
            .filter(|&&(_, bit)| bit != 0 && self.0 & bit == bit)
            .map(|&(name, _)| name)
            .collect();
        if names.is_empty() {
            write!(f, "Mode({:#x})", self.0)
        } else {
            write!(f, "Mode({})", names.join(" | "))
        }
    }
}

/// Message reported by the error accessor when nothing has failed.
pub const NO_ERROR: &CStr = c"no error";

/// Error message strings for failures detected before reaching the loader,
/// or when the loader failed without leaving a diagnostic.
pub const ERR_INVALID_MODE: &str = "invalid mode for dlopen";
pub const ERR_NOT_FOUND: &str = "shared object not found";
pub const ERR_SYMBOL_NOT_FOUND: &str = "undefined symbol";
pub const ERR_INVALID_HANDLE: &str = "invalid handle";
