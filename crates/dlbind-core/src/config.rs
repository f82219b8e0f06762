//! Runtime configuration.
//!
//! Two process-wide settings, each read from the environment on first use and
//! cached thereafter:
//! - `DLBIND_MODE`: `strict` (default) rejects dlopen modes that do not name
//!   exactly one binding; `hardened` repairs them (forces `RTLD_NOW`, drops
//!   unknown bits) and proceeds.
//! - `DLBIND_DEFAULT_BINDING`: `lazy` (default) or `now`, the mode used when a
//!   caller opens a library without choosing one.
//!
//! Both can be overridden programmatically with [`set_safety_level`] and
//! [`set_default_mode`].

use std::sync::atomic::{AtomicU8, Ordering};

use crate::dlfcn::{Mode, RTLD_LAZY, RTLD_NOW};

pub const MODE_ENV: &str = "DLBIND_MODE";
pub const DEFAULT_BINDING_ENV: &str = "DLBIND_DEFAULT_BINDING";

/// How strictly dlopen modes are checked before reaching the loader.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SafetyLevel {
    /// Invalid modes fail with "invalid mode for dlopen".
    #[default]
    Strict,
    /// Invalid modes are repaired and the call proceeds.
    Hardened,
    /// No validation. Flags go to the loader untouched (benchmark baseline).
    Off,
}

impl SafetyLevel {
    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "strict" | "default" => Self::Strict,
            "hardened" | "repair" | "heal" => Self::Hardened,
            "off" | "none" | "disabled" => Self::Off,
            _ => Self::Strict,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Hardened => "hardened",
            Self::Off => "off",
        }
    }

    /// Returns true if invalid modes are repaired.
    #[must_use]
    pub const fn heals_enabled(self) -> bool {
        matches!(self, Self::Hardened)
    }

    /// Returns true if modes are checked at all.
    #[must_use]
    pub const fn validation_enabled(self) -> bool {
        !matches!(self, Self::Off)
    }
}

const UNRESOLVED: u8 = 0;
const RESOLVING: u8 = 255;

const LEVEL_STRICT: u8 = 1;
const LEVEL_HARDENED: u8 = 2;
const LEVEL_OFF: u8 = 3;

const BINDING_LAZY: u8 = 1;
const BINDING_NOW: u8 = 2;

static CACHED_LEVEL: AtomicU8 = AtomicU8::new(UNRESOLVED);
static CACHED_BINDING: AtomicU8 = AtomicU8::new(UNRESOLVED);

fn parse_mode_env(raw: &str) -> SafetyLevel {
    match SafetyLevel::from_str_loose(raw) {
        // The env contract is strict|hardened. `Off` stays reachable through
        // set_safety_level for benches.
        SafetyLevel::Off => SafetyLevel::Strict,
        level => level,
    }
}

fn parse_binding_env(raw: &str) -> Mode {
    match raw.trim().to_ascii_lowercase().as_str() {
        "now" | "immediate" | "rtld_now" => Mode::NOW,
        _ => Mode::LAZY,
    }
}

fn level_to_u8(level: SafetyLevel) -> u8 {
    match level {
        SafetyLevel::Strict => LEVEL_STRICT,
        SafetyLevel::Hardened => LEVEL_HARDENED,
        SafetyLevel::Off => LEVEL_OFF,
    }
}

fn u8_to_level(v: u8) -> SafetyLevel {
    match v {
        LEVEL_HARDENED => SafetyLevel::Hardened,
        LEVEL_OFF => SafetyLevel::Off,
        _ => SafetyLevel::Strict,
    }
}

fn mode_to_u8(mode: Mode) -> u8 {
    let binding = mode.bits() & (RTLD_LAZY | RTLD_NOW);
    if binding == RTLD_NOW { BINDING_NOW } else { BINDING_LAZY }
}

fn u8_to_mode(v: u8) -> Mode {
    if v == BINDING_NOW { Mode::NOW } else { Mode::LAZY }
}

/// Resolve a cached setting once.
///
/// Non-blocking: a caller that arrives while another is resolving gets
/// `fallback` instead of waiting.
fn resolve_cached(cell: &AtomicU8, fallback: u8, resolve: impl FnOnce() -> u8) -> u8 {
    let cached = cell.load(Ordering::Acquire);
    if cached != UNRESOLVED && cached != RESOLVING {
        return cached;
    }
    if cached == RESOLVING {
        return fallback;
    }
    if cell
        .compare_exchange(UNRESOLVED, RESOLVING, Ordering::SeqCst, Ordering::Relaxed)
        .is_err()
    {
        let v = cell.load(Ordering::Acquire);
        return if v != UNRESOLVED && v != RESOLVING {
            v
        } else {
            fallback
        };
    }
    let value = resolve();
    cell.store(value, Ordering::Release);
    value
}

/// Configured safety level (reads `DLBIND_MODE` on first call).
#[must_use]
pub fn safety_level() -> SafetyLevel {
    u8_to_level(resolve_cached(&CACHED_LEVEL, LEVEL_STRICT, || {
        let level = std::env::var(MODE_ENV)
            .map(|v| parse_mode_env(&v))
            .unwrap_or_default();
        level_to_u8(level)
    }))
}

/// Override the safety level for the rest of the process.
pub fn set_safety_level(level: SafetyLevel) {
    CACHED_LEVEL.store(level_to_u8(level), Ordering::Release);
}

/// Mode used when a caller does not pick one (reads `DLBIND_DEFAULT_BINDING`
/// on first call).
#[must_use]
pub fn default_mode() -> Mode {
    u8_to_mode(resolve_cached(&CACHED_BINDING, BINDING_LAZY, || {
        let mode = std::env::var(DEFAULT_BINDING_ENV)
            .map(|v| parse_binding_env(&v))
            .unwrap_or_default();
        mode_to_u8(mode)
    }))
}

/// Override the default binding.
///
/// Only the binding of `mode` is recorded: a mode whose binding is exactly
/// `RTLD_NOW` selects immediate binding, anything else selects lazy. Modifier
/// bits such as `RTLD_GLOBAL` are not part of the default and are dropped.
pub fn set_default_mode(mode: Mode) {
    CACHED_BINDING.store(mode_to_u8(mode), Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static CONFIG_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn parse_safety_levels() {
        assert_eq!(SafetyLevel::from_str_loose("strict"), SafetyLevel::Strict);
        assert_eq!(SafetyLevel::from_str_loose("STRICT"), SafetyLevel::Strict);
        assert_eq!(SafetyLevel::from_str_loose("default"), SafetyLevel::Strict);
        assert_eq!(
            SafetyLevel::from_str_loose("hardened"),
            SafetyLevel::Hardened
        );
        assert_eq!(SafetyLevel::from_str_loose("repair"), SafetyLevel::Hardened);
        assert_eq!(SafetyLevel::from_str_loose("off"), SafetyLevel::Off);
        assert_eq!(SafetyLevel::from_str_loose("bogus"), SafetyLevel::Strict);
    }

    #[test]
    fn env_parser_is_strict_or_hardened_only() {
        assert_eq!(parse_mode_env("hardened"), SafetyLevel::Hardened);
        assert_eq!(parse_mode_env("off"), SafetyLevel::Strict);
        assert_eq!(parse_mode_env("none"), SafetyLevel::Strict);
        assert_eq!(parse_mode_env(""), SafetyLevel::Strict);
    }

    #[test]
    fn binding_env_parser() {
        assert_eq!(parse_binding_env("now"), Mode::NOW);
        assert_eq!(parse_binding_env(" NOW "), Mode::NOW);
        assert_eq!(parse_binding_env("RTLD_NOW"), Mode::NOW);
        assert_eq!(parse_binding_env("lazy"), Mode::LAZY);
        assert_eq!(parse_binding_env("whenever"), Mode::LAZY);
    }

    #[test]
    fn healing_only_in_hardened() {
        assert!(!SafetyLevel::Strict.heals_enabled());
        assert!(SafetyLevel::Hardened.heals_enabled());
        assert!(!SafetyLevel::Off.heals_enabled());
        assert!(!SafetyLevel::Off.validation_enabled());
    }

    #[test]
    fn cached_level_is_sticky_until_overridden() {
        let _guard = CONFIG_LOCK.lock().unwrap();
        let previous = CACHED_LEVEL.swap(LEVEL_STRICT, Ordering::SeqCst);
        assert_eq!(safety_level(), SafetyLevel::Strict);
        set_safety_level(SafetyLevel::Hardened);
        assert_eq!(safety_level(), SafetyLevel::Hardened);
        assert_eq!(safety_level(), SafetyLevel::Hardened);
        CACHED_LEVEL.store(previous, Ordering::SeqCst);
    }

    #[test]
    fn resolving_state_returns_fallback() {
        let _guard = CONFIG_LOCK.lock().unwrap();
        let previous = CACHED_LEVEL.swap(RESOLVING, Ordering::SeqCst);
        assert_eq!(safety_level(), SafetyLevel::Strict);
        CACHED_LEVEL.store(previous, Ordering::SeqCst);

        let previous = CACHED_BINDING.swap(RESOLVING, Ordering::SeqCst);
        assert_eq!(default_mode(), Mode::LAZY);
        CACHED_BINDING.store(previous, Ordering::SeqCst);
    }

    #[test]
    fn default_mode_override() {
        let _guard = CONFIG_LOCK.lock().unwrap();
        let previous = CACHED_BINDING.swap(BINDING_LAZY, Ordering::SeqCst);
        assert_eq!(default_mode(), Mode::LAZY);
        set_default_mode(Mode::NOW);
        assert_eq!(default_mode(), Mode::NOW);
        set_default_mode(Mode::LAZY);
        assert_eq!(default_mode(), Mode::LAZY);
        set_default_mode(Mode::NOW | Mode::GLOBAL);
        assert_eq!(default_mode(), Mode::NOW);
        set_default_mode(Mode::LAZY | Mode::NOW);
        assert_eq!(default_mode(), Mode::LAZY);
        CACHED_BINDING.store(previous, Ordering::SeqCst);
    }
}
