// The extern "C" entry points take raw pointers from foreign callers; their
// contracts are documented at module level rather than per function.
#![allow(clippy::missing_safety_doc)]
//! # dlbind-abi
//!
//! Loader wrapper with two surfaces over one set of primitives:
//!
//! - [`Library`] / [`Symbol`]: owned, release-on-drop handles for Rust callers.
//! - [`dlfcn_abi`]: `extern "C"` functions over a caller-allocated `lib_t`
//!   record, for foreign runtimes that manage the record's memory themselves.
//!
//! # Architecture
//!
//! ```text
//! Rust caller    -> Library::open/get/close ---\
//!                                                >-> loader (dlerror reset, call, capture) -> libc
//! foreign caller -> dlbind_open/sym/error/close-/
//! ```
//!
//! Mode flags are checked against the runtime config from `dlbind-core` before
//! they reach `dlopen`: strict mode rejects invalid modes, hardened mode
//! repairs them.

mod loader;

pub mod dlfcn_abi;
pub mod library;
pub mod pseudo;

pub use dlbind_core::{DlError, Mode, PseudoHandle};
pub use library::{Library, Symbol};
pub use pseudo::{is_pseudo_handle, pseudo_handle_ptr, resolve_in};
