//! # dlbind-core
//!
//! Pure logic behind the dlbind loader wrapper: `<dlfcn.h>` mode flags and
//! their validation, pseudo-handle names, platform shared-object naming,
//! runtime configuration, and the error type shared by every surface.
//!
//! Nothing here calls into the dynamic loader. The actual `dlopen`/`dlsym`/
//! `dlerror`/`dlclose` invocations live in `dlbind-abi`.

pub mod config;
pub mod dlfcn;
pub mod error;
pub mod libname;

pub use config::{SafetyLevel, default_mode, safety_level};
pub use dlfcn::{Mode, ModeCheck, PseudoHandle};
pub use error::DlError;
pub use libname::library_file_name;
