//! Owned shared-object handles.
//!
//! [`Library`] owns a `dlopen` handle and closes it on drop. [`Symbol`] borrows
//! the library it came from, so an address can never outlive the object that
//! maps it.

use std::cell::RefCell;
use std::ffi::{CString, c_void};
use std::fmt;
use std::ptr::NonNull;

use dlbind_core::dlfcn::NO_ERROR;
use dlbind_core::{DlError, Mode, default_mode, library_file_name};
use tracing::debug;

use crate::loader;

/// Last diagnostic recorded against one library.
///
/// Replaced on every operation: cleared on success, overwritten on failure.
#[derive(Default)]
struct ErrorSlot(RefCell<Option<CString>>);

impl ErrorSlot {
    fn clear(&self) {
        self.0.borrow_mut().take();
    }

    fn set(&self, message: &str) {
        *self.0.borrow_mut() = Some(loader::to_c_message(message));
    }

    fn get(&self) -> Option<String> {
        self.0
            .borrow()
            .as_ref()
            .map(|msg| msg.to_string_lossy().into_owned())
    }
}

/// A loaded shared object (or the main program).
///
/// `Send` but not `Sync`: one owner at a time may drive it, since every call
/// rewrites the error slot.
pub struct Library {
    handle: Option<NonNull<c_void>>,
    name: Option<String>,
    mode: Mode,
    last_error: ErrorSlot,
}

// SAFETY: a dlopen handle is a process-global reference that may be used and
// closed from any thread. The error slot's RefCell keeps the type !Sync.
unsafe impl Send for Library {}

impl Library {
    /// Load `path` with `mode`. `None` yields a handle for the main program.
    pub fn open(path: Option<&str>, mode: Mode) -> Result<Self, DlError> {
        debug!(library = path.unwrap_or("<main program>"), ?mode, "dlopen");
        let flags = loader::effective_flags(mode.bits())?;
        let c_path = path.map(loader::to_c_name).transpose()?;

        match loader::open_raw(c_path.as_deref(), flags) {
            Ok(handle) => Ok(Self {
                handle: Some(handle),
                name: path.map(str::to_string),
                mode: Mode::from_bits(flags),
                last_error: ErrorSlot::default(),
            }),
            Err(message) => {
                debug!(%message, "dlopen failed");
                Err(DlError::Open {
                    library: path.map(str::to_string),
                    message,
                })
            }
        }
    }

    /// Load `path` with the configured default mode.
    pub fn open_default(path: Option<&str>) -> Result<Self, DlError> {
        Self::open(path, default_mode())
    }

    /// Load a library by name, appending the platform suffix if missing
    /// (`"libm"` becomes `"libm.so"` on Linux).
    pub fn open_named(name: &str) -> Result<Self, DlError> {
        let file_name = library_file_name(name);
        debug!(name, %file_name, "resolved library file name");
        Self::open(Some(&file_name), default_mode())
    }

    /// Handle for the main program and everything it loaded globally.
    pub fn this() -> Result<Self, DlError> {
        Self::open(None, default_mode())
    }

    /// Name the library was opened with; `None` for the main program.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Mode the loader actually received (after any hardened repair).
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The raw `dlopen` handle. Stays owned by `self`.
    #[must_use]
    pub fn as_raw(&self) -> *mut c_void {
        self.handle.map_or(std::ptr::null_mut(), NonNull::as_ptr)
    }

    /// Resolve `symbol` in this library.
    pub fn get(&self, symbol: &str) -> Result<Symbol<'_>, DlError> {
        debug!(symbol, library = self.name.as_deref(), "dlsym");
        let c_name = match loader::to_c_name(symbol) {
            Ok(c_name) => c_name,
            Err(err) => {
                self.last_error.set(&err.message());
                return Err(err);
            }
        };

        self.last_error.clear();
        // SAFETY: the handle is live for as long as `self` is.
        match unsafe { loader::sym_raw(self.as_raw(), &c_name) } {
            Ok(address) => Ok(Symbol {
                address,
                name: symbol.to_string(),
                library: self,
            }),
            Err(message) => {
                self.last_error.set(&message);
                Err(DlError::Symbol {
                    symbol: symbol.to_string(),
                    message,
                })
            }
        }
    }

    /// Message from the most recent failed operation, or `None` if the most
    /// recent operation succeeded.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.get()
    }

    /// Like [`Library::last_error`], but yields `"no error"` instead of `None`.
    #[must_use]
    pub fn error_message(&self) -> String {
        self.last_error()
            .unwrap_or_else(|| NO_ERROR.to_string_lossy().into_owned())
    }

    /// Close the handle now, reporting a `dlclose` failure. Dropping the
    /// library closes it too, but ignores failure.
    pub fn close(mut self) -> Result<(), DlError> {
        self.release()
            .map_err(|message| DlError::Close { message })
    }

    fn release(&mut self) -> Result<(), String> {
        self.last_error.clear();
        match self.handle.take() {
            Some(handle) => {
                debug!(library = self.name.as_deref(), "dlclose");
                // SAFETY: the handle came from dlopen and `take` guarantees it
                // is closed at most once.
                unsafe { loader::close_raw(handle) }
            }
            None => Ok(()),
        }
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        // Nothing to report to from a destructor.
        let _ = self.release();
    }
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Library")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("handle", &self.as_raw())
            .finish()
    }
}

/// A resolved symbol address, borrowed from its [`Library`].
///
/// The address has no type information; interpreting it is the caller's job.
pub struct Symbol<'lib> {
    address: *mut c_void,
    name: String,
    library: &'lib Library,
}

impl<'lib> Symbol<'lib> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The library this symbol was resolved from.
    #[must_use]
    pub fn library(&self) -> &'lib Library {
        self.library
    }

    #[must_use]
    pub fn as_ptr(&self) -> *mut c_void {
        self.address
    }

    /// A symbol may legitimately resolve to address zero.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.address.is_null()
    }

    /// Reinterpret the address as a pointer-sized value, typically an
    /// `extern "C" fn` pointer.
    ///
    /// # Safety
    ///
    /// `T` must match what the symbol actually is, and must not be used after
    /// the library is closed.
    #[must_use]
    pub unsafe fn cast<T: Copy>(&self) -> T {
        const {
            assert!(std::mem::size_of::<T>() == std::mem::size_of::<*mut c_void>());
        }
        unsafe { std::mem::transmute_copy::<*mut c_void, T>(&self.address) }
    }

    /// View `len` bytes starting at the symbol's address.
    ///
    /// # Safety
    ///
    /// The symbol must be data at least `len` bytes long that is not mutated
    /// while the slice is alive.
    #[must_use]
    pub unsafe fn as_bytes(&self, len: usize) -> &'lib [u8] {
        if self.address.is_null() || len == 0 {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.address.cast::<u8>(), len) }
    }
}

impl fmt::Debug for Symbol<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Symbol")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("library", &self.library.name)
            .finish()
    }
}
