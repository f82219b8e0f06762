//! Loader sentinel handles accepted by `dlsym` without a prior `dlopen`.

use std::fmt;

use crate::error::DlError;

/// Special pseudo-handles for dlsym.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PseudoHandle {
    /// Use the default search order (global scope).
    Default,
    /// Search objects loaded after the caller's own object.
    Next,
    /// Search the caller's object and everything loaded after it.
    #[cfg(target_vendor = "apple")]
    SelfObject,
    /// Search the main executable only.
    #[cfg(target_vendor = "apple")]
    MainOnly,
}

impl PseudoHandle {
    pub const ALL: &'static [PseudoHandle] = &[
        Self::Default,
        Self::Next,
        #[cfg(target_vendor = "apple")]
        Self::SelfObject,
        #[cfg(target_vendor = "apple")]
        Self::MainOnly,
    ];

    /// Header name of the sentinel.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Default => "RTLD_DEFAULT",
            Self::Next => "RTLD_NEXT",
            #[cfg(target_vendor = "apple")]
            Self::SelfObject => "RTLD_SELF",
            #[cfg(target_vendor = "apple")]
            Self::MainOnly => "RTLD_MAIN_ONLY",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, DlError> {
        Self::ALL
            .iter()
            .copied()
            .find(|handle| handle.name() == name)
            .ok_or_else(|| DlError::UnknownConstant {
                name: name.to_string(),
            })
    }
}

impl fmt::Display for PseudoHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
