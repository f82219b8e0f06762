//! Inventory of loader constants on the running platform.

use std::collections::BTreeMap;

use dlbind_abi::dlfcn_abi::dlbind_sizeof_lib_t;
use dlbind_core::dlfcn::MODE_CONSTANTS;
use dlbind_core::libname::platform_suffix;
use dlbind_core::{PseudoHandle, default_mode, safety_level};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ConstantsReport {
    pub os: &'static str,
    pub library_suffix: &'static str,
    pub sizeof_lib_t: usize,
    pub mode_constants: BTreeMap<&'static str, i32>,
    pub pseudo_handles: Vec<&'static str>,
    pub safety_level: &'static str,
    pub default_flags: i32,
}

impl ConstantsReport {
    #[must_use]
    pub fn collect() -> Self {
        Self {
            os: std::env::consts::OS,
            library_suffix: platform_suffix(),
            sizeof_lib_t: dlbind_sizeof_lib_t(),
            mode_constants: MODE_CONSTANTS.iter().copied().collect(),
            pseudo_handles: PseudoHandle::ALL.iter().map(|h| h.name()).collect(),
            safety_level: safety_level().as_str(),
            default_flags: default_mode().bits(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inventory_lists_core_constants() {
        let report = ConstantsReport::collect();
        assert!(report.mode_constants.contains_key("RTLD_LAZY"));
        assert!(report.mode_constants.contains_key("RTLD_NOW"));
        assert!(report.pseudo_handles.contains(&"RTLD_DEFAULT"));
        assert!(report.sizeof_lib_t >= 2 * std::mem::size_of::<usize>());
        let json = report.to_json().unwrap();
        assert!(json.contains("library_suffix"));
    }
}
