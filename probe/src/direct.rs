//! Link-time NSS binding.

#![allow(unsafe_code)]

use std::ffi::c_int;

use tracing::debug;

#[link(name = "nss3")]
extern "C" {
    fn SECMOD_GetSystemFIPSEnabled() -> c_int;
}

/// Ask NSS for the system FIPS flag; only `1` means enabled.
pub(crate) fn system_fips_enabled() -> bool {
    debug!("calling SECMOD_GetSystemFIPSEnabled");
    // SAFETY: zero-argument query with no preconditions.
    let returned = unsafe { SECMOD_GetSystemFIPSEnabled() };
    debug!(
        returned = format_args!("{returned:#x}"),
        "SECMOD_GetSystemFIPSEnabled returned"
    );
    returned == 1
}
