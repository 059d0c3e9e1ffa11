//! Runtime-loaded NSS binding.

#![allow(unsafe_code)]

use std::ffi::c_int;

use libloading::{Library, Symbol};
use tracing::debug;

use crate::FIPS_ENABLED_SYMBOL;

type FipsEnabledFn = unsafe extern "C" fn() -> c_int;

/// Ask NSS for the system FIPS flag.
///
/// Returns `None` when no candidate library loads or none exports the
/// symbol, so the caller can fall back to the status file.
pub(crate) fn system_fips_enabled(library_names: &[String]) -> Option<bool> {
    let mut symbol = FIPS_ENABLED_SYMBOL.as_bytes().to_vec();
    symbol.push(0);

    for name in library_names {
        // SAFETY: NSS library initialisers have no caller-side preconditions.
        let library = match unsafe { Library::new(name) } {
            Ok(library) => library,
            Err(e) => {
                debug!(library = %name, error = %e, "cannot load cryptographic module");
                continue;
            }
        };

        // SAFETY: the NSS export is declared as `int SECMOD_GetSystemFIPSEnabled(void)`.
        let query: Symbol<'_, FipsEnabledFn> = match unsafe { library.get(&symbol) } {
            Ok(query) => query,
            Err(e) => {
                debug!(library = %name, error = %e, "cannot resolve {FIPS_ENABLED_SYMBOL}");
                continue;
            }
        };

        debug!(library = %name, "calling {FIPS_ENABLED_SYMBOL}");
        // SAFETY: zero-argument query; `library` outlives the call.
        let returned = unsafe { query() };
        debug!(returned = format_args!("{returned:#x}"), "{FIPS_ENABLED_SYMBOL} returned");
        return Some(returned == 1);
    }

    None
}
