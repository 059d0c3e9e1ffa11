//! Native detection of the operating system's FIPS posture.
//!
//! Two strategies, chosen at build time:
//! - **Direct** (`nss` feature): link `libnss3` and call
//!   `SECMOD_GetSystemFIPSEnabled` through a static binding.
//! - **Dynamic** (default): load `libnss3` at runtime with `libloading` and
//!   resolve the same symbol. When the library or symbol is unavailable, read
//!   one byte from the kernel status file (`/proc/sys/crypto/fips_enabled`).
//!
//! A probe never reports `false` on ambiguity: failing to read the status
//! file is an error the caller must handle.

#![warn(missing_docs)]

#[cfg(feature = "nss")]
mod direct;
#[cfg(not(feature = "nss"))]
mod dynamic;
#[cfg_attr(feature = "nss", allow(dead_code))]
mod status;

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Kernel file exposing the FIPS switch as a single ASCII digit.
pub const DEFAULT_STATUS_PATH: &str = "/proc/sys/crypto/fips_enabled";

/// NSS export reporting whether the system runs in FIPS mode.
pub const FIPS_ENABLED_SYMBOL: &str = "SECMOD_GetSystemFIPSEnabled";

/// NSS library names tried in order by the dynamic strategy.
#[cfg(target_os = "macos")]
pub const DEFAULT_LIBRARY_NAMES: &[&str] = &["libnss3.dylib"];

/// NSS library names tried in order by the dynamic strategy.
#[cfg(target_os = "windows")]
pub const DEFAULT_LIBRARY_NAMES: &[&str] = &["nss3.dll"];

/// NSS library names tried in order by the dynamic strategy.
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub const DEFAULT_LIBRARY_NAMES: &[&str] = &["libnss3.so"];

/// Failure to determine the FIPS posture.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The status file could not be opened.
    #[error("cannot open {}: {source}", path.display())]
    Open {
        /// Status file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The status file could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// Status file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The status file contained no data.
    #[error("cannot read {}: file is empty", path.display())]
    Empty {
        /// Status file path.
        path: PathBuf,
    },
}

/// How the probe reaches the system cryptographic module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Link-time binding to `libnss3`.
    Direct,
    /// Runtime loading of `libnss3` with a status-file fallback.
    Dynamic,
}

impl Strategy {
    /// Strategy selected by this build.
    #[cfg(feature = "nss")]
    pub const COMPILED: Self = Self::Direct;

    /// Strategy selected by this build.
    #[cfg(not(feature = "nss"))]
    pub const COMPILED: Self = Self::Dynamic;
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => f.write_str("direct"),
            Self::Dynamic => f.write_str("dynamic"),
        }
    }
}

/// Queries the operating system for its FIPS posture.
///
/// Holds no state between calls; every [`probe`](Self::probe) re-evaluates.
#[derive(Debug, Clone)]
pub struct NativeProbe {
    #[cfg_attr(feature = "nss", allow(dead_code))]
    library_names: Vec<String>,
    #[cfg_attr(feature = "nss", allow(dead_code))]
    status_path: PathBuf,
}

impl Default for NativeProbe {
    fn default() -> Self {
        Self {
            library_names: DEFAULT_LIBRARY_NAMES
                .iter()
                .map(|name| (*name).to_owned())
                .collect(),
            status_path: PathBuf::from(DEFAULT_STATUS_PATH),
        }
    }
}

impl NativeProbe {
    /// Probe using the system library names and kernel status path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the kernel status file consulted by the fallback.
    #[must_use]
    pub fn with_status_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.status_path = path.into();
        self
    }

    /// Replace the library names tried by the dynamic strategy.
    #[must_use]
    pub fn with_library_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.library_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Status file consulted when the module cannot be loaded.
    pub fn status_path(&self) -> &Path {
        &self.status_path
    }

    /// Strategy this probe uses.
    pub fn strategy(&self) -> Strategy {
        Strategy::COMPILED
    }

    /// Returns `true` when the operating system enforces FIPS mode.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError`] when the status file fallback is taken and the
    /// file cannot be opened or read.
    #[cfg(feature = "nss")]
    pub fn probe(&self) -> Result<bool, ProbeError> {
        Ok(direct::system_fips_enabled())
    }

    /// Returns `true` when the operating system enforces FIPS mode.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError`] when the status file fallback is taken and the
    /// file cannot be opened or read.
    #[cfg(not(feature = "nss"))]
    pub fn probe(&self) -> Result<bool, ProbeError> {
        match dynamic::system_fips_enabled(&self.library_names) {
            Some(enabled) => Ok(enabled),
            None => status::read_status(&self.status_path),
        }
    }
}
