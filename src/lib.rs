//! fipsalign: aligns a process's security configuration with the system
//! FIPS posture.
//!
//! At startup the system is probed once. In FIPS mode the provider list
//! and keystore settings are rewritten from the crypto-policies back-end,
//! and plain private or secret keys are imported onto the token through a
//! wrap/unwrap channel instead of being created in the clear.
//!
//! See `DESIGN.md` for the architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod fips;
pub mod import;
pub mod logging;
pub mod pin;
pub mod properties;
pub mod provider;
pub mod token;
