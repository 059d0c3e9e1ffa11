//! Sources for the system FIPS posture.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use fipsalign_probe::NativeProbe;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use super::FipsError;

/// Matches a line that is exactly `FIPS`.
static FIPS_POLICY_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?mR)^FIPS$").ok());

/// Anything that can report whether the system enforces FIPS mode.
pub trait FipsProbe {
    /// Returns `true` when the system enforces FIPS mode.
    ///
    /// # Errors
    ///
    /// Returns [`FipsError`] when the posture cannot be determined.
    fn probe(&self) -> Result<bool, FipsError>;
}

impl FipsProbe for NativeProbe {
    fn probe(&self) -> Result<bool, FipsError> {
        Ok(NativeProbe::probe(self)?)
    }
}

impl<P: FipsProbe + ?Sized> FipsProbe for &P {
    fn probe(&self) -> Result<bool, FipsError> {
        (**self).probe()
    }
}

impl<P: FipsProbe + ?Sized> FipsProbe for Box<P> {
    fn probe(&self) -> Result<bool, FipsError> {
        (**self).probe()
    }
}

/// Reads the crypto-policies state file; a line equal to `FIPS` means enabled.
#[derive(Debug, Clone)]
pub struct PolicyFileProbe {
    path: PathBuf,
}

impl PolicyFileProbe {
    /// Default crypto-policies state file.
    pub const DEFAULT_PATH: &'static str = "/etc/crypto-policies/config";

    /// Probe the given state file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// State file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for PolicyFileProbe {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PATH)
    }
}

impl FipsProbe for PolicyFileProbe {
    fn probe(&self) -> Result<bool, FipsError> {
        let contents =
            std::fs::read_to_string(&self.path).map_err(|source| FipsError::PolicyRead {
                path: self.path.clone(),
                source,
            })?;
        debug!(path = %self.path.display(), policy = %contents.trim(), "crypto-policies state");

        Ok(FIPS_POLICY_LINE
            .as_ref()
            .is_some_and(|line| line.is_match(&contents)))
    }
}

/// Which probe the binary consults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeSource {
    /// The native NSS / kernel status probe.
    #[default]
    Native,
    /// The crypto-policies state file.
    PolicyFile,
}

impl std::str::FromStr for ProbeSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" => Ok(Self::Native),
            "policy-file" | "policy_file" => Ok(Self::PolicyFile),
            other => Err(format!("unknown probe source: {other}")),
        }
    }
}
