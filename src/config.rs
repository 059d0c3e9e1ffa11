//! Configuration loading.
//!
//! Loads `config.toml` from `$FIPSALIGN_CONFIG_PATH` or `~/.fipsalign/`.
//! Environment variables override file values; file values override
//! defaults. A missing file yields the defaults.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use fipsalign_probe::NativeProbe;

use crate::fips::{
    FipsProbe, PolicyFileProbe, ProbeSource, SecurityConfig, FIPS_SWITCH_PROPERTY,
    PLAIN_KEY_SUPPORT_PROPERTY,
};
use crate::properties::Properties;
use crate::token::TokenConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// System files consulted at startup (`[paths]`).
    pub paths: PathsConfig,
    /// Which FIPS probe to use (`[probe]`).
    pub probe: ProbeConfig,
    /// System property overrides, such as `com.redhat.fips` (`[system]`).
    pub system: BTreeMap<String, String>,
    /// Token options (`[token]`).
    pub token: TokenSettings,
}

/// `[paths]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Crypto-policies Java back-end loaded as the base security properties.
    pub java_config: PathBuf,
    /// Crypto-policies state file read by the policy-file probe.
    pub policy_config: PathBuf,
    /// Kernel FIPS status file read by the native probe fallback.
    pub fips_status: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            java_config: PathBuf::from("/etc/crypto-policies/back-ends/java.config"),
            policy_config: PathBuf::from(PolicyFileProbe::DEFAULT_PATH),
            fips_status: PathBuf::from(fipsalign_probe::DEFAULT_STATUS_PATH),
        }
    }
}

/// `[probe]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Probe source.
    pub source: ProbeSource,
    /// Library names tried by the dynamic native probe, in order.
    pub library_names: Option<Vec<String>>,
}

/// `[token]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TokenSettings {
    /// Add `CKA_NETSCAPE_DB` to imported DSA, EC and DH keys.
    pub nss_netscape_db_workaround: bool,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            nss_netscape_db_workaround: true,
        }
    }
}

impl Settings {
    /// Load with precedence: env vars > TOML file > defaults.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed,
    /// or when no config path can be resolved.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// [`Settings::load`] with a custom env resolver.
    ///
    /// # Errors
    ///
    /// Same as [`Settings::load`].
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let path = config_path_with(&env)?;
        let mut settings = match std::fs::read_to_string(&path) {
            Ok(contents) => {
                info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
                    .with_context(|| format!("failed to load {}", path.display()))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no config file found, using defaults");
                Self::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        settings.apply_overrides(&env);
        Ok(settings)
    }

    /// Parse a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error when the TOML is malformed.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).context("failed to parse config TOML")
    }

    /// Apply environment variable overrides.
    ///
    /// Takes a resolver function so tests never touch the process environment.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("FIPSALIGN_JAVA_CONFIG") {
            self.paths.java_config = PathBuf::from(v);
        }
        if let Some(v) = env("FIPSALIGN_POLICY_CONFIG") {
            self.paths.policy_config = PathBuf::from(v);
        }
        if let Some(v) = env("FIPSALIGN_FIPS_STATUS_PATH") {
            self.paths.fips_status = PathBuf::from(v);
        }
        if let Some(v) = env("FIPSALIGN_PROBE") {
            match v.parse() {
                Ok(source) => self.probe.source = source,
                Err(_) => warn!(
                    var = "FIPSALIGN_PROBE",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("FIPSALIGN_FIPS") {
            self.system.insert(FIPS_SWITCH_PROPERTY.to_owned(), v);
        }
        if let Some(v) = env("FIPSALIGN_PLAIN_KEY_SUPPORT") {
            self.system.insert(PLAIN_KEY_SUPPORT_PROPERTY.to_owned(), v);
        }
    }

    /// Empty security properties plus the configured system properties.
    pub fn security_config(&self) -> SecurityConfig {
        SecurityConfig::new(
            Properties::new(),
            self.system.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect(),
        )
    }

    /// The configured FIPS probe.
    pub fn fips_probe(&self) -> Box<dyn FipsProbe> {
        match self.probe.source {
            ProbeSource::Native => {
                let mut probe = NativeProbe::new().with_status_path(&self.paths.fips_status);
                if let Some(names) = &self.probe.library_names {
                    probe = probe.with_library_names(names);
                }
                Box::new(probe)
            }
            ProbeSource::PolicyFile => Box::new(PolicyFileProbe::new(&self.paths.policy_config)),
        }
    }

    /// Token configuration.
    pub fn token_config(&self) -> TokenConfig {
        TokenConfig {
            nss_netscape_db_workaround: self.token.nss_netscape_db_workaround,
            ..TokenConfig::default()
        }
    }
}

/// Resolve the default config directory (`~/.fipsalign/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".fipsalign"))
}

fn config_path_with(env: impl Fn(&str) -> Option<String>) -> Result<PathBuf> {
    if let Some(p) = env("FIPSALIGN_CONFIG_PATH") {
        return Ok(PathBuf::from(p));
    }
    Ok(config_dir()?.join("config.toml"))
}
