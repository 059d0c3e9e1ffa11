//! System FIPS alignment.
//!
//! At startup [`FipsConfigurator`] consults a [`FipsProbe`] once, rewrites
//! the [`SecurityConfig`] snapshot when the system runs in FIPS mode, and
//! hands back an immutable [`FipsState`] that later cryptographic setup
//! receives by value.

mod configurator;
mod probe;

use serde::Serialize;
use thiserror::Error;

use crate::properties::Properties;

pub use configurator::{Configured, FipsConfigurator};
pub use probe::{FipsProbe, PolicyFileProbe, ProbeSource};

/// Global opt-out switch; FIPS alignment is attempted unless this is not `true`.
pub const FIPS_SWITCH_PROPERTY: &str = "com.redhat.fips";

/// Overridable switch for importing plain private/secret keys in FIPS mode.
pub const PLAIN_KEY_SUPPORT_PROPERTY: &str = "com.redhat.fips.plainKeySupport";

/// Prefix shared by every installed provider entry.
pub const SECURITY_PROVIDER_PREFIX: &str = "security.provider";

/// Prefix of the ordered FIPS provider list (`fips.provider.1`, `.2`, ...).
pub const FIPS_PROVIDER_PREFIX: &str = "fips.provider.";

/// Keystore type to use while in FIPS mode.
pub const FIPS_KEYSTORE_TYPE_PROPERTY: &str = "fips.keystore.type";

/// Default keystore type.
pub const KEYSTORE_TYPE_PROPERTY: &str = "keystore.type";

/// Key store location override.
pub const SSL_KEYSTORE_PROPERTY: &str = "javax.net.ssl.keyStore";

/// Trust store type override.
pub const SSL_TRUSTSTORE_TYPE_PROPERTY: &str = "javax.net.ssl.trustStoreType";

/// Key store location sentinel meaning "no file-backed key store".
pub const KEYSTORE_NONE: &str = "NONE";

/// Keystore type that requires [`KEYSTORE_NONE`].
pub const PKCS11_KEYSTORE_TYPE: &str = "PKCS11";

/// Errors that abort FIPS alignment.
///
/// These are fatal: startup must not continue with an unknown posture.
#[derive(Debug, Error)]
pub enum FipsError {
    /// The native probe could not determine the posture.
    #[error("native FIPS probe failed: {0}")]
    Probe(#[from] fipsalign_probe::ProbeError),

    /// The crypto-policies state file could not be read.
    #[error("failed to read crypto-policies state {}: {source}", path.display())]
    PolicyRead {
        /// State file path.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Security properties plus process-level system properties.
///
/// `security` is the provider/keystore configuration being rewritten;
/// `system` holds process overrides such as `javax.net.ssl.*` and the
/// FIPS switches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SecurityConfig {
    /// Security properties.
    pub security: Properties,
    /// System property overrides.
    pub system: Properties,
}

impl SecurityConfig {
    /// Build from existing security and system property sets.
    pub fn new(security: Properties, system: Properties) -> Self {
        Self { security, system }
    }

    /// Security property value, overridden by a system property of the same name.
    pub fn overridable(&self, key: &str) -> Option<&str> {
        self.system.get(key).or_else(|| self.security.get(key))
    }
}

/// FIPS posture published once at startup.
///
/// There are no setters; a value can only be produced by
/// [`FipsConfigurator::configure`] or the constructors below and is then
/// passed around by copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FipsState {
    enabled: bool,
    plain_key_support_enabled: bool,
}

impl FipsState {
    /// Posture when FIPS alignment is off.
    pub const DISABLED: Self = Self {
        enabled: false,
        plain_key_support_enabled: false,
    };

    /// Posture when the system enforces FIPS mode.
    pub const fn enforced(plain_key_support_enabled: bool) -> Self {
        Self {
            enabled: true,
            plain_key_support_enabled,
        }
    }

    /// Whether the system runs in FIPS mode.
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// Whether plain private/secret keys may be imported while in FIPS mode.
    pub const fn plain_key_support_enabled(&self) -> bool {
        self.plain_key_support_enabled
    }
}

/// Boolean property parse: only a case-insensitive `true` is true.
pub(crate) fn parse_switch(value: Option<&str>, default: bool) -> bool {
    value.map_or(default, |v| v.eq_ignore_ascii_case("true"))
}
