//! One-shot rewrite of the security configuration for FIPS mode.

use std::path::{Path, PathBuf};

use tracing::{debug, info, trace, warn};

use super::{
    parse_switch, FipsError, FipsProbe, FipsState, SecurityConfig, FIPS_KEYSTORE_TYPE_PROPERTY,
    FIPS_PROVIDER_PREFIX, FIPS_SWITCH_PROPERTY, KEYSTORE_NONE, KEYSTORE_TYPE_PROPERTY,
    PKCS11_KEYSTORE_TYPE, PLAIN_KEY_SUPPORT_PROPERTY, SECURITY_PROVIDER_PREFIX,
    SSL_KEYSTORE_PROPERTY, SSL_TRUSTSTORE_TYPE_PROPERTY,
};

/// Outcome of [`FipsConfigurator::configure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Configured {
    /// Whether an effective configuration was applied: the base file loaded,
    /// or FIPS rewriting happened.
    pub loaded: bool,
    /// Published posture.
    pub state: FipsState,
}

/// Aligns a [`SecurityConfig`] with the system FIPS posture.
///
/// `configure` consumes the configurator, so a process performs the
/// transition exactly once.
#[derive(Debug)]
pub struct FipsConfigurator<P> {
    probe: P,
    base_file: PathBuf,
}

impl<P: FipsProbe> FipsConfigurator<P> {
    /// Create a configurator that loads `base_file` and consults `probe`.
    pub fn new(probe: P, base_file: impl Into<PathBuf>) -> Self {
        Self {
            probe,
            base_file: base_file.into(),
        }
    }

    /// Load the base properties, probe the system and rewrite `config`.
    ///
    /// A missing or unreadable base file is logged and skipped. When the
    /// FIPS switch is off, the probe is never consulted.
    ///
    /// # Errors
    ///
    /// Returns [`FipsError`] when the probe fails. `config` may already hold
    /// the base file entries at that point; the caller must abort startup.
    pub fn configure(self, config: &mut SecurityConfig) -> Result<Configured, FipsError> {
        let loaded = load_base_file(&self.base_file, config);

        if !parse_switch(config.system.get(FIPS_SWITCH_PROPERTY), true) {
            info!(
                switch = FIPS_SWITCH_PROPERTY,
                "FIPS alignment disabled by property"
            );
            return Ok(Configured {
                loaded,
                state: FipsState::DISABLED,
            });
        }

        if !self.probe.probe()? {
            debug!("system is not in FIPS mode");
            return Ok(Configured {
                loaded,
                state: FipsState::DISABLED,
            });
        }

        info!("FIPS mode detected");
        replace_providers(config);
        apply_keystore_type(config);

        let plain_key_support = parse_switch(config.system.get(PLAIN_KEY_SUPPORT_PROPERTY), true);
        debug!(plain_key_support, "publishing FIPS state");

        Ok(Configured {
            loaded: true,
            state: FipsState::enforced(plain_key_support),
        })
    }
}

fn load_base_file(path: &Path, config: &mut SecurityConfig) -> bool {
    match config.security.load(path) {
        Ok(count) => {
            debug!(path = %path.display(), entries = count, "loaded system security properties");
            for (key, value) in config.security.iter() {
                trace!(key, value, "security property");
            }
            true
        }
        Err(e) => {
            warn!(error = %e, "unable to load system security properties");
            false
        }
    }
}

fn replace_providers(config: &mut SecurityConfig) {
    config.security.retain(|key, value| {
        let installed = key.starts_with(SECURITY_PROVIDER_PREFIX);
        if installed {
            debug!(key, value, "removing provider");
        }
        !installed
    });

    for n in 1_usize.. {
        let Some(value) = config
            .security
            .get(&format!("{FIPS_PROVIDER_PREFIX}{n}"))
            .map(str::to_owned)
        else {
            break;
        };
        let key = format!("{SECURITY_PROVIDER_PREFIX}.{n}");
        debug!(position = n, key = %key, value = %value, "adding FIPS provider");
        config.security.insert(key, value);
    }
}

fn apply_keystore_type(config: &mut SecurityConfig) {
    let Some(fips_type) = config
        .security
        .get(FIPS_KEYSTORE_TYPE_PROPERTY)
        .map(str::to_owned)
    else {
        return;
    };

    let previous = config
        .security
        .insert(KEYSTORE_TYPE_PROPERTY, fips_type.clone());

    if fips_type == PKCS11_KEYSTORE_TYPE {
        config.system.insert(SSL_KEYSTORE_PROPERTY, KEYSTORE_NONE);
    }

    if !config.system.contains_key(SSL_TRUSTSTORE_TYPE_PROPERTY) {
        match previous {
            Some(previous) => {
                config.system.insert(SSL_TRUSTSTORE_TYPE_PROPERTY, previous);
            }
            None => warn!(
                "no keystore.type before FIPS alignment; trust store type left unset"
            ),
        }
    }

    debug!(
        keystore_type = %fips_type,
        ssl_keystore = config.system.get(SSL_KEYSTORE_PROPERTY).unwrap_or(""),
        ssl_truststore_type = config.system.get(SSL_TRUSTSTORE_TYPE_PROPERTY).unwrap_or(""),
        "FIPS keystore settings"
    );
}
