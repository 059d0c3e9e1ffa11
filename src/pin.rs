//! Token PIN resolution from the `fips.nssdb.pin` property.
//!
//! The property takes the form `SCHEME:value`:
//! - `env:NAME` reads the environment variable `NAME`
//! - `file:/path` reads the first line of a file (first 4096 bytes only)
//! - `pin:literal` uses the value verbatim
//!
//! Schemes are case-insensitive. An absent or empty property yields an
//! empty PIN.

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::fips::SecurityConfig;

/// Property holding the token PIN specification.
pub const PIN_PROPERTY: &str = "fips.nssdb.pin";

/// At most this many bytes of a PIN file are read.
pub const PIN_FILE_READ_LIMIT: u64 = 4096;

/// Errors raised while resolving a PIN.
#[derive(Debug, Error)]
pub enum PinError {
    /// The property has no `:` separating scheme and value.
    #[error("invalid fips.nssdb.pin property value")]
    MissingSeparator,

    /// The scheme is not one of `env`, `file`, `pin`.
    #[error("unsupported prefix for fips.nssdb.pin: {scheme}")]
    UnsupportedScheme {
        /// Scheme as written.
        scheme: String,
    },

    /// The PIN file could not be read.
    #[error("error reading fips.nssdb.pin from the '{}' file: {source}", path.display())]
    File {
        /// PIN file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The login handler was asked for something other than a PIN.
    #[error("unsupported credential request: {0}")]
    UnsupportedRequest(&'static str),
}

/// Where a PIN comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinScheme {
    /// Environment variable.
    Env,
    /// First line of a file.
    File,
    /// Literal value.
    Literal,
}

/// Parsed `SCHEME:value` specification.
#[derive(Clone, PartialEq, Eq)]
pub struct PinSpec {
    /// Source scheme.
    pub scheme: PinScheme,
    /// Variable name, path or literal PIN.
    pub value: String,
}

impl fmt::Debug for PinSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value: &dyn fmt::Debug = match self.scheme {
            PinScheme::Literal => &"[REDACTED]",
            PinScheme::Env | PinScheme::File => &self.value,
        };
        f.debug_struct("PinSpec")
            .field("scheme", &self.scheme)
            .field("value", value)
            .finish()
    }
}

impl PinSpec {
    /// Parse a `SCHEME:value` property value.
    ///
    /// # Errors
    ///
    /// Returns [`PinError::MissingSeparator`] without a `:` and
    /// [`PinError::UnsupportedScheme`] for an unknown scheme.
    pub fn parse(property: &str) -> Result<Self, PinError> {
        let (scheme, value) = property.split_once(':').ok_or(PinError::MissingSeparator)?;
        let scheme = match scheme.to_ascii_uppercase().as_str() {
            "ENV" => PinScheme::Env,
            "FILE" => PinScheme::File,
            "PIN" => PinScheme::Literal,
            _ => {
                return Err(PinError::UnsupportedScheme {
                    scheme: scheme.to_owned(),
                })
            }
        };
        Ok(Self {
            scheme,
            value: value.to_owned(),
        })
    }
}

/// A token PIN in the wide form expected by the token login call.
///
/// Each UTF-8 byte of the credential occupies one 16-bit unit, zero-extended.
/// The login path keeps only the low byte of every unit, so widening
/// byte-by-byte is what lets a non-ASCII PIN reach the token intact.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct TokenPin(Vec<u16>);

impl TokenPin {
    /// Widen a UTF-8 credential one byte per unit.
    pub fn from_utf8(pin: &str) -> Self {
        Self(pin.bytes().map(u16::from).collect())
    }

    /// Wide units.
    pub fn units(&self) -> &[u16] {
        &self.0
    }

    /// Low byte of every unit, i.e. the original UTF-8 bytes.
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.0.iter().map(|unit| unit.to_le_bytes()[0]).collect())
    }

    /// Number of units.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` for the empty PIN.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for TokenPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenPin([REDACTED; {}])", self.0.len())
    }
}

/// Resolves token PINs, looking environment variables up through a resolver.
pub struct PinSource<E = fn(&str) -> Option<String>> {
    env: E,
}

impl PinSource {
    /// Resolve `env:` specifications against the process environment.
    pub fn from_env() -> Self {
        Self { env: lossy_env }
    }
}

/// Environment variable value, with invalid UTF-8 replaced by U+FFFD.
fn lossy_env(key: &str) -> Option<String> {
    std::env::var_os(key).map(|value| value.to_string_lossy().into_owned())
}

impl<E> PinSource<E>
where
    E: Fn(&str) -> Option<String>,
{
    /// Resolve `env:` specifications with a custom resolver.
    pub fn with_resolver(env: E) -> Self {
        Self { env }
    }

    /// Resolve a PIN property value.
    ///
    /// # Errors
    ///
    /// Returns [`PinError`] for a malformed specification or an unreadable
    /// PIN file.
    pub fn resolve(&self, property: Option<&str>) -> Result<TokenPin, PinError> {
        debug!("reading token PIN");
        let Some(property) = property.filter(|p| !p.is_empty()) else {
            debug!("empty token PIN");
            return Ok(TokenPin::default());
        };

        let spec = PinSpec::parse(property)?;
        let pin: Option<Zeroizing<String>> = match spec.scheme {
            PinScheme::Env => {
                debug!(variable = %spec.value, "token PIN from environment variable");
                (self.env)(spec.value.as_str()).map(Zeroizing::new)
            }
            PinScheme::File => {
                debug!(path = %spec.value, "token PIN from file");
                Some(read_pin_file(Path::new(&spec.value))?)
            }
            PinScheme::Literal => {
                debug!("token PIN from the {PIN_PROPERTY} property");
                Some(Zeroizing::new(spec.value.clone()))
            }
        };

        match pin {
            Some(pin) if !pin.is_empty() => {
                debug!("non-empty token PIN");
                Ok(TokenPin::from_utf8(&pin))
            }
            _ => {
                debug!("empty token PIN");
                Ok(TokenPin::default())
            }
        }
    }

    /// Resolve the PIN named by [`PIN_PROPERTY`] in `config`.
    ///
    /// # Errors
    ///
    /// See [`resolve`](Self::resolve).
    pub fn resolve_from(&self, config: &SecurityConfig) -> Result<TokenPin, PinError> {
        self.resolve(config.overridable(PIN_PROPERTY))
    }
}

/// First line of the first [`PIN_FILE_READ_LIMIT`] bytes of `path`.
fn read_pin_file(path: &Path) -> Result<Zeroizing<String>, PinError> {
    let file = std::fs::File::open(path).map_err(|source| PinError::File {
        path: path.to_path_buf(),
        source,
    })?;

    // Sized up front so the plaintext is never left behind by a reallocation.
    let capacity = usize::try_from(PIN_FILE_READ_LIMIT).unwrap_or(usize::MAX);
    let mut buf = Zeroizing::new(Vec::with_capacity(capacity));
    file.take(PIN_FILE_READ_LIMIT)
        .read_to_end(&mut buf)
        .map_err(|source| PinError::File {
            path: path.to_path_buf(),
            source,
        })?;

    // Malformed sequences (including one cut at the read limit) decode to U+FFFD.
    let text = Zeroizing::new(String::from_utf8_lossy(&buf).into_owned());
    let line = text.split(['\n', '\r']).next().unwrap_or_default();
    Ok(Zeroizing::new(line.to_owned()))
}

/// A credential the token login flow asks for.
#[derive(Debug)]
pub enum CredentialRequest {
    /// Token PIN; filled in by the handler.
    Pin(Option<TokenPin>),
    /// A user name prompt.
    Name {
        /// Prompt text.
        prompt: String,
    },
    /// Free-form text prompt.
    Text {
        /// Prompt text.
        prompt: String,
    },
}

impl CredentialRequest {
    fn kind(&self) -> &'static str {
        match self {
            Self::Pin(_) => "pin",
            Self::Name { .. } => "name",
            Self::Text { .. } => "text",
        }
    }
}

/// Answers token login requests with the PIN configured for FIPS mode.
pub struct TokenLoginHandler<'a, E = fn(&str) -> Option<String>> {
    source: PinSource<E>,
    config: &'a SecurityConfig,
}

impl<'a, E> TokenLoginHandler<'a, E>
where
    E: Fn(&str) -> Option<String>,
{
    /// Build a handler reading [`PIN_PROPERTY`] from `config`.
    pub fn new(source: PinSource<E>, config: &'a SecurityConfig) -> Self {
        Self { source, config }
    }

    /// Fill the first request, which must be [`CredentialRequest::Pin`].
    ///
    /// # Errors
    ///
    /// Returns [`PinError::UnsupportedRequest`] when the first request is not
    /// a PIN request (or there is none), and resolution errors otherwise.
    pub fn handle(&self, requests: &mut [CredentialRequest]) -> Result<(), PinError> {
        match requests.first_mut() {
            Some(CredentialRequest::Pin(slot)) => {
                *slot = Some(self.source.resolve_from(self.config)?);
                Ok(())
            }
            Some(other) => Err(PinError::UnsupportedRequest(other.kind())),
            None => Err(PinError::UnsupportedRequest("none")),
        }
    }
}
