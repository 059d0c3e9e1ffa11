//! Import of plain private and secret keys into a FIPS token.
//!
//! A token in FIPS mode refuses plaintext key objects. [`KeyImporter`]
//! instead encodes the key, encrypts it under an AES key generated on the
//! token itself and asks the token to unwrap the result, so the token
//! only ever receives ciphertext.
//!
//! The importer key is created once per importer. If that attempt fails,
//! every later import fails without touching the token again.

mod curves;
mod der;
mod dh;
mod importer_key;
mod material;

use std::fmt;
use std::sync::OnceLock;

use thiserror::Error;
use tracing::debug;

use crate::token::{
    AttributeSet, AttributeType, KeyClass, KeyType, ObjectHandle, SessionHandle,
    TemplateOperation, Token, TokenError,
};
use curves::EcParameterProvider;
use dh::DhKeyFactory;
use importer_key::{ImporterKey, ImporterKeySlot, KeyLease};
use material::{KeyMaterial, SENSITIVE_COMPONENTS};

/// Internal cause of an import failure. Never exposed to callers.
#[derive(Debug, Error)]
pub(crate) enum ImportFailure {
    #[error("importer key is unavailable")]
    ImporterKeyUnavailable,

    #[error("unsupported object class {0:?}")]
    UnsupportedClass(Option<u64>),

    #[error("unrecognized private key type {0:?}")]
    UnrecognizedPrivateKeyType(Option<u64>),

    #[error("missing attribute {0:?}")]
    MissingAttribute(AttributeType),

    #[error("EC parameters do not name a known curve")]
    UnknownCurve,

    #[error("private scalar does not fit {curve}")]
    ScalarOutOfRange { curve: &'static str },

    #[error("plain key bytes could not be obtained")]
    EmptyKeyMaterial,

    #[error("encryption under the importer key failed: {0}")]
    Encrypt(#[source] TokenError),

    #[error("unwrap failed: {0}")]
    Unwrap(#[source] TokenError),
}

/// Opaque key import failure, reported as `CKR_GENERAL_ERROR`.
///
/// Which stage failed is deliberately not observable through this type.
pub struct ImportError {
    #[cfg_attr(not(test), allow(dead_code))]
    cause: ImportFailure,
}

impl ImportError {
    fn new(cause: ImportFailure) -> Self {
        debug!(cause = %cause, "key import failed");
        Self { cause }
    }

    #[cfg(test)]
    pub(crate) fn cause(&self) -> &ImportFailure {
        &self.cause
    }
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CKR_GENERAL_ERROR")
    }
}

impl fmt::Debug for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ImportError(CKR_GENERAL_ERROR)")
    }
}

impl std::error::Error for ImportError {}

/// Whether the importer key exists yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImporterKeyState {
    /// No import has been attempted.
    NotAttempted,
    /// Generated and usable.
    Ready,
    /// Generation failed; imports fail permanently.
    Failed,
}

/// Imports plain keys through a token-generated wrapping key.
///
/// Safe to share across threads. The importer key, the EC parameter
/// provider and the DH key factory are each built at most once.
pub struct KeyImporter<T> {
    token: T,
    importer_key: OnceLock<ImporterKeySlot>,
    ec_parameters: OnceLock<EcParameterProvider>,
    dh_factory: OnceLock<DhKeyFactory>,
}

impl<T: Token> KeyImporter<T> {
    /// Importer for keys destined to `token`.
    pub fn new(token: T) -> Self {
        Self {
            token,
            importer_key: OnceLock::new(),
            ec_parameters: OnceLock::new(),
            dh_factory: OnceLock::new(),
        }
    }

    /// The underlying token.
    pub fn token(&self) -> &T {
        &self.token
    }

    /// Importer key status.
    pub fn importer_key_state(&self) -> ImporterKeyState {
        match self.importer_key.get() {
            None => ImporterKeyState::NotAttempted,
            Some(ImporterKeySlot::Ready(_)) => ImporterKeyState::Ready,
            Some(ImporterKeySlot::Failed { .. }) => ImporterKeyState::Failed,
        }
    }

    /// Imports currently holding the importer key.
    pub fn active_importer_leases(&self) -> usize {
        match self.importer_key.get() {
            Some(ImporterKeySlot::Ready(key)) => key.active_leases(),
            _ => 0,
        }
    }

    /// Import the private or secret key described by `attrs` in `session`.
    ///
    /// Each call creates a new token object, even for identical input.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError`] on any failure, including an unavailable
    /// importer key.
    pub fn import_key(
        &self,
        session: SessionHandle,
        attrs: &AttributeSet,
    ) -> Result<ObjectHandle, ImportError> {
        debug!("private or secret key will be imported in system FIPS mode");

        let key = match self
            .importer_key
            .get_or_init(|| ImporterKey::create(&self.token))
        {
            ImporterKeySlot::Ready(key) => key,
            ImporterKeySlot::Failed { mechanism } => {
                debug!(?mechanism, "importer key creation was attempted and failed");
                return Err(ImportError::new(ImportFailure::ImporterKeyUnavailable));
            }
        };

        let lease = key.lease();
        self.import_with(&lease, session, attrs)
            .map_err(ImportError::new)
    }

    fn import_with(
        &self,
        lease: &KeyLease<'_>,
        session: SessionHandle,
        attrs: &AttributeSet,
    ) -> Result<ObjectHandle, ImportFailure> {
        let class_code = attrs.ulong(AttributeType::Class);
        let type_code = attrs.ulong(AttributeType::KeyType);
        let class = class_code.and_then(KeyClass::from_code);
        let key_type = type_code.and_then(KeyType::from_code);

        let mut template = attrs.clone();
        let material = match (class, key_type) {
            (Some(KeyClass::PrivateKey), Some(KeyType::Rsa)) => {
                debug!("importing an RSA private key");
                KeyMaterial::rsa(attrs)
            }
            (Some(KeyClass::PrivateKey), Some(KeyType::Dsa)) => {
                debug!("importing a DSA private key");
                self.add_netscape_db(&mut template);
                KeyMaterial::dsa(attrs)
            }
            (Some(KeyClass::PrivateKey), Some(KeyType::Ec)) => {
                debug!("importing an EC private key");
                let provider = self.ec_parameters.get_or_init(EcParameterProvider::system);
                let curve = attrs
                    .bytes(AttributeType::EcParams)
                    .and_then(|params| provider.named_curve(params))
                    .ok_or(ImportFailure::UnknownCurve)?;
                self.add_netscape_db(&mut template);
                KeyMaterial::ec(attrs, curve)
            }
            (Some(KeyClass::PrivateKey), Some(KeyType::Dh)) => {
                debug!("importing a Diffie-Hellman private key");
                let factory = self.dh_factory.get_or_init(DhKeyFactory::new);
                self.add_netscape_db(&mut template);
                KeyMaterial::dh(attrs, factory)
            }
            (Some(KeyClass::PrivateKey), _) => {
                return Err(ImportFailure::UnrecognizedPrivateKeyType(type_code));
            }
            (Some(KeyClass::SecretKey), _) => {
                debug!("importing a secret key");
                KeyMaterial::secret(attrs)?
            }
            _ => return Err(ImportFailure::UnsupportedClass(class_code)),
        };

        let plaintext = material.encode()?;
        if plaintext.is_empty() {
            return Err(ImportFailure::EmptyKeyMaterial);
        }
        let wrapped = lease.encrypt(&plaintext).map_err(ImportFailure::Encrypt)?;
        drop(plaintext);

        for ty in SENSITIVE_COMPONENTS {
            template.remove(*ty);
        }
        let template = self.token.template_attributes(
            TemplateOperation::Import,
            class.ok_or(ImportFailure::UnsupportedClass(class_code))?,
            key_type.unwrap_or(KeyType::GenericSecret),
            template,
        );

        let handle = self
            .token
            .unwrap_key(session, lease.mechanism(), lease.handle(), &wrapped, &template)
            .map_err(ImportFailure::Unwrap)?;
        debug!(key = %handle, "imported key");
        Ok(handle)
    }

    fn add_netscape_db(&self, template: &mut AttributeSet) {
        if self.token.config().nss_netscape_db_workaround
            && !template.contains(AttributeType::NetscapeDb)
        {
            template.insert(AttributeType::NetscapeDb, vec![0_u8]);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for KeyImporter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyImporter")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}
