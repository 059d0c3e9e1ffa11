//! Key object creation that honours the published FIPS posture.

use thiserror::Error;
use tracing::debug;

use crate::fips::FipsState;
use crate::import::{ImportError, KeyImporter};
use crate::token::{
    AttributeSet, KeyClass, KeyType, ObjectHandle, SessionHandle, TemplateOperation, Token,
    TokenError,
};

/// Why a key object could not be created.
#[derive(Debug, Error)]
pub enum KeyCreationError {
    /// FIPS mode is on and plain key import is switched off.
    #[error("plain private and secret keys are not accepted in FIPS mode (com.redhat.fips.plainKeySupport=false)")]
    PlainKeysDisabled,

    /// The import pipeline failed.
    #[error(transparent)]
    Import(#[from] ImportError),

    /// Direct object creation failed.
    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Creates key objects on a token, importing plain private and secret keys
/// through [`KeyImporter`] when the system runs in FIPS mode.
#[derive(Debug)]
pub struct PlainKeyImport<T> {
    state: FipsState,
    importer: KeyImporter<T>,
}

impl<T: Token> PlainKeyImport<T> {
    /// Gate for `token` under the posture `state`.
    pub fn new(state: FipsState, token: T) -> Self {
        Self {
            state,
            importer: KeyImporter::new(token),
        }
    }

    /// Posture this gate was built with.
    pub fn state(&self) -> FipsState {
        self.state
    }

    /// The importer used for plain keys.
    pub fn importer(&self) -> &KeyImporter<T> {
        &self.importer
    }

    /// Create the key object described by `attrs`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyCreationError`] when the key is refused or the token
    /// fails.
    pub fn create_key(
        &self,
        session: SessionHandle,
        attrs: &AttributeSet,
    ) -> Result<ObjectHandle, KeyCreationError> {
        let plain = matches!(
            attrs.class(),
            Some(KeyClass::PrivateKey | KeyClass::SecretKey)
        );

        if plain && self.state.enabled() {
            if !self.state.plain_key_support_enabled() {
                return Err(KeyCreationError::PlainKeysDisabled);
            }
            return Ok(self.importer.import_key(session, attrs)?);
        }

        let token = self.importer.token();
        let template = match attrs.class() {
            Some(class) => token.template_attributes(
                TemplateOperation::Create,
                class,
                attrs.key_type().unwrap_or(KeyType::GenericSecret),
                attrs.clone(),
            ),
            None => attrs.clone(),
        };
        debug!(plain, fips = self.state.enabled(), "creating key object directly");
        Ok(token.create_object(session, &template)?)
    }
}
