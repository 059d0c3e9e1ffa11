//! Token capability: key storage and cryptographic operations behind a
//! PKCS#11-shaped interface.
//!
//! [`Token`] is the seam between key import and whatever actually holds
//! the keys. [`SoftToken`] is the in-process implementation used by the
//! binary and the tests.

mod attributes;
mod soft;

use std::fmt;

use thiserror::Error;

pub use attributes::{AttributeSet, AttributeType, AttributeValue, KeyClass, KeyType};
pub use soft::SoftToken;

/// Handle of an open token session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionHandle(pub u64);

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// Handle of a token-resident object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectHandle(pub u64);

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

/// AES block size, and so the CBC IV length.
pub const AES_BLOCK_LEN: usize = 16;

/// Token mechanisms used here.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    /// `CKM_AES_KEY_GEN`
    AesKeyGen,
    /// `CKM_AES_CBC_PAD`: AES-CBC with PKCS#7 padding.
    AesCbcPad {
        /// Initialization vector.
        iv: [u8; AES_BLOCK_LEN],
    },
}

impl fmt::Debug for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AesKeyGen => f.write_str("CKM_AES_KEY_GEN"),
            Self::AesCbcPad { .. } => f.write_str("CKM_AES_CBC_PAD"),
        }
    }
}

/// Operation class used to select template attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateOperation {
    /// Key generation.
    Generate,
    /// Key import through unwrap.
    Import,
    /// Direct object creation.
    Create,
}

/// Default attributes for objects matching an (operation, class, key type)
/// triple; `None` matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateRule {
    /// Operation to match.
    pub operation: Option<TemplateOperation>,
    /// Object class to match.
    pub class: Option<KeyClass>,
    /// Key type to match.
    pub key_type: Option<KeyType>,
    /// Attributes added when absent from the caller's template.
    pub attributes: AttributeSet,
}

impl TemplateRule {
    fn matches(&self, op: TemplateOperation, class: KeyClass, key_type: KeyType) -> bool {
        self.operation.is_none_or(|o| o == op)
            && self.class.is_none_or(|c| c == class)
            && self.key_type.is_none_or(|t| t == key_type)
    }
}

/// Token configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenConfig {
    /// Add an empty `CKA_NETSCAPE_DB` to imported DSA, EC and DH private
    /// keys that lack one.
    pub nss_netscape_db_workaround: bool,
    /// Template rules, applied in order; the first rule to supply an
    /// attribute wins.
    pub templates: Vec<TemplateRule>,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            nss_netscape_db_workaround: true,
            templates: Vec::new(),
        }
    }
}

impl TokenConfig {
    /// Complete `attrs` with every matching template rule.
    pub fn complete(
        &self,
        op: TemplateOperation,
        class: KeyClass,
        key_type: KeyType,
        mut attrs: AttributeSet,
    ) -> AttributeSet {
        for rule in self.templates.iter().filter(|r| r.matches(op, class, key_type)) {
            attrs.fill_defaults(&rule.attributes);
        }
        attrs
    }
}

/// Token failures, named after their PKCS#11 return values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Unknown or released session.
    #[error("CKR_SESSION_HANDLE_INVALID: {0}")]
    SessionHandleInvalid(SessionHandle),

    /// Unknown object.
    #[error("CKR_OBJECT_HANDLE_INVALID: {0}")]
    ObjectHandleInvalid(ObjectHandle),

    /// The mechanism does not apply to the operation.
    #[error("CKR_MECHANISM_INVALID: {0:?}")]
    MechanismInvalid(Mechanism),

    /// The key may not be used for the operation.
    #[error("CKR_KEY_FUNCTION_NOT_PERMITTED: {0}")]
    KeyFunctionNotPermitted(ObjectHandle),

    /// The template lacks a required attribute.
    #[error("CKR_TEMPLATE_INCOMPLETE: missing {0:?}")]
    TemplateIncomplete(AttributeType),

    /// An attribute value is not acceptable.
    #[error("CKR_ATTRIBUTE_VALUE_INVALID: {0:?}")]
    AttributeValueInvalid(AttributeType),

    /// Wrapped key bytes failed to decrypt or are malformed.
    #[error("CKR_WRAPPED_KEY_INVALID")]
    WrappedKeyInvalid,

    /// Device failure.
    #[error("CKR_DEVICE_ERROR: {0}")]
    Device(String),
}

/// Host-side cipher handle bound to a token key.
///
/// The key itself stays on the token; only plaintext and ciphertext cross
/// this interface.
pub trait KeyEncryptor: Send + Sync {
    /// Encrypt `plaintext` under the bound key.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] when the key is gone or may not encrypt.
    fn encrypt(&self, iv: &[u8; AES_BLOCK_LEN], plaintext: &[u8]) -> Result<Vec<u8>, TokenError>;
}

/// Key storage and cryptographic operations.
pub trait Token: Send + Sync {
    /// Token configuration.
    fn config(&self) -> &TokenConfig;

    /// Borrow a session for object management.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] when no session can be opened.
    fn open_object_session(&self) -> Result<SessionHandle, TokenError>;

    /// Return a session obtained from [`Token::open_object_session`].
    fn release_session(&self, session: SessionHandle);

    /// Complete `attrs` with the configured template for the operation.
    fn template_attributes(
        &self,
        op: TemplateOperation,
        class: KeyClass,
        key_type: KeyType,
        attrs: AttributeSet,
    ) -> AttributeSet {
        self.config().complete(op, class, key_type, attrs)
    }

    /// Generate a key on the token.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] on an invalid session, mechanism or template.
    fn generate_key(
        &self,
        session: SessionHandle,
        mechanism: &Mechanism,
        template: &AttributeSet,
    ) -> Result<ObjectHandle, TokenError>;

    /// Host-side cipher for `key` under `mechanism`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] when the key or mechanism is unusable.
    fn encryptor(
        &self,
        key: ObjectHandle,
        mechanism: &Mechanism,
    ) -> Result<Box<dyn KeyEncryptor>, TokenError>;

    /// Decrypt `wrapped` with `unwrapping_key` and store the result as a new
    /// object described by `template`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] on an invalid session, key, ciphertext or
    /// template.
    fn unwrap_key(
        &self,
        session: SessionHandle,
        mechanism: &Mechanism,
        unwrapping_key: ObjectHandle,
        wrapped: &[u8],
        template: &AttributeSet,
    ) -> Result<ObjectHandle, TokenError>;

    /// Create an object directly from `template`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] on an invalid session or template.
    fn create_object(
        &self,
        session: SessionHandle,
        template: &AttributeSet,
    ) -> Result<ObjectHandle, TokenError>;
}

impl<T: Token + ?Sized> Token for std::sync::Arc<T> {
    fn config(&self) -> &TokenConfig {
        (**self).config()
    }

    fn open_object_session(&self) -> Result<SessionHandle, TokenError> {
        (**self).open_object_session()
    }

    fn release_session(&self, session: SessionHandle) {
        (**self).release_session(session);
    }

    fn template_attributes(
        &self,
        op: TemplateOperation,
        class: KeyClass,
        key_type: KeyType,
        attrs: AttributeSet,
    ) -> AttributeSet {
        (**self).template_attributes(op, class, key_type, attrs)
    }

    fn generate_key(
        &self,
        session: SessionHandle,
        mechanism: &Mechanism,
        template: &AttributeSet,
    ) -> Result<ObjectHandle, TokenError> {
        (**self).generate_key(session, mechanism, template)
    }

    fn encryptor(
        &self,
        key: ObjectHandle,
        mechanism: &Mechanism,
    ) -> Result<Box<dyn KeyEncryptor>, TokenError> {
        (**self).encryptor(key, mechanism)
    }

    fn unwrap_key(
        &self,
        session: SessionHandle,
        mechanism: &Mechanism,
        unwrapping_key: ObjectHandle,
        wrapped: &[u8],
        template: &AttributeSet,
    ) -> Result<ObjectHandle, TokenError> {
        (**self).unwrap_key(session, mechanism, unwrapping_key, wrapped, template)
    }

    fn create_object(
        &self,
        session: SessionHandle,
        template: &AttributeSet,
    ) -> Result<ObjectHandle, TokenError> {
        (**self).create_object(session, template)
    }
}
