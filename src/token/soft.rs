//! In-process token backed by AES-CBC.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::{
    AttributeSet, AttributeType, KeyClass, KeyEncryptor, KeyType, Mechanism, ObjectHandle,
    SessionHandle, Token, TokenConfig, TokenError, AES_BLOCK_LEN,
};

/// DER `SEQUENCE` tag; every PKCS#8 private key starts with it.
const DER_SEQUENCE: u8 = 0x30;

struct SoftObject {
    attributes: AttributeSet,
    value: Zeroizing<Vec<u8>>,
}

#[derive(Default)]
struct SoftState {
    sessions: BTreeSet<SessionHandle>,
    idle: Vec<SessionHandle>,
    objects: BTreeMap<ObjectHandle, SoftObject>,
}

impl SoftState {
    fn check_session(&self, session: SessionHandle) -> Result<(), TokenError> {
        if self.sessions.contains(&session) {
            Ok(())
        } else {
            Err(TokenError::SessionHandleInvalid(session))
        }
    }

    fn key(&self, handle: ObjectHandle) -> Result<&SoftObject, TokenError> {
        self.objects
            .get(&handle)
            .ok_or(TokenError::ObjectHandleInvalid(handle))
    }
}

fn lock(state: &Mutex<SoftState>) -> MutexGuard<'_, SoftState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Software token.
///
/// Objects live in memory for the lifetime of the token. Sessions are
/// pooled: a released session becomes idle and is handed out again.
/// Call counters and a key-generation fault switch make the token usable
/// as a test double.
pub struct SoftToken {
    config: TokenConfig,
    state: Arc<Mutex<SoftState>>,
    next_handle: AtomicU64,
    generate_calls: AtomicUsize,
    unwrap_calls: AtomicUsize,
    fail_key_generation: AtomicBool,
}

impl SoftToken {
    /// Empty token with the given configuration.
    pub fn new(config: TokenConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(SoftState::default())),
            next_handle: AtomicU64::new(1),
            generate_calls: AtomicUsize::new(0),
            unwrap_calls: AtomicUsize::new(0),
            fail_key_generation: AtomicBool::new(false),
        }
    }

    /// Make every subsequent key generation fail with a device error.
    pub fn fail_key_generation(&self, fail: bool) {
        self.fail_key_generation.store(fail, Ordering::SeqCst);
    }

    /// Number of `generate_key` calls so far, failed ones included.
    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    /// Number of `unwrap_key` calls so far, failed ones included.
    pub fn unwrap_calls(&self) -> usize {
        self.unwrap_calls.load(Ordering::SeqCst)
    }

    /// Sessions currently handed out and not yet released.
    pub fn sessions_in_use(&self) -> usize {
        let state = lock(&self.state);
        state.sessions.len().saturating_sub(state.idle.len())
    }

    /// Number of stored objects.
    pub fn object_count(&self) -> usize {
        lock(&self.state).objects.len()
    }

    /// Attributes stored with an object.
    pub fn object_attributes(&self, handle: ObjectHandle) -> Option<AttributeSet> {
        lock(&self.state)
            .objects
            .get(&handle)
            .map(|o| o.attributes.clone())
    }

    /// Key material stored with an object.
    pub fn object_value(&self, handle: ObjectHandle) -> Option<Zeroizing<Vec<u8>>> {
        lock(&self.state)
            .objects
            .get(&handle)
            .map(|o| o.value.clone())
    }

    fn store(
        &self,
        state: &mut SoftState,
        attributes: AttributeSet,
        value: Zeroizing<Vec<u8>>,
    ) -> ObjectHandle {
        let handle = ObjectHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        state.objects.insert(handle, SoftObject { attributes, value });
        handle
    }
}

impl Default for SoftToken {
    fn default() -> Self {
        Self::new(TokenConfig::default())
    }
}

impl std::fmt::Debug for SoftToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftToken")
            .field("config", &self.config)
            .field("objects", &self.object_count())
            .finish_non_exhaustive()
    }
}

fn aes_key_len(template: &AttributeSet) -> Result<usize, TokenError> {
    let len = template
        .ulong(AttributeType::ValueLen)
        .ok_or(TokenError::TemplateIncomplete(AttributeType::ValueLen))?;
    match len {
        16 => Ok(16),
        24 => Ok(24),
        32 => Ok(32),
        _ => Err(TokenError::AttributeValueInvalid(AttributeType::ValueLen)),
    }
}

/// An explicit `false` forbids the operation; absence permits it.
fn permits(attributes: &AttributeSet, usage: AttributeType) -> bool {
    attributes.flag(usage) != Some(false)
}

fn cbc_encrypt(
    key: &[u8],
    iv: &[u8; AES_BLOCK_LEN],
    plaintext: &[u8],
) -> Result<Vec<u8>, TokenError> {
    let invalid = |_| TokenError::AttributeValueInvalid(AttributeType::Value);
    Ok(match key.len() {
        16 => cbc::Encryptor::<aes::Aes128>::new_from_slices(key, iv)
            .map_err(invalid)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        24 => cbc::Encryptor::<aes::Aes192>::new_from_slices(key, iv)
            .map_err(invalid)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        _ => cbc::Encryptor::<aes::Aes256>::new_from_slices(key, iv)
            .map_err(invalid)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
    })
}

fn cbc_decrypt(
    key: &[u8],
    iv: &[u8; AES_BLOCK_LEN],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, TokenError> {
    let invalid = |_| TokenError::AttributeValueInvalid(AttributeType::Value);
    let plaintext = match key.len() {
        16 => cbc::Decryptor::<aes::Aes128>::new_from_slices(key, iv)
            .map_err(invalid)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        24 => cbc::Decryptor::<aes::Aes192>::new_from_slices(key, iv)
            .map_err(invalid)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        _ => cbc::Decryptor::<aes::Aes256>::new_from_slices(key, iv)
            .map_err(invalid)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
    };
    plaintext
        .map(Zeroizing::new)
        .map_err(|_| TokenError::WrappedKeyInvalid)
}

/// Checks that unwrapped bytes fit the object being created.
fn check_unwrapped(template: &AttributeSet, value: &[u8]) -> Result<(), TokenError> {
    let class = template
        .class()
        .ok_or(TokenError::TemplateIncomplete(AttributeType::Class))?;
    template
        .key_type()
        .ok_or(TokenError::TemplateIncomplete(AttributeType::KeyType))?;

    match class {
        KeyClass::PrivateKey if value.first() != Some(&DER_SEQUENCE) => {
            Err(TokenError::WrappedKeyInvalid)
        }
        KeyClass::SecretKey => match template.ulong(AttributeType::ValueLen) {
            Some(len) if u64::try_from(value.len()).ok() != Some(len) => {
                Err(TokenError::AttributeValueInvalid(AttributeType::ValueLen))
            }
            _ => Ok(()),
        },
        KeyClass::PublicKey => Err(TokenError::AttributeValueInvalid(AttributeType::Class)),
        KeyClass::PrivateKey => Ok(()),
    }
}

struct SoftEncryptor {
    state: Arc<Mutex<SoftState>>,
    key: ObjectHandle,
}

impl KeyEncryptor for SoftEncryptor {
    fn encrypt(&self, iv: &[u8; AES_BLOCK_LEN], plaintext: &[u8]) -> Result<Vec<u8>, TokenError> {
        let state = lock(&self.state);
        let key = state.key(self.key)?;
        if !permits(&key.attributes, AttributeType::Encrypt) {
            return Err(TokenError::KeyFunctionNotPermitted(self.key));
        }
        cbc_encrypt(&key.value, iv, plaintext)
    }
}

impl Token for SoftToken {
    fn config(&self) -> &TokenConfig {
        &self.config
    }

    fn open_object_session(&self) -> Result<SessionHandle, TokenError> {
        let mut state = lock(&self.state);
        if let Some(session) = state.idle.pop() {
            return Ok(session);
        }
        let session = SessionHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        state.sessions.insert(session);
        debug!(%session, "opened session");
        Ok(session)
    }

    fn release_session(&self, session: SessionHandle) {
        let mut state = lock(&self.state);
        if !state.sessions.contains(&session) || state.idle.contains(&session) {
            warn!(%session, "release of a session not in use");
            return;
        }
        state.idle.push(session);
    }

    fn generate_key(
        &self,
        session: SessionHandle,
        mechanism: &Mechanism,
        template: &AttributeSet,
    ) -> Result<ObjectHandle, TokenError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = lock(&self.state);
        state.check_session(session)?;

        if *mechanism != Mechanism::AesKeyGen {
            return Err(TokenError::MechanismInvalid(*mechanism));
        }
        if self.fail_key_generation.load(Ordering::SeqCst) {
            return Err(TokenError::Device("key generation disabled".to_owned()));
        }
        let len = aes_key_len(template)?;

        let mut value = Zeroizing::new(vec![0_u8; len]);
        OsRng.fill_bytes(&mut value);

        let mut attributes = template.clone();
        attributes.insert(AttributeType::Class, KeyClass::SecretKey);
        attributes.insert(AttributeType::KeyType, KeyType::Aes);
        let handle = self.store(&mut state, attributes, value);
        debug!(%session, key = %handle, "generated AES key");
        Ok(handle)
    }

    fn encryptor(
        &self,
        key: ObjectHandle,
        mechanism: &Mechanism,
    ) -> Result<Box<dyn KeyEncryptor>, TokenError> {
        if !matches!(mechanism, Mechanism::AesCbcPad { .. }) {
            return Err(TokenError::MechanismInvalid(*mechanism));
        }
        let state = lock(&self.state);
        let object = state.key(key)?;
        if object.attributes.key_type() != Some(KeyType::Aes) {
            return Err(TokenError::KeyFunctionNotPermitted(key));
        }
        Ok(Box::new(SoftEncryptor {
            state: Arc::clone(&self.state),
            key,
        }))
    }

    fn unwrap_key(
        &self,
        session: SessionHandle,
        mechanism: &Mechanism,
        unwrapping_key: ObjectHandle,
        wrapped: &[u8],
        template: &AttributeSet,
    ) -> Result<ObjectHandle, TokenError> {
        self.unwrap_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = lock(&self.state);
        state.check_session(session)?;

        let Mechanism::AesCbcPad { iv } = mechanism else {
            return Err(TokenError::MechanismInvalid(*mechanism));
        };
        let key = state.key(unwrapping_key)?;
        if !permits(&key.attributes, AttributeType::Unwrap) {
            return Err(TokenError::KeyFunctionNotPermitted(unwrapping_key));
        }

        let value = cbc_decrypt(&key.value, iv, wrapped)?;
        check_unwrapped(template, &value)?;

        let handle = self.store(&mut state, template.clone(), value);
        debug!(%session, key = %handle, "unwrapped key");
        Ok(handle)
    }

    fn create_object(
        &self,
        session: SessionHandle,
        template: &AttributeSet,
    ) -> Result<ObjectHandle, TokenError> {
        let mut state = lock(&self.state);
        state.check_session(session)?;

        template
            .class()
            .ok_or(TokenError::TemplateIncomplete(AttributeType::Class))?;
        let value = Zeroizing::new(
            template
                .bytes(AttributeType::Value)
                .map(<[u8]>::to_vec)
                .unwrap_or_default(),
        );
        let mut attributes = template.clone();
        attributes.remove(AttributeType::Value);

        let handle = self.store(&mut state, attributes, value);
        debug!(%session, object = %handle, "created object");
        Ok(handle)
    }
}
