//! The token-generated key that receives imported keys.

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, warn};

use crate::token::{
    AttributeSet, AttributeType, KeyClass, KeyEncryptor, KeyType, Mechanism, ObjectHandle,
    TemplateOperation, Token, AES_BLOCK_LEN,
};

/// Importer key length in bytes (AES-256).
const IMPORTER_KEY_LEN: u64 = 256 >> 3;

/// Outcome of the single importer key creation attempt.
pub(crate) enum ImporterKeySlot {
    Ready(ImporterKey),
    /// Creation was attempted with `mechanism` and failed; never retried.
    Failed { mechanism: Mechanism },
}

/// AES key generated on the token, with the CBC-PAD mechanism and the
/// host-side cipher bound to it.
pub(crate) struct ImporterKey {
    handle: ObjectHandle,
    mechanism: Mechanism,
    iv: [u8; AES_BLOCK_LEN],
    encryptor: Box<dyn KeyEncryptor>,
    leases: AtomicUsize,
}

impl ImporterKey {
    /// Generate the key on the token. Any failure yields
    /// [`ImporterKeySlot::Failed`].
    pub(crate) fn create<T: Token + ?Sized>(token: &T) -> ImporterKeySlot {
        debug!("generating importer key");
        let mut iv = [0_u8; AES_BLOCK_LEN];
        OsRng.fill_bytes(&mut iv);
        let mechanism = Mechanism::AesCbcPad { iv };

        let template = token.template_attributes(
            TemplateOperation::Generate,
            KeyClass::SecretKey,
            KeyType::Aes,
            AttributeSet::new()
                .with(AttributeType::Class, KeyClass::SecretKey)
                .with(AttributeType::ValueLen, IMPORTER_KEY_LEN),
        );

        let session = match token.open_object_session() {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "importer key could not be generated");
                return ImporterKeySlot::Failed { mechanism };
            }
        };
        let generated = token.generate_key(session, &Mechanism::AesKeyGen, &template);
        token.release_session(session);

        let built = generated.and_then(|handle| {
            debug!(key = %handle, "importer key generated");
            token
                .encryptor(handle, &mechanism)
                .map(|encryptor| (handle, encryptor))
        });

        match built {
            Ok((handle, encryptor)) => ImporterKeySlot::Ready(ImporterKey {
                handle,
                mechanism,
                iv,
                encryptor,
                leases: AtomicUsize::new(0),
            }),
            Err(e) => {
                warn!(error = %e, "importer key could not be generated");
                ImporterKeySlot::Failed { mechanism }
            }
        }
    }

    /// Borrow the key for one import; the lease ends when dropped.
    pub(crate) fn lease(&self) -> KeyLease<'_> {
        self.leases.fetch_add(1, Ordering::AcqRel);
        KeyLease { key: self }
    }

    pub(crate) fn active_leases(&self) -> usize {
        self.leases.load(Ordering::Acquire)
    }
}

/// Scoped use of the importer key handle.
pub(crate) struct KeyLease<'a> {
    key: &'a ImporterKey,
}

impl KeyLease<'_> {
    pub(crate) fn handle(&self) -> ObjectHandle {
        self.key.handle
    }

    pub(crate) fn mechanism(&self) -> &Mechanism {
        &self.key.mechanism
    }

    pub(crate) fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, crate::token::TokenError> {
        self.key.encryptor.encrypt(&self.key.iv, plaintext)
    }
}

impl Drop for KeyLease<'_> {
    fn drop(&mut self) {
        self.key.leases.fetch_sub(1, Ordering::AcqRel);
    }
}
