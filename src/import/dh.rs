//! Diffie-Hellman private key encoding.

use zeroize::Zeroizing;

use super::der::DerWriter;

/// `dhKeyAgreement` (1.2.840.113549.1.3.1), DER encoded.
const DH_KEY_AGREEMENT_OID: &[u8] = &[
    0x06, 0x09, 0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x03, 0x01,
];

/// DH private key components, unsigned big-endian; empty means zero.
pub(crate) struct DhPrivateKeySpec<'a> {
    pub(crate) value: &'a [u8],
    pub(crate) prime: &'a [u8],
    pub(crate) base: &'a [u8],
}

/// Builds PKCS#8 encodings of DH private keys.
#[derive(Debug)]
pub(crate) struct DhKeyFactory {
    algorithm: &'static [u8],
}

impl DhKeyFactory {
    pub(crate) fn new() -> Self {
        tracing::debug!("DH key factory ready");
        Self {
            algorithm: DH_KEY_AGREEMENT_OID,
        }
    }

    /// `PrivateKeyInfo` with `DHParameter ::= SEQUENCE { prime, base }`.
    pub(crate) fn generate_private(&self, spec: &DhPrivateKeySpec<'_>) -> Zeroizing<Vec<u8>> {
        let mut w = DerWriter::new();
        w.sequence(|info| {
            info.small_integer(0)
                .sequence(|alg| {
                    alg.encoded(self.algorithm).sequence(|params| {
                        params.unsigned_integer(spec.prime).unsigned_integer(spec.base);
                    });
                })
                .octet_string_of(|key| {
                    key.unsigned_integer(spec.value);
                });
        });
        w.finish()
    }
}
