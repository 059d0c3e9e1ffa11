//! Named-curve lookup for EC private keys.

use super::der::tag;

/// `id-ecPublicKey` (1.2.840.10045.2.1), DER encoded.
pub(crate) const EC_PUBLIC_KEY_OID: &[u8] = &[0x06, 0x07, 0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x02, 0x01];

/// A named curve the provider knows.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct NamedCurve {
    pub(crate) name: &'static str,
    /// DER-encoded OID, as found in `CKA_EC_PARAMS`.
    pub(crate) oid: &'static [u8],
    /// Byte length of the group order; private scalars are padded to it.
    pub(crate) order_len: usize,
}

const NAMED_CURVES: &[NamedCurve] = &[
    NamedCurve {
        name: "secp224r1",
        oid: &[0x06, 0x05, 0x2B, 0x81, 0x04, 0x00, 0x21],
        order_len: 28,
    },
    NamedCurve {
        name: "secp256r1",
        oid: &[0x06, 0x08, 0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x03, 0x01, 0x07],
        order_len: 32,
    },
    NamedCurve {
        name: "secp384r1",
        oid: &[0x06, 0x05, 0x2B, 0x81, 0x04, 0x00, 0x22],
        order_len: 48,
    },
    NamedCurve {
        name: "secp521r1",
        oid: &[0x06, 0x05, 0x2B, 0x81, 0x04, 0x00, 0x23],
        order_len: 66,
    },
];

/// Resolves `CKA_EC_PARAMS` to curve parameters.
///
/// Only the `namedCurve` form is accepted; explicit parameters and
/// unknown OIDs resolve to nothing.
#[derive(Debug)]
pub(crate) struct EcParameterProvider {
    curves: &'static [NamedCurve],
}

impl EcParameterProvider {
    pub(crate) fn system() -> Self {
        tracing::debug!(curves = NAMED_CURVES.len(), "EC parameter provider ready");
        Self {
            curves: NAMED_CURVES,
        }
    }

    pub(crate) fn named_curve(&self, ec_params: &[u8]) -> Option<&'static NamedCurve> {
        if ec_params.first() != Some(&tag::OID) {
            return None;
        }
        self.curves.iter().find(|c| c.oid == ec_params)
    }
}
