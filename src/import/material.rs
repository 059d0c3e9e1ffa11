//! Plaintext key encodings built from PKCS#11 attributes.
//!
//! Private keys become PKCS#8 `PrivateKeyInfo`; secret keys are their raw
//! value. Missing numeric components encode as zero.

use zeroize::Zeroizing;

use super::curves::{NamedCurve, EC_PUBLIC_KEY_OID};
use super::der::DerWriter;
use super::dh::{DhKeyFactory, DhPrivateKeySpec};
use super::ImportFailure;
use crate::token::{AttributeSet, AttributeType};

/// `rsaEncryption` (1.2.840.113549.1.1.1), DER encoded.
const RSA_ENCRYPTION_OID: &[u8] = &[
    0x06, 0x09, 0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x01,
];

/// `id-dsa` (1.2.840.10040.4.1), DER encoded.
const DSA_OID: &[u8] = &[0x06, 0x07, 0x2A, 0x86, 0x48, 0xCE, 0x38, 0x04, 0x01];

/// Attributes whose values end up inside the wrapped encoding and must
/// not travel in the clear.
pub(crate) const SENSITIVE_COMPONENTS: &[AttributeType] = &[
    AttributeType::Value,
    AttributeType::PrivateExponent,
    AttributeType::Prime1,
    AttributeType::Prime2,
    AttributeType::Exponent1,
    AttributeType::Exponent2,
    AttributeType::Coefficient,
];

fn component(attrs: &AttributeSet, ty: AttributeType) -> &[u8] {
    attrs.bytes(ty).unwrap_or_default()
}

fn is_zero(magnitude: &[u8]) -> bool {
    magnitude.iter().all(|b| *b == 0)
}

pub(crate) struct RsaComponents<'a> {
    modulus: &'a [u8],
    public_exponent: &'a [u8],
    private_exponent: &'a [u8],
    prime_1: &'a [u8],
    prime_2: &'a [u8],
    exponent_1: &'a [u8],
    exponent_2: &'a [u8],
    coefficient: &'a [u8],
}

/// Key material borrowed from an attribute set, ready to encode.
pub(crate) enum KeyMaterial<'a> {
    Rsa(RsaComponents<'a>),
    Dsa {
        value: &'a [u8],
        prime: &'a [u8],
        subprime: &'a [u8],
        base: &'a [u8],
    },
    Ec {
        value: &'a [u8],
        curve: &'static NamedCurve,
    },
    Dh {
        spec: DhPrivateKeySpec<'a>,
        factory: &'a DhKeyFactory,
    },
    Secret {
        value: &'a [u8],
    },
}

impl<'a> KeyMaterial<'a> {
    pub(crate) fn rsa(attrs: &'a AttributeSet) -> Self {
        Self::Rsa(RsaComponents {
            modulus: component(attrs, AttributeType::Modulus),
            public_exponent: component(attrs, AttributeType::PublicExponent),
            private_exponent: component(attrs, AttributeType::PrivateExponent),
            prime_1: component(attrs, AttributeType::Prime1),
            prime_2: component(attrs, AttributeType::Prime2),
            exponent_1: component(attrs, AttributeType::Exponent1),
            exponent_2: component(attrs, AttributeType::Exponent2),
            coefficient: component(attrs, AttributeType::Coefficient),
        })
    }

    pub(crate) fn dsa(attrs: &'a AttributeSet) -> Self {
        Self::Dsa {
            value: component(attrs, AttributeType::Value),
            prime: component(attrs, AttributeType::Prime),
            subprime: component(attrs, AttributeType::Subprime),
            base: component(attrs, AttributeType::Base),
        }
    }

    pub(crate) fn ec(attrs: &'a AttributeSet, curve: &'static NamedCurve) -> Self {
        Self::Ec {
            value: component(attrs, AttributeType::Value),
            curve,
        }
    }

    pub(crate) fn dh(attrs: &'a AttributeSet, factory: &'a DhKeyFactory) -> Self {
        Self::Dh {
            spec: DhPrivateKeySpec {
                value: component(attrs, AttributeType::Value),
                prime: component(attrs, AttributeType::Prime),
                base: component(attrs, AttributeType::Base),
            },
            factory,
        }
    }

    pub(crate) fn secret(attrs: &'a AttributeSet) -> Result<Self, ImportFailure> {
        let value = attrs
            .bytes(AttributeType::Value)
            .ok_or(ImportFailure::MissingAttribute(AttributeType::Value))?;
        Ok(Self::Secret { value })
    }

    /// Plaintext bytes to wrap.
    pub(crate) fn encode(&self) -> Result<Zeroizing<Vec<u8>>, ImportFailure> {
        match self {
            Self::Rsa(rsa) => Ok(encode_rsa(rsa)),
            Self::Dsa {
                value,
                prime,
                subprime,
                base,
            } => Ok(encode_dsa(value, prime, subprime, base)),
            Self::Ec { value, curve } => encode_ec(value, curve),
            Self::Dh { spec, factory } => Ok(factory.generate_private(spec)),
            Self::Secret { value } => Ok(Zeroizing::new(value.to_vec())),
        }
    }
}

/// RSA `PrivateKeyInfo`. Without a public exponent and full CRT set only
/// the modulus and private exponent are kept.
fn encode_rsa(rsa: &RsaComponents<'_>) -> Zeroizing<Vec<u8>> {
    let crt = [
        rsa.public_exponent,
        rsa.prime_1,
        rsa.prime_2,
        rsa.exponent_1,
        rsa.exponent_2,
        rsa.coefficient,
    ];
    let complete = !crt.iter().any(|c| is_zero(c));
    let pick = |c: &[u8]| -> Vec<u8> {
        if complete {
            c.to_vec()
        } else {
            Vec::new()
        }
    };
    let [e, p, q, dp, dq, qinv] = crt.map(pick).map(Zeroizing::new);

    let mut w = DerWriter::new();
    w.sequence(|info| {
        info.small_integer(0)
            .sequence(|alg| {
                alg.encoded(RSA_ENCRYPTION_OID).null();
            })
            .octet_string_of(|key| {
                key.sequence(|k| {
                    k.small_integer(0)
                        .unsigned_integer(rsa.modulus)
                        .unsigned_integer(&e)
                        .unsigned_integer(rsa.private_exponent)
                        .unsigned_integer(&p)
                        .unsigned_integer(&q)
                        .unsigned_integer(&dp)
                        .unsigned_integer(&dq)
                        .unsigned_integer(&qinv);
                });
            });
    });
    w.finish()
}

/// DSA `PrivateKeyInfo` with `Dss-Parms` and the private value as INTEGER.
fn encode_dsa(value: &[u8], prime: &[u8], subprime: &[u8], base: &[u8]) -> Zeroizing<Vec<u8>> {
    let mut w = DerWriter::new();
    w.sequence(|info| {
        info.small_integer(0)
            .sequence(|alg| {
                alg.encoded(DSA_OID).sequence(|params| {
                    params
                        .unsigned_integer(prime)
                        .unsigned_integer(subprime)
                        .unsigned_integer(base);
                });
            })
            .octet_string_of(|key| {
                key.unsigned_integer(value);
            });
    });
    w.finish()
}

/// EC `PrivateKeyInfo` with the named curve as algorithm parameters and an
/// `ECPrivateKey` holding the scalar padded to the order length.
fn encode_ec(value: &[u8], curve: &NamedCurve) -> Result<Zeroizing<Vec<u8>>, ImportFailure> {
    let skip = value.iter().take_while(|b| **b == 0).count();
    let significant = &value[skip..];
    let pad = curve
        .order_len
        .checked_sub(significant.len())
        .ok_or(ImportFailure::ScalarOutOfRange { curve: curve.name })?;

    let mut scalar = Zeroizing::new(Vec::with_capacity(curve.order_len));
    scalar.resize(pad, 0);
    scalar.extend_from_slice(significant);

    let mut w = DerWriter::new();
    w.sequence(|info| {
        info.small_integer(0)
            .sequence(|alg| {
                alg.encoded(EC_PUBLIC_KEY_OID).encoded(curve.oid);
            })
            .octet_string_of(|key| {
                key.sequence(|k| {
                    k.small_integer(1).octet_string(&scalar);
                });
            });
    });
    Ok(w.finish())
}
