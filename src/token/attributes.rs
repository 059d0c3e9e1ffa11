//! PKCS#11 object attributes.

use std::collections::BTreeMap;
use std::fmt;

use zeroize::Zeroize;

/// Object attribute types, with their PKCS#11 numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttributeType {
    /// `CKA_CLASS`
    Class,
    /// `CKA_TOKEN`
    Token,
    /// `CKA_PRIVATE`
    Private,
    /// `CKA_LABEL`
    Label,
    /// `CKA_VALUE`
    Value,
    /// `CKA_KEY_TYPE`
    KeyType,
    /// `CKA_ID`
    Id,
    /// `CKA_SENSITIVE`
    Sensitive,
    /// `CKA_ENCRYPT`
    Encrypt,
    /// `CKA_DECRYPT`
    Decrypt,
    /// `CKA_UNWRAP`
    Unwrap,
    /// `CKA_SIGN`
    Sign,
    /// `CKA_DERIVE`
    Derive,
    /// `CKA_MODULUS`
    Modulus,
    /// `CKA_PUBLIC_EXPONENT`
    PublicExponent,
    /// `CKA_PRIVATE_EXPONENT`
    PrivateExponent,
    /// `CKA_PRIME_1`
    Prime1,
    /// `CKA_PRIME_2`
    Prime2,
    /// `CKA_EXPONENT_1`
    Exponent1,
    /// `CKA_EXPONENT_2`
    Exponent2,
    /// `CKA_COEFFICIENT`
    Coefficient,
    /// `CKA_PRIME`
    Prime,
    /// `CKA_SUBPRIME`
    Subprime,
    /// `CKA_BASE`
    Base,
    /// `CKA_VALUE_LEN`
    ValueLen,
    /// `CKA_EXTRACTABLE`
    Extractable,
    /// `CKA_EC_PARAMS`
    EcParams,
    /// `CKA_NETSCAPE_DB`, the NSS vendor attribute carrying the public
    /// component of a private key.
    NetscapeDb,
}

impl AttributeType {
    /// PKCS#11 `CK_ATTRIBUTE_TYPE` value.
    pub const fn code(self) -> u64 {
        match self {
            Self::Class => 0x0000,
            Self::Token => 0x0001,
            Self::Private => 0x0002,
            Self::Label => 0x0003,
            Self::Value => 0x0011,
            Self::KeyType => 0x0100,
            Self::Id => 0x0102,
            Self::Sensitive => 0x0103,
            Self::Encrypt => 0x0104,
            Self::Decrypt => 0x0105,
            Self::Unwrap => 0x0107,
            Self::Sign => 0x0108,
            Self::Derive => 0x010C,
            Self::Modulus => 0x0120,
            Self::PublicExponent => 0x0122,
            Self::PrivateExponent => 0x0123,
            Self::Prime1 => 0x0124,
            Self::Prime2 => 0x0125,
            Self::Exponent1 => 0x0126,
            Self::Exponent2 => 0x0127,
            Self::Coefficient => 0x0128,
            Self::Prime => 0x0130,
            Self::Subprime => 0x0131,
            Self::Base => 0x0132,
            Self::ValueLen => 0x0161,
            Self::Extractable => 0x0162,
            Self::EcParams => 0x0180,
            Self::NetscapeDb => 0xD5A0_DB00,
        }
    }
}

/// `CKO_*` object classes handled here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyClass {
    /// `CKO_PUBLIC_KEY`
    PublicKey,
    /// `CKO_PRIVATE_KEY`
    PrivateKey,
    /// `CKO_SECRET_KEY`
    SecretKey,
}

impl KeyClass {
    /// PKCS#11 `CK_OBJECT_CLASS` value.
    pub const fn code(self) -> u64 {
        match self {
            Self::PublicKey => 2,
            Self::PrivateKey => 3,
            Self::SecretKey => 4,
        }
    }

    /// Class for a PKCS#11 code, if it is one of ours.
    pub const fn from_code(code: u64) -> Option<Self> {
        match code {
            2 => Some(Self::PublicKey),
            3 => Some(Self::PrivateKey),
            4 => Some(Self::SecretKey),
            _ => None,
        }
    }
}

/// `CKK_*` key types handled here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyType {
    /// `CKK_RSA`
    Rsa,
    /// `CKK_DSA`
    Dsa,
    /// `CKK_DH`
    Dh,
    /// `CKK_EC`
    Ec,
    /// `CKK_GENERIC_SECRET`
    GenericSecret,
    /// `CKK_AES`
    Aes,
}

impl KeyType {
    /// PKCS#11 `CK_KEY_TYPE` value.
    pub const fn code(self) -> u64 {
        match self {
            Self::Rsa => 0x00,
            Self::Dsa => 0x01,
            Self::Dh => 0x02,
            Self::Ec => 0x03,
            Self::GenericSecret => 0x10,
            Self::Aes => 0x1F,
        }
    }

    /// Key type for a PKCS#11 code, if it is one of ours.
    pub const fn from_code(code: u64) -> Option<Self> {
        match code {
            0x00 => Some(Self::Rsa),
            0x01 => Some(Self::Dsa),
            0x02 => Some(Self::Dh),
            0x03 => Some(Self::Ec),
            0x10 => Some(Self::GenericSecret),
            0x1F => Some(Self::Aes),
            _ => None,
        }
    }
}

/// Attribute value.
///
/// Byte strings hold big integers (unsigned, big-endian) as well as raw
/// key values; `Debug` prints only their length.
#[derive(Clone, PartialEq, Eq)]
pub enum AttributeValue {
    /// `CK_ULONG` value.
    ULong(u64),
    /// `CK_BBOOL` value.
    Bool(bool),
    /// Byte string.
    Bytes(Vec<u8>),
}

impl fmt::Debug for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ULong(v) => write!(f, "ULong({v:#x})"),
            Self::Bool(v) => write!(f, "Bool({v})"),
            Self::Bytes(b) => write!(f, "Bytes(<{} bytes>)", b.len()),
        }
    }
}

impl From<u64> for AttributeValue {
    fn from(v: u64) -> Self {
        Self::ULong(v)
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<&[u8]> for AttributeValue {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(v.to_vec())
    }
}

impl From<KeyClass> for AttributeValue {
    fn from(v: KeyClass) -> Self {
        Self::ULong(v.code())
    }
}

impl From<KeyType> for AttributeValue {
    fn from(v: KeyType) -> Self {
        Self::ULong(v.code())
    }
}

/// Attribute template: at most one value per type, ordered by type.
///
/// Byte values are wiped when the set is dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSet {
    attrs: BTreeMap<AttributeType, AttributeValue>,
}

impl AttributeSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, ty: AttributeType, value: impl Into<AttributeValue>) -> Self {
        self.insert(ty, value);
        self
    }

    /// Insert or replace an attribute.
    pub fn insert(&mut self, ty: AttributeType, value: impl Into<AttributeValue>) {
        if let Some(AttributeValue::Bytes(mut old)) = self.attrs.insert(ty, value.into()) {
            old.zeroize();
        }
    }

    /// Remove an attribute; a removed byte value is wiped.
    pub fn remove(&mut self, ty: AttributeType) -> bool {
        match self.attrs.remove(&ty) {
            Some(AttributeValue::Bytes(mut old)) => {
                old.zeroize();
                true
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Value of an attribute.
    pub fn get(&self, ty: AttributeType) -> Option<&AttributeValue> {
        self.attrs.get(&ty)
    }

    /// Returns `true` when the attribute is present.
    pub fn contains(&self, ty: AttributeType) -> bool {
        self.attrs.contains_key(&ty)
    }

    /// Byte-string value of an attribute.
    pub fn bytes(&self, ty: AttributeType) -> Option<&[u8]> {
        match self.attrs.get(&ty) {
            Some(AttributeValue::Bytes(b)) => Some(b.as_slice()),
            _ => None,
        }
    }

    /// `CK_ULONG` value of an attribute.
    pub fn ulong(&self, ty: AttributeType) -> Option<u64> {
        match self.attrs.get(&ty) {
            Some(AttributeValue::ULong(v)) => Some(*v),
            _ => None,
        }
    }

    /// `CK_BBOOL` value of an attribute.
    pub fn flag(&self, ty: AttributeType) -> Option<bool> {
        match self.attrs.get(&ty) {
            Some(AttributeValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    /// Object class, when `CKA_CLASS` holds a known class.
    pub fn class(&self) -> Option<KeyClass> {
        self.ulong(AttributeType::Class).and_then(KeyClass::from_code)
    }

    /// Key type, when `CKA_KEY_TYPE` holds a known type.
    pub fn key_type(&self) -> Option<KeyType> {
        self.ulong(AttributeType::KeyType)
            .and_then(KeyType::from_code)
    }

    /// Add every attribute of `defaults` that is not already present.
    pub fn fill_defaults(&mut self, defaults: &AttributeSet) {
        for (ty, value) in &defaults.attrs {
            if !self.attrs.contains_key(ty) {
                self.attrs.insert(*ty, value.clone());
            }
        }
    }

    /// Iterate in type order.
    pub fn iter(&self) -> impl Iterator<Item = (AttributeType, &AttributeValue)> {
        self.attrs.iter().map(|(ty, value)| (*ty, value))
    }

    /// Attribute types in order.
    pub fn types(&self) -> impl Iterator<Item = AttributeType> + '_ {
        self.attrs.keys().copied()
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// Returns `true` when the set is empty.
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

impl Drop for AttributeSet {
    fn drop(&mut self) {
        for value in self.attrs.values_mut() {
            if let AttributeValue::Bytes(b) = value {
                b.zeroize();
            }
        }
    }
}

impl<V: Into<AttributeValue>> FromIterator<(AttributeType, V)> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = (AttributeType, V)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (ty, value) in iter {
            set.insert(ty, value);
        }
        set
    }
}
