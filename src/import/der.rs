//! Minimal DER writer for PKCS#8 private keys.
//!
//! Only the handful of universal types a `PrivateKeyInfo` needs. Every
//! buffer is wiped on drop since it may hold key material, and a buffer
//! with content is never reallocated in place.

use zeroize::Zeroizing;

/// ASN.1 universal tags.
pub(crate) mod tag {
    pub(crate) const INTEGER: u8 = 0x02;
    pub(crate) const OCTET_STRING: u8 = 0x04;
    pub(crate) const NULL: u8 = 0x05;
    pub(crate) const OID: u8 = 0x06;
    pub(crate) const SEQUENCE: u8 = 0x30;
}

/// Long-form length marker.
const LONG_FORM: u8 = 0x80;

#[derive(Default)]
pub(crate) struct DerWriter {
    buf: Zeroizing<Vec<u8>>,
}

impl DerWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn tlv(&mut self, tag: u8, content: &[u8]) {
        let (header, header_len) = header(tag, content.len());
        self.reserve(header_len.saturating_add(content.len()));
        self.append(&header[..header_len]);
        self.append(content);
    }

    /// Make room for `additional` bytes. A buffer that is too small is
    /// never grown in place: a larger one is filled and swapped in, and
    /// the old one is wiped as it drops.
    fn reserve(&mut self, additional: usize) {
        let needed = self.buf.len().saturating_add(additional);
        if needed <= self.buf.capacity() {
            return;
        }
        let capacity = needed.max(self.buf.capacity().saturating_mul(2));
        let mut grown = Zeroizing::new(Vec::with_capacity(capacity));
        grown.extend_from_slice(&self.buf);
        std::mem::swap(&mut self.buf, &mut grown);
    }

    fn append(&mut self, bytes: &[u8]) {
        self.reserve(bytes.len());
        let base = self.buf.as_ptr();
        self.buf.extend_from_slice(bytes);
        debug_assert!(
            bytes.is_empty() || base == self.buf.as_ptr(),
            "key material buffer reallocated in place"
        );
    }

    /// Non-negative INTEGER from unsigned big-endian bytes; empty is zero.
    pub(crate) fn unsigned_integer(&mut self, magnitude: &[u8]) -> &mut Self {
        let skip = magnitude.iter().take_while(|b| **b == 0).count();
        let trimmed = &magnitude[skip..];

        let mut content = Zeroizing::new(Vec::with_capacity(trimmed.len().saturating_add(1)));
        match trimmed.first() {
            None => content.push(0),
            Some(first) if *first >= 0x80 => content.push(0),
            Some(_) => {}
        }
        content.extend_from_slice(trimmed);
        self.tlv(tag::INTEGER, &content);
        self
    }

    pub(crate) fn small_integer(&mut self, value: u8) -> &mut Self {
        self.unsigned_integer(&[value])
    }

    pub(crate) fn octet_string(&mut self, content: &[u8]) -> &mut Self {
        self.tlv(tag::OCTET_STRING, content);
        self
    }

    pub(crate) fn null(&mut self) -> &mut Self {
        self.tlv(tag::NULL, &[]);
        self
    }

    /// Already-encoded element, such as an OID with its tag and length.
    pub(crate) fn encoded(&mut self, element: &[u8]) -> &mut Self {
        self.append(element);
        self
    }

    pub(crate) fn sequence(&mut self, build: impl FnOnce(&mut DerWriter)) -> &mut Self {
        let mut inner = DerWriter::new();
        build(&mut inner);
        self.tlv(tag::SEQUENCE, &inner.buf);
        self
    }

    /// OCTET STRING wrapping a nested encoding.
    pub(crate) fn octet_string_of(&mut self, build: impl FnOnce(&mut DerWriter)) -> &mut Self {
        let mut inner = DerWriter::new();
        build(&mut inner);
        self.tlv(tag::OCTET_STRING, &inner.buf);
        self
    }

    pub(crate) fn finish(self) -> Zeroizing<Vec<u8>> {
        self.buf
    }
}

/// Longest header: tag, long-form marker and every length octet.
const HEADER_MAX: usize = 2 + std::mem::size_of::<usize>();

/// Tag and definite-form length octets, and how many of them are used.
fn header(tag: u8, len: usize) -> ([u8; HEADER_MAX], usize) {
    let mut out = [0_u8; HEADER_MAX];
    out[0] = tag;

    let be = len.to_be_bytes();
    let skip = be.iter().take_while(|b| **b == 0).count();
    let significant = &be[skip..];

    match significant {
        [] => (out, 2),
        [b] if *b < LONG_FORM => {
            out[1] = *b;
            (out, 2)
        }
        _ => {
            let count = u8::try_from(significant.len()).unwrap_or(u8::MAX);
            out[1] = LONG_FORM | count;
            let end = significant.len().saturating_add(2);
            out[2..end].copy_from_slice(significant);
            (out, end)
        }
    }
}
