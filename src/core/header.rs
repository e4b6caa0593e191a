//! # Command Header
//!
//! The 32-bit header that prefixes every verifier request and every gateway
//! response.
//!
//! ## Wire Format
//! The header travels as a little-endian `u32`. Bit layout, MSB to LSB:
//! ```text
//!  31    28 27    24  23   22          12   11   10           0
//! +--------+--------+----+---------------+----+---------------+
//! | client |   id   | r1 | length(words) | r2 |     code      |
//! +--------+--------+----+---------------+----+---------------+
//! ```
//!
//! Decoding never fails: every bit pattern is a header. Encoding masks each
//! field to its width, so out-of-range values are truncated rather than
//! reported. The format has no way to signal overflow.

use crate::config::HEADER_SIZE;

const CODE_BITS: u32 = 11;
const RESERVED_BITS: u32 = 1;
const LENGTH_BITS: u32 = 11;
const ID_BITS: u32 = 4;
const CLIENT_BITS: u32 = 4;

/// Largest value representable in the `length` and `code` fields.
pub const MAX_FIELD_VALUE: u16 = (1 << 11) - 1;

#[inline]
const fn mask(bits: u32) -> u32 {
    (1 << bits) - 1
}

/// Decoded command header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CommandHeader {
    /// Opaque session tag, echoed back unchanged
    pub client: u8,
    /// Opaque request tag, echoed back unchanged
    pub id: u8,
    pub reserved1: bool,
    /// Payload length in 4-byte words
    pub length: u16,
    pub reserved2: bool,
    /// Command code on requests, status or error code on responses
    pub code: u16,
}

impl CommandHeader {
    /// Build a header with both reserved bits cleared.
    pub fn new(client: u8, id: u8, length: u16, code: u16) -> Self {
        Self {
            client,
            id,
            reserved1: false,
            length,
            reserved2: false,
            code,
        }
    }

    /// Split a packed header word into its fields.
    pub fn from_u32(mut word: u32) -> Self {
        let code = take_bits(&mut word, CODE_BITS) as u16;
        let reserved2 = take_bits(&mut word, RESERVED_BITS) != 0;
        let length = take_bits(&mut word, LENGTH_BITS) as u16;
        let reserved1 = take_bits(&mut word, RESERVED_BITS) != 0;
        let id = take_bits(&mut word, ID_BITS) as u8;
        let client = take_bits(&mut word, CLIENT_BITS) as u8;

        Self {
            client,
            id,
            reserved1,
            length,
            reserved2,
            code,
        }
    }

    /// Pack the fields into a header word, truncating each to its width.
    pub fn to_u32(&self) -> u32 {
        let mut word = 0;
        put_bits(&mut word, u32::from(self.client), CLIENT_BITS);
        put_bits(&mut word, u32::from(self.id), ID_BITS);
        put_bits(&mut word, u32::from(self.reserved1), RESERVED_BITS);
        put_bits(&mut word, u32::from(self.length), LENGTH_BITS);
        put_bits(&mut word, u32::from(self.reserved2), RESERVED_BITS);
        put_bits(&mut word, u32::from(self.code), CODE_BITS);
        word
    }

    /// Decode from the 4-byte little-endian wire form.
    #[inline]
    pub fn decode(bytes: [u8; HEADER_SIZE]) -> Self {
        Self::from_u32(u32::from_le_bytes(bytes))
    }

    /// Decode the header at the start of `buf`, or `None` if it is shorter than a header.
    pub fn decode_slice(buf: &[u8]) -> Option<Self> {
        let bytes: [u8; HEADER_SIZE] = buf.get(..HEADER_SIZE)?.try_into().ok()?;
        Some(Self::decode(bytes))
    }

    /// Encode into the 4-byte little-endian wire form.
    #[inline]
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        self.to_u32().to_le_bytes()
    }

    /// Declared payload size in bytes.
    #[inline]
    pub fn payload_len_bytes(&self) -> usize {
        usize::from(self.length) * crate::config::WORD_SIZE
    }
}

#[inline]
fn take_bits(source: &mut u32, bits: u32) -> u32 {
    let value = *source & mask(bits);
    *source >>= bits;
    value
}

#[inline]
fn put_bits(dest: &mut u32, value: u32, bits: u32) {
    *dest <<= bits;
    *dest |= value & mask(bits);
}
