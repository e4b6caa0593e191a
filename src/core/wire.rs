//! Little-endian word helpers shared by the protocol engine and the device simulator.

use crate::config::WORD_SIZE;

/// Read the little-endian word starting at `offset`.
#[inline]
pub fn read_word(buf: &[u8], offset: usize) -> Option<u32> {
    let end = offset.checked_add(WORD_SIZE)?;
    let bytes: [u8; WORD_SIZE] = buf.get(offset..end)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// Append `word` to `out` in little-endian order.
#[inline]
pub fn put_word(out: &mut Vec<u8>, word: u32) {
    out.extend_from_slice(&word.to_le_bytes());
}

#[inline]
pub fn is_word_aligned(len: usize) -> bool {
    len % WORD_SIZE == 0
}

/// Number of whole words in `len` bytes.
#[inline]
pub fn words(len: usize) -> usize {
    len / WORD_SIZE
}
