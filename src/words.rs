//! Codecs for the 12-bit words carried by ARINC 717/573 streams.
//!
//! Words appear on the wire in one of two layouts. Unpacked data stores each
//! word in its own 16-bit unit with the top nibble zero. Packed data stores
//! two words in three bytes with their nibbles interleaved, the layout used
//! by most recorder capture hardware.

use crate::{Error, Result};

/// Only the low 12 bits of a word are significant.
pub const WORD_MASK: u16 = 0x0fff;

/// Read the 12-bit word at `offset` from two consecutive bytes.
///
/// The top 4 bits of the 16-bit unit are masked off.
///
/// # Panics
/// If `data` does not contain 2 bytes at `offset`. Offset validity is the
/// caller's responsibility.
#[must_use]
pub fn read_word(data: &[u8], offset: usize, little_endian: bool) -> u16 {
    let raw = if little_endian {
        u16::from_le_bytes([data[offset], data[offset + 1]])
    } else {
        u16::from_be_bytes([data[offset], data[offset + 1]])
    };
    raw & WORD_MASK
}

/// Expand packed bytes to unpacked bytes, 3 bytes in, 4 bytes out.
///
/// Output words are little-endian with zeroed top nibbles, so
/// `pack(unpack(x))` returns `x` unchanged.
///
/// # Errors
/// [`Error::InvalidLength`] unless `packed.len()` is a multiple of 3.
pub fn unpack(packed: &[u8]) -> Result<Vec<u8>> {
    if packed.len() % 3 != 0 {
        return Err(Error::InvalidLength {
            len: packed.len(),
            multiple: 3,
        });
    }
    let mut out = Vec::with_capacity(packed.len() / 3 * 4);
    for trio in packed.chunks_exact(3) {
        out.push(trio[0]);
        out.push(trio[1] & 0x0f);
        out.push((trio[1] >> 4) | (trio[2] << 4));
        out.push(trio[2] >> 4);
    }
    Ok(out)
}

/// Squeeze unpacked bytes to packed bytes, 4 bytes in, 3 bytes out.
///
/// The top nibble of each word byte is dropped; for data with those nibbles
/// zeroed (as [`unpack`] produces) the conversion is lossless.
///
/// # Errors
/// [`Error::InvalidLength`] unless `unpacked.len()` is a multiple of 4.
pub fn pack(unpacked: &[u8]) -> Result<Vec<u8>> {
    if unpacked.len() % 4 != 0 {
        return Err(Error::InvalidLength {
            len: unpacked.len(),
            multiple: 4,
        });
    }
    let mut out = Vec::with_capacity(unpacked.len() / 4 * 3);
    for quad in unpacked.chunks_exact(4) {
        out.push(quad[0]);
        out.push((quad[1] & 0x0f) | (quad[2] << 4));
        out.push((quad[2] >> 4) | (quad[3] << 4));
    }
    Ok(out)
}

/// Decode packed bytes directly to 12-bit words, 3 bytes in, 2 words out.
///
/// Equivalent to [`unpack`] followed by little-endian [`read_word`] at each
/// even offset, without the intermediate byte buffer.
///
/// # Errors
/// [`Error::InvalidLength`] unless `packed.len()` is a multiple of 3.
pub fn unpack_to_words(packed: &[u8]) -> Result<Vec<u16>> {
    if packed.len() % 3 != 0 {
        return Err(Error::InvalidLength {
            len: packed.len(),
            multiple: 3,
        });
    }
    let mut out = Vec::with_capacity(packed.len() / 3 * 2);
    for trio in packed.chunks_exact(3) {
        out.push(u16::from(trio[0]) | (u16::from(trio[1] & 0x0f) << 8));
        out.push((u16::from(trio[1]) >> 4) | (u16::from(trio[2]) << 4));
    }
    Ok(out)
}
