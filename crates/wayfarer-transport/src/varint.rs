//! Base-128 varint encoding for 32-bit values.
//!
//! Each byte carries 7 bits of the value, least significant group first.
//! The high bit of a byte is set when more groups follow. A `u32` needs
//! at most 5 groups, so a 5th byte that still has its continuation bit
//! set can never be valid.
//!
//! ```text
//!   300 = 0b1_0010_1100
//!   → [0b1010_1100, 0b0000_0010]  (0xAC 0x02)
//! ```

/// Maximum encoded length of a varint32.
pub const MAX_VARINT32_LEN: usize = 5;

/// Errors from decoding a varint32 out of a byte slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VarintError {
    /// The input ended before the final (continuation-free) byte.
    #[error("varint truncated")]
    Truncated,

    /// The 5th byte still had its continuation bit set.
    #[error("varint longer than {MAX_VARINT32_LEN} bytes")]
    TooLong,

    /// The 5th byte carries bits beyond the 32-bit value space.
    #[error("varint overflows 32 bits")]
    Overflow,
}

/// Appends the varint encoding of `value` to `buf`.
pub fn encode_varint32(mut value: u32, buf: &mut Vec<u8>) {
    while value >= 0x80 {
        buf.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Returns how many bytes [`encode_varint32`] writes for `value`.
pub fn varint32_len(value: u32) -> usize {
    match value {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        0x20_0000..=0xFFF_FFFF => 4,
        _ => 5,
    }
}

/// Decodes a varint32 from the front of `buf`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_varint32(buf: &[u8]) -> Result<(u32, usize), VarintError> {
    let mut value: u32 = 0;
    for (i, &byte) in buf.iter().enumerate().take(MAX_VARINT32_LEN) {
        if i == MAX_VARINT32_LEN - 1 {
            if byte & 0x80 != 0 {
                return Err(VarintError::TooLong);
            }
            // Only the low 4 bits of the 5th group fit in a u32.
            if byte > 0x0F {
                return Err(VarintError::Overflow);
            }
        }
        value |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(VarintError::Truncated)
}
