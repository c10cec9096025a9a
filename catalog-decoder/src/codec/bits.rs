//! Bit field extraction and insertion
//!
//! A payload is read as a logical bit sequence whose numbering depends on the
//! endianness of the field:
//! - Little-endian: bit 0 of byte 0 is position 0, ascending through each byte.
//!   The slice is packed LSB-first.
//! - Big-endian: bit 7 of byte 0 is position 0, descending through each byte.
//!   The slice is packed MSB-first.
//!
//! Fields up to 32 bits go through a fixed-width window load. Wider fields use
//! a bit-by-bit walk on `u128`. Both produce identical values where they overlap.
//! Neither path allocates.

use crate::types::Endianness;

/// Widest field handled by the native 32-bit path
pub const MAX_NATIVE_BITS: usize = 32;

/// Widest integer field the decoder extracts.
///
/// Raw values up to this width are exactly representable as a `Decimal`
/// mantissa, so scaling never loses digits.
pub const MAX_FIELD_BITS: usize = 96;

/// Check that `[start_bit, start_bit + bit_length)` lies inside a payload of `len` bytes
#[inline]
pub fn fits(len: usize, start_bit: usize, bit_length: usize) -> bool {
    bit_length > 0
        && start_bit
            .checked_add(bit_length)
            .map_or(false, |end| end <= len.saturating_mul(8))
}

/// Read one bit of the logical bit sequence
#[inline]
fn bit_at(data: &[u8], pos: usize, order: Endianness) -> u8 {
    let byte = data[pos / 8];
    match order {
        Endianness::Little => (byte >> (pos % 8)) & 0x01,
        Endianness::Big => (byte >> (7 - pos % 8)) & 0x01,
    }
}

/// Extract up to 32 bits with a single window load
///
/// Returns `None` for widths outside `1..=32` or ranges outside the payload.
pub fn extract_native(
    data: &[u8],
    start_bit: usize,
    bit_length: usize,
    order: Endianness,
) -> Option<u32> {
    if bit_length > MAX_NATIVE_BITS || !fits(data.len(), start_bit, bit_length) {
        return None;
    }

    let first = start_bit / 8;
    let shift = start_bit % 8;
    // At most 5 bytes: 7 bits of leading offset plus 32 bits of field
    let span = (shift + bit_length + 7) / 8;
    let window = &data[first..first + span];
    let mask = (1u64 << bit_length) - 1;

    let value = match order {
        Endianness::Little => {
            let word = window
                .iter()
                .enumerate()
                .fold(0u64, |acc, (i, b)| acc | (u64::from(*b) << (8 * i)));
            (word >> shift) & mask
        }
        Endianness::Big => {
            let word = window
                .iter()
                .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
            (word >> (span * 8 - shift - bit_length)) & mask
        }
    };

    Some(value as u32)
}

/// Extract up to 128 bits by walking the logical bit sequence
pub fn extract_wide(
    data: &[u8],
    start_bit: usize,
    bit_length: usize,
    order: Endianness,
) -> Option<u128> {
    if bit_length > 128 || !fits(data.len(), start_bit, bit_length) {
        return None;
    }

    let mut result: u128 = 0;
    for i in 0..bit_length {
        let bit = u128::from(bit_at(data, start_bit + i, order));
        match order {
            Endianness::Little => result |= bit << i,
            Endianness::Big => result = (result << 1) | bit,
        }
    }

    Some(result)
}

/// Extract an unsigned field, choosing the native or wide path by width
#[inline]
pub fn extract_unsigned(
    data: &[u8],
    start_bit: usize,
    bit_length: usize,
    order: Endianness,
) -> Option<u128> {
    if bit_length <= MAX_NATIVE_BITS {
        extract_native(data, start_bit, bit_length, order).map(u128::from)
    } else if bit_length <= MAX_FIELD_BITS {
        extract_wide(data, start_bit, bit_length, order)
    } else {
        None
    }
}

/// Sign-extend a value from N bits to 128 bits
///
/// Two's complement using the field's own width, not the container width.
pub fn sign_extend(value: u128, bit_length: usize) -> i128 {
    if bit_length == 0 || bit_length >= 128 {
        return value as i128;
    }

    let sign_bit = 1u128 << (bit_length - 1);
    if value & sign_bit != 0 {
        (value | (!0u128 << bit_length)) as i128
    } else {
        value as i128
    }
}

/// Extract a field as an integer, sign-extending when `signed` is set
pub fn extract_bits(
    data: &[u8],
    start_bit: usize,
    bit_length: usize,
    order: Endianness,
    signed: bool,
) -> Option<i128> {
    let raw = extract_unsigned(data, start_bit, bit_length, order)?;
    Some(if signed {
        sign_extend(raw, bit_length)
    } else {
        raw as i128
    })
}

/// Extract a multi-register field whose 16-bit words are stored low word first
///
/// Only byte-aligned fields made of whole words are swapped; anything else is
/// read as laid out.
pub fn extract_word_swapped(
    data: &[u8],
    start_bit: usize,
    bit_length: usize,
    order: Endianness,
) -> Option<u128> {
    if start_bit % 8 != 0 || bit_length % 16 != 0 || bit_length > MAX_FIELD_BITS {
        return extract_unsigned(data, start_bit, bit_length, order);
    }
    if !fits(data.len(), start_bit, bit_length) {
        return None;
    }

    let first = start_bit / 8;
    let len = bit_length / 8;
    let words = len / 2;
    let mut scratch = [0u8; MAX_FIELD_BITS / 8];
    for w in 0..words {
        let src = first + 2 * (words - 1 - w);
        scratch[2 * w] = data[src];
        scratch[2 * w + 1] = data[src + 1];
    }

    extract_unsigned(&scratch[..len], 0, bit_length, order)
}

/// Write the low `bit_length` bits of `value` into the payload
///
/// Inverse of [`extract_wide`]. Returns false if the range does not fit.
pub fn insert_bits(
    data: &mut [u8],
    start_bit: usize,
    bit_length: usize,
    order: Endianness,
    value: u128,
) -> bool {
    if bit_length > 128 || !fits(data.len(), start_bit, bit_length) {
        return false;
    }

    for i in 0..bit_length {
        let value_bit = match order {
            Endianness::Little => i,
            Endianness::Big => bit_length - 1 - i,
        };
        let set = (value >> value_bit) & 1 == 1;
        let pos = start_bit + i;
        let mask = match order {
            Endianness::Little => 1u8 << (pos % 8),
            Endianness::Big => 0x80u8 >> (pos % 8),
        };
        if set {
            data[pos / 8] |= mask;
        } else {
            data[pos / 8] &= !mask;
        }
    }

    true
}
