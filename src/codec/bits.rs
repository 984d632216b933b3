//! Bit range helpers for codes packed into a single `u64`.

/// Mask covering the lowest `length` bits
#[inline]
#[must_use]
pub fn mask(length: u8) -> u64 {
    match length {
        0 => 0,
        64.. => u64::MAX,
        n => (1u64 << n) - 1,
    }
}

/// Reads `length` bits starting at bit `offset`
#[inline]
#[must_use]
pub fn read_bits(code: u64, offset: u8, length: u8) -> u64 {
    if length == 0 || offset >= 64 {
        return 0;
    }
    (code >> offset) & mask(length)
}

/// Overwrites `length` bits starting at bit `offset` with the low bits of `value`
#[inline]
pub fn write_bits(code: &mut u64, offset: u8, length: u8, value: u64) {
    if length == 0 || offset >= 64 {
        return;
    }
    let m = mask(length) << offset;
    *code = (*code & !m) | ((value << offset) & m);
}

/// Number of bits needed to represent `n` distinct codes
#[inline]
#[must_use]
pub fn bits_for(n: u64) -> u8 {
    if n <= 1 {
        0
    } else {
        (64 - (n - 1).leading_zeros()) as u8
    }
}

/// Number of whole bytes needed to store `bits` bits
#[inline]
#[must_use]
pub fn bytes_for(bits: u8) -> usize {
    usize::from(bits).div_ceil(8)
}
