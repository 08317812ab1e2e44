//! Position-keyed byte transforms applied to the whole record
//!
//! The position `n` is the absolute offset inside the record. Both the low
//! and the high byte are taken from the low 16 bits of `n`, so offsets past
//! 65535 wrap around and existing records stay readable.

/// 20-byte key of the keyed XOR transform (from the encoder tool)
pub const RECORD_KEY: [u8; 20] = [
    0x9E, 0x98, 0x12, 0x2B, 0xB6, 0x76, 0xF6, 0x5B, 0x76, 0x4D, 0x08, 0xF2, 0xAB, 0xDF, 0x91, 0xB6,
    0x4C, 0x1C, 0x93, 0x2F,
];

/// Fixed bytes of the legacy transform
pub const LEGACY_XOR_BYTE: u8 = 0xA7;
pub const LEGACY_SUB_BYTE: u8 = 0x5D;

#[inline]
fn low_byte(n: usize) -> u8 {
    (n & 0xFF) as u8
}

#[inline]
fn high_byte(n: usize) -> u8 {
    ((n >> 8) & 0xFF) as u8
}

/// Forward pass exactly as the encoder tool runs it: xor, subtract, add.
///
/// The subtract/add pair cancels, so the output equals [`xor_pass`].
pub fn scramble<const K: usize>(buf: &mut [u8], key: &[u8; K]) {
    if K == 0 {
        return;
    }

    for (n, byte) in buf.iter_mut().enumerate() {
        let k = key[n % K];
        *byte ^= k ^ low_byte(n);
        *byte = byte.wrapping_sub(k ^ high_byte(n));
        *byte = byte.wrapping_add(k ^ high_byte(n));
    }
}

/// Single XOR step of the keyed transform. Self-inverse.
pub fn xor_pass<const K: usize>(buf: &mut [u8], key: &[u8; K]) {
    if K == 0 {
        return;
    }

    for (n, byte) in buf.iter_mut().enumerate() {
        *byte ^= key[n % K] ^ low_byte(n);
    }
}

/// Legacy forward pass: xor with the fixed byte, then subtract
pub fn legacy_forward(buf: &mut [u8]) {
    for (n, byte) in buf.iter_mut().enumerate() {
        *byte ^= LEGACY_XOR_BYTE ^ low_byte(n);
        *byte = byte.wrapping_sub(LEGACY_SUB_BYTE ^ high_byte(n));
    }
}

/// Legacy reverse pass: add back, then xor
pub fn legacy_reverse(buf: &mut [u8]) {
    for (n, byte) in buf.iter_mut().enumerate() {
        *byte = byte.wrapping_add(LEGACY_SUB_BYTE ^ high_byte(n));
        *byte ^= LEGACY_XOR_BYTE ^ low_byte(n);
    }
}
