/// Rotate-and-add checksum used to stamp companion files
///
/// Engine formula: acc = rotl(acc, 1) + byte (mod 2^32), starting at 0.
/// Empty input yields 0, which callers must not confuse with a real value.
pub fn checksum(data: &[u8]) -> u32 {
    data.iter()
        .fold(0u32, |acc, &b| acc.rotate_left(1).wrapping_add(b as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum() {
        // 0x74 -> 0xE8+0x65=0x14D -> 0x29A+0x73=0x30D -> 0x61A+0x74=0x68E
        assert_eq!(checksum(b"test"), 0x0000068E);
    }

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn test_rotation_wraps() {
        let mut data = vec![1u8];
        data.extend(std::iter::repeat_n(0u8, 31));
        assert_eq!(checksum(&data), 0x8000_0000);

        // one more rotation brings the high bit back to bit 0
        data.push(0);
        assert_eq!(checksum(&data), 1);
    }

    #[test]
    fn test_addition_wraps() {
        let data = [0xFFu8; 40];
        // must not overflow-panic in debug builds
        let first = checksum(&data);
        assert_eq!(first, checksum(&data));
    }

    #[test]
    fn test_order_sensitive() {
        assert_ne!(checksum(b"ab"), checksum(b"ba"));
    }

    #[test]
    fn test_single_byte_flip_changes_value() {
        // heuristic: holds for this buffer, not a guarantee in general
        let data: Vec<u8> = (0..100u32).map(|i| (i * 7 + 3) as u8).collect();
        let base = checksum(&data);
        for pos in [0usize, 1, 50, 99] {
            let mut flipped = data.clone();
            flipped[pos] ^= 0x01;
            assert_ne!(checksum(&flipped), base, "flip at {} went unnoticed", pos);
        }
    }
}
