//! One bit per page, `1` = busy. Bit `i` lives in byte `i / 8` at position `i % 8`.

#[inline]
pub fn bytes_for(pages: u64) -> u64 {
    pages.div_ceil(8)
}

#[allow(clippy::cast_possible_truncation)]
#[inline]
fn locate(bit: u64) -> (usize, u8) {
    ((bit / 8) as usize, 1 << (bit % 8))
}

#[inline]
pub fn get(bits: &[u8], bit: u64) -> bool {
    let (byte, mask) = locate(bit);
    bits[byte] & mask != 0
}

#[inline]
pub fn set(bits: &mut [u8], bit: u64, busy: bool) {
    let (byte, mask) = locate(bit);
    if busy {
        bits[byte] |= mask;
    } else {
        bits[byte] &= !mask;
    }
}

/// First clear bit in `[from, len)`.
pub fn first_clear(bits: &[u8], from: u64, len: u64) -> Option<u64> {
    let mut bit = from;
    while bit < len {
        let (byte, _) = locate(bit);
        if bit % 8 == 0 && bits[byte] == u8::MAX {
            bit += 8;
            continue;
        }
        if !get(bits, bit) {
            return Some(bit);
        }
        bit += 1;
    }
    None
}

pub fn count_set(bits: &[u8]) -> u64 {
    bits.iter().map(|b| u64::from(b.count_ones())).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_are_little_endian_within_bytes() {
        let mut bits = [0u8; 2];
        set(&mut bits, 0, true);
        set(&mut bits, 9, true);
        assert_eq!(bits, [0b0000_0001, 0b0000_0010]);
        set(&mut bits, 0, false);
        assert_eq!(bits, [0, 0b0000_0010]);
        assert!(get(&bits, 9));
    }

    #[test]
    fn first_clear_skips_full_bytes() {
        let bits = [0xFF, 0xFF, 0b0000_0111];
        assert_eq!(first_clear(&bits, 0, 24), Some(19));
        assert_eq!(first_clear(&bits, 20, 24), Some(20));
        assert_eq!(first_clear(&bits, 0, 19), None);
    }

    #[test]
    fn byte_counts_round_up() {
        assert_eq!(bytes_for(0), 0);
        assert_eq!(bytes_for(1), 1);
        assert_eq!(bytes_for(8), 1);
        assert_eq!(bytes_for(9), 2);
        assert_eq!(count_set(&[0xF0, 0x01]), 5);
    }
}
