//! Variable-width bit-packed codes stored in 32-bit words.
//!
//! Codes are packed least-significant bit first. A code of `bits` width at
//! index `i` starts at bit `i * bits`; when that is not a multiple of the
//! word size the code may straddle two consecutive words.

/// Encoding width for a block with `distinct` values.
///
/// A single value is stored uniformly (width 0); otherwise the width is
/// `ceil(log2(distinct))`.
///
/// # Examples
/// ```
/// # use compressed_segmentation::packing::encoding_bits;
/// assert_eq!(encoding_bits(1), 0);
/// assert_eq!(encoding_bits(2), 1);
/// assert_eq!(encoding_bits(3), 2);
/// assert_eq!(encoding_bits(256), 8);
/// assert_eq!(encoding_bits(257), 9);
/// ```
#[inline]
pub const fn encoding_bits(distinct: usize) -> u32 {
    if distinct <= 1 {
        0
    } else {
        usize::BITS - (distinct - 1).leading_zeros()
    }
}

/// Words needed for `count` codes of `bits` width.
///
/// # Examples
/// ```
/// # use compressed_segmentation::packing::required_words;
/// assert_eq!(required_words(512, 1), 16);
/// assert_eq!(required_words(512, 3), 48);
/// assert_eq!(required_words(7, 5), 2);
/// assert_eq!(required_words(64, 0), 0);
/// ```
#[inline]
pub const fn required_words(count: usize, bits: u32) -> usize {
    (count * bits as usize + 31) / 32
}

#[inline]
fn code_mask(bits: u32) -> u64 {
    (1u64 << bits) - 1
}

/// Extract the code at `index`. Words past the end of `words` read as zero.
///
/// Supports widths up to 32 bits.
#[inline]
pub fn get_code(words: &[u32], index: usize, bits: u32) -> u32 {
    debug_assert!(bits <= 32, "bits out of range: {}", bits);
    if bits == 0 {
        return 0;
    }

    let bit_offset = index * bits as usize;
    let word_idx = bit_offset >> 5;
    let bit_pos = (bit_offset & 31) as u32;

    let mut window = words.get(word_idx).copied().unwrap_or(0) as u64;
    if bit_pos + bits > 32 {
        // Straddles into the next word.
        let next = words.get(word_idx + 1).copied().unwrap_or(0) as u64;
        window |= next << 32;
    }
    ((window >> bit_pos) & code_mask(bits)) as u32
}

/// Write `code` at `index`.
///
/// **The destination must be pre-zeroed**: bits are OR-ed in.
///
/// # Panics
/// Panics if the code's words lie outside `words`.
#[inline]
pub fn set_code(words: &mut [u32], index: usize, code: u32, bits: u32) {
    debug_assert!(bits >= 1 && bits <= 32, "bits out of range: {}", bits);
    debug_assert!(
        (code as u64) <= code_mask(bits),
        "code {} out of range for bit width {}",
        code,
        bits
    );

    let bit_offset = index * bits as usize;
    let word_idx = bit_offset >> 5;
    let bit_pos = (bit_offset & 31) as u32;

    let shifted = (code as u64) << bit_pos;
    words[word_idx] |= shifted as u32;
    if bit_pos + bits > 32 {
        words[word_idx + 1] |= (shifted >> 32) as u32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_bits() {
        assert_eq!(encoding_bits(0), 0);
        assert_eq!(encoding_bits(1), 0);
        assert_eq!(encoding_bits(2), 1);
        assert_eq!(encoding_bits(3), 2);
        assert_eq!(encoding_bits(4), 2);
        assert_eq!(encoding_bits(5), 3);
        assert_eq!(encoding_bits(16), 4);
        assert_eq!(encoding_bits(17), 5);
        assert_eq!(encoding_bits(256), 8);
        assert_eq!(encoding_bits(1 << 24), 24);
        assert_eq!(encoding_bits((1 << 24) + 1), 25);
    }

    #[test]
    fn test_single_word_codes() {
        let mut words = vec![0u32; required_words(16, 2)];
        set_code(&mut words, 0, 3, 2);
        set_code(&mut words, 1, 1, 2);
        set_code(&mut words, 2, 2, 2);
        set_code(&mut words, 15, 3, 2);

        assert_eq!(words[0], 0b11 | (0b01 << 2) | (0b10 << 4) | (0b11 << 30));
        assert_eq!(get_code(&words, 0, 2), 3);
        assert_eq!(get_code(&words, 1, 2), 1);
        assert_eq!(get_code(&words, 2, 2), 2);
        assert_eq!(get_code(&words, 3, 2), 0);
        assert_eq!(get_code(&words, 15, 2), 3);
    }

    #[test]
    fn test_straddling_codes() {
        // 5-bit code 6 starts at bit 30: two bits in word 0, three in word 1.
        let mut words = vec![0u32; required_words(13, 5)];
        set_code(&mut words, 6, 0b10111, 5);
        assert_eq!(words[0] >> 30, 0b11);
        assert_eq!(words[1] & 0b111, 0b101);
        assert_eq!(get_code(&words, 6, 5), 0b10111);
        assert_eq!(get_code(&words, 5, 5), 0);
        assert_eq!(get_code(&words, 7, 5), 0);
    }

    #[test]
    fn test_every_width_round_trips() {
        for bits in 1..=32u32 {
            let count = 97;
            let mut words = vec![0u32; required_words(count, bits)];
            let mask = code_mask(bits);
            let codes: Vec<u32> = (0..count)
                .map(|i| ((i as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15) & mask) as u32)
                .collect();
            for (i, &code) in codes.iter().enumerate() {
                set_code(&mut words, i, code, bits);
            }
            for (i, &code) in codes.iter().enumerate() {
                assert_eq!(get_code(&words, i, bits), code, "bits={bits} index={i}");
            }
        }
    }

    #[test]
    fn test_get_code_past_end_reads_zero() {
        let words = [u32::MAX];
        assert_eq!(get_code(&words, 5, 8), 0);
        // Straddle into a missing word keeps the bits that exist.
        assert_eq!(get_code(&words, 3, 9), 0b1_1111);
        assert_eq!(get_code(&words, 0, 0), 0);
    }
}
