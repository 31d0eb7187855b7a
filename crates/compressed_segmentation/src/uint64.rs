//! Two-word unsigned 64-bit integer used for segment identifiers.
//!
//! Segment ids routinely exceed 2^53, so they are carried as a pair of
//! 32-bit words exactly as they appear in encoded buffers and texels.
//! Base conversion works word-wise (long division / multiply-with-carry),
//! so the same arithmetic can be reproduced on hosts without native
//! 64-bit integers.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use rand::Rng;

use crate::error::ParseUint64Error;

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Unsigned 64-bit value `low + high * 2^32`.
///
/// Fields are public so hot decode paths can fill an existing value in place
/// (see [`decode_value_into`](crate::decode::decode_value_into)).
///
/// # Examples
/// ```
/// use compressed_segmentation::Uint64;
///
/// let id = Uint64::new(0, 1);
/// assert_eq!(id.to_string(), "4294967296");
/// assert_eq!(Uint64::parse_radix("ff", 16), Ok(Uint64::new(255, 0)));
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Uint64 {
    pub low: u32,
    pub high: u32,
}

impl Uint64 {
    pub const ZERO: Uint64 = Uint64 { low: 0, high: 0 };
    pub const MAX: Uint64 = Uint64 {
        low: u32::MAX,
        high: u32::MAX,
    };

    pub const fn new(low: u32, high: u32) -> Self {
        Self { low, high }
    }

    /// `a < b` as 64-bit magnitudes: high words first, low words on a tie.
    pub fn less(a: Uint64, b: Uint64) -> bool {
        a.high < b.high || (a.high == b.high && a.low < b.low)
    }

    /// Both words drawn independently and uniformly. Not for cryptographic use.
    pub fn random() -> Self {
        Self::random_with(&mut rand::thread_rng())
    }

    pub fn random_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            low: rng.gen(),
            high: rng.gen(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.low == 0 && self.high == 0
    }

    /// Format in `base` using digits `0-9a-z`, no leading zeros.
    ///
    /// # Panics
    /// Panics if `base` is outside `2..=36`.
    pub fn to_string_radix(&self, base: u32) -> String {
        assert!(
            (2..=36).contains(&base),
            "base must be in 2..=36 (got {base})"
        );

        let mut digits = Vec::with_capacity(64);
        let mut high = self.high;
        let mut low = self.low;
        loop {
            // Long division of the two-word number by a single-word divisor.
            let rem_high = high % base;
            high /= base;
            let partial = ((rem_high as u64) << 32) | low as u64;
            low = (partial / base as u64) as u32;
            let rem = (partial % base as u64) as usize;
            digits.push(DIGITS[rem]);
            if high == 0 && low == 0 {
                break;
            }
        }
        digits.reverse();
        // Only ASCII digits were pushed.
        digits.into_iter().map(char::from).collect()
    }

    /// Parse `text` in `base`.
    ///
    /// The whole string must be digits valid for `base` (either letter case);
    /// signs, whitespace and values of 2^64 or more are rejected.
    pub fn parse_radix(text: &str, base: u32) -> Result<Self, ParseUint64Error> {
        if !(2..=36).contains(&base) {
            return Err(ParseUint64Error::InvalidBase(base));
        }
        if text.is_empty() {
            return Err(ParseUint64Error::Empty);
        }

        let mut low = 0u32;
        let mut high = 0u32;
        for ch in text.chars() {
            let digit = ch
                .to_digit(base)
                .ok_or(ParseUint64Error::InvalidDigit { digit: ch, base })?;
            let next_low = low as u64 * base as u64 + digit as u64;
            let next_high = high as u64 * base as u64 + (next_low >> 32);
            if next_high > u32::MAX as u64 {
                return Err(ParseUint64Error::Overflow);
            }
            low = next_low as u32;
            high = next_high as u32;
        }
        Ok(Self { low, high })
    }

    /// In-place parse. Returns `false` and leaves `self` untouched when
    /// `text` is rejected.
    pub fn try_parse(&mut self, text: &str, base: u32) -> bool {
        match Self::parse_radix(text, base) {
            Ok(value) => {
                *self = value;
                true
            }
            Err(_) => false,
        }
    }
}

impl Ord for Uint64 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.high
            .cmp(&other.high)
            .then_with(|| self.low.cmp(&other.low))
    }
}

impl PartialOrd for Uint64 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<u64> for Uint64 {
    fn from(value: u64) -> Self {
        Self {
            low: value as u32,
            high: (value >> 32) as u32,
        }
    }
}

impl From<Uint64> for u64 {
    fn from(value: Uint64) -> Self {
        ((value.high as u64) << 32) | value.low as u64
    }
}

impl fmt::Display for Uint64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.to_string_radix(10))
    }
}

impl FromStr for Uint64 {
    type Err = ParseUint64Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_radix(s, 10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn less_orders_high_word_first() {
        assert!(Uint64::less(Uint64::new(0, 0), Uint64::new(0, 1)));
        assert!(!Uint64::less(Uint64::new(1, 1), Uint64::new(1, 0)));
        assert!(Uint64::less(Uint64::new(1, 0), Uint64::new(0, 1)));
        assert!(!Uint64::less(Uint64::new(5, 5), Uint64::new(5, 5)));
    }

    #[test]
    fn less_matches_native_ordering() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let a = Uint64::random_with(&mut rng);
            // Share the high word half of the time to exercise the tie path.
            let b = if rng.gen_bool(0.5) {
                Uint64::new(rng.gen(), a.high)
            } else {
                Uint64::random_with(&mut rng)
            };
            assert_eq!(Uint64::less(a, b), u64::from(a) < u64::from(b));
            assert_eq!(a.cmp(&b), u64::from(a).cmp(&u64::from(b)));
        }
    }

    #[test]
    fn formats_known_values() {
        assert_eq!(Uint64::new(0, 1).to_string(), "4294967296");
        assert_eq!(
            Uint64::new(0, 1).to_string_radix(2),
            format!("1{}", "0".repeat(32))
        );
        assert_eq!(Uint64::MAX.to_string(), "18446744073709551615");
        assert_eq!(Uint64::ZERO.to_string(), "0");
        assert_eq!(Uint64::ZERO.to_string_radix(36), "0");
        assert_eq!(Uint64::new(35, 0).to_string_radix(36), "z");
        assert_eq!(Uint64::MAX.to_string_radix(16), "ffffffffffffffff");
    }

    #[test]
    fn display_respects_padding() {
        assert_eq!(format!("{:>5}", Uint64::new(42, 0)), "   42");
    }

    #[test]
    #[should_panic]
    fn to_string_radix_rejects_base_one() {
        Uint64::new(1, 0).to_string_radix(1);
    }

    #[test]
    fn round_trips_random_values_in_every_base() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut values = vec![Uint64::ZERO, Uint64::MAX, Uint64::new(0, 1), Uint64::new(u32::MAX, 0)];
        values.extend((0..200).map(|_| Uint64::random_with(&mut rng)));

        for value in values {
            for base in 2..=36 {
                let text = value.to_string_radix(base);
                assert_eq!(Uint64::parse_radix(&text, base), Ok(value), "base {base}: {text}");
                assert_eq!(u64::from_str_radix(&text, base), Ok(u64::from(value)));
            }
        }
    }

    #[test]
    fn parses_max_and_rejects_overflow() {
        assert_eq!("18446744073709551615".parse::<Uint64>(), Ok(Uint64::MAX));
        assert_eq!(
            "18446744073709551616".parse::<Uint64>(),
            Err(ParseUint64Error::Overflow)
        );
        assert_eq!(
            Uint64::parse_radix(&format!("1{}", "0".repeat(64)), 2),
            Err(ParseUint64Error::Overflow)
        );
        assert_eq!(
            Uint64::parse_radix("3w5e11264sgsg", 36),
            Err(ParseUint64Error::Overflow)
        );
        assert_eq!(Uint64::parse_radix("3w5e11264sgsf", 36), Ok(Uint64::MAX));
    }

    #[test]
    fn rejects_malformed_numerals() {
        let rejected = ["", " 1", "1 ", "+1", "-1", "12a", "0x10", "1_000", "１"];
        for text in rejected {
            assert!(Uint64::parse_radix(text, 10).is_err(), "accepted {text:?}");
        }
        assert!(Uint64::parse_radix("2", 2).is_err());
        assert!(Uint64::parse_radix("g", 16).is_err());
        assert_eq!(Uint64::parse_radix("", 10), Err(ParseUint64Error::Empty));
        assert_eq!(Uint64::parse_radix("1", 37), Err(ParseUint64Error::InvalidBase(37)));
        assert_eq!(Uint64::parse_radix("1", 1), Err(ParseUint64Error::InvalidBase(1)));
    }

    #[test]
    fn accepts_either_letter_case() {
        assert_eq!(Uint64::parse_radix("FF", 16), Ok(Uint64::new(255, 0)));
        assert_eq!(Uint64::parse_radix("fF", 16), Ok(Uint64::new(255, 0)));
    }

    #[test]
    fn try_parse_leaves_value_on_failure() {
        let mut value = Uint64::new(7, 9);
        assert!(!value.try_parse("nope", 10));
        assert_eq!(value, Uint64::new(7, 9));

        assert!(value.try_parse("4294967297", 10));
        assert_eq!(value, Uint64::new(1, 1));
    }

    #[test]
    fn converts_to_and_from_native() {
        let native = 0x0123_4567_89ab_cdefu64;
        let value = Uint64::from(native);
        assert_eq!(value, Uint64::new(0x89ab_cdef, 0x0123_4567));
        assert_eq!(u64::from(value), native);
    }
}
