pub mod wide;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::number::wide::mul_div;

/// Number of decimal digits to the right of the point.
pub const SCALE_DIGITS: u32 = 19;

/// The fixed-point scale factor: raw integer units per 1.0.
pub const SCALE: u128 = 10u128.pow(SCALE_DIGITS);

/// Size in bytes of one number on the stack or in a data slot.
pub const WORD: usize = 16;

/// Fixed-point decimal number.
///
/// Stored as a signed 128-bit integer interpreted as `raw / 10^19`. All
/// arithmetic is exact at this scale: add/sub work directly on the raw
/// integers, mul/div widen to 256 bits (see [`wide`]) before applying the
/// scale correction, so no intermediate overflow and no rounding drift.
///
/// Equality and ordering compare raw integers - unlike floating point there
/// is no tolerance to pick, because every representable value is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fixed(i128);

impl Fixed {
    pub const ZERO: Fixed = Fixed(0);
    pub const ONE: Fixed = Fixed(SCALE as i128);

    /// Builds a number from a whole integer value.
    pub fn from_int(v: i64) -> Self {
        Fixed(v as i128 * SCALE as i128)
    }

    /// Builds a number directly from its raw scaled representation.
    pub fn from_raw(raw: i128) -> Self {
        Fixed(raw)
    }

    pub fn raw(&self) -> i128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Fixed) -> Option<Fixed> {
        self.0.checked_add(rhs.0).map(Fixed)
    }

    pub fn checked_sub(self, rhs: Fixed) -> Option<Fixed> {
        self.0.checked_sub(rhs.0).map(Fixed)
    }

    /// Exact multiplication: `(a.raw * b.raw) / SCALE` over a 256-bit
    /// intermediate. `None` on 128-bit overflow of the result.
    pub fn checked_mul(self, rhs: Fixed) -> Option<Fixed> {
        mul_div(self.0, rhs.0, SCALE).map(Fixed)
    }

    /// Exact division: `(a.raw * SCALE) / b.raw` over a 256-bit
    /// intermediate, truncating toward zero. `None` when `rhs` is zero or
    /// the result overflows 128 bits.
    pub fn checked_div(self, rhs: Fixed) -> Option<Fixed> {
        if rhs.0 == 0 {
            return None;
        }
        mul_div(self.0, SCALE as i128, rhs.0.unsigned_abs()).and_then(|q| {
            if rhs.0 < 0 {
                q.checked_neg().map(Fixed)
            } else {
                Some(Fixed(q))
            }
        })
    }

    /// Encodes the number as one little-endian memory word.
    pub fn to_word(self) -> [u8; WORD] {
        self.0.to_le_bytes()
    }

    /// Decodes a number from one little-endian memory word.
    pub fn from_word(bytes: [u8; WORD]) -> Self {
        Fixed(i128::from_le_bytes(bytes))
    }
}

impl fmt::Display for Fixed {
    /// Canonical decimal text: sign, integer part, and the fraction padded
    /// to the full scale width with trailing zeros trimmed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let magnitude = self.0.unsigned_abs();
        let int_part = magnitude / SCALE;
        let frac_part = magnitude % SCALE;

        if self.0 < 0 {
            write!(f, "-")?;
        }

        if frac_part == 0 {
            write!(f, "{}", int_part)
        } else {
            let frac = format!("{:0width$}", frac_part, width = SCALE_DIGITS as usize);
            write!(f, "{}.{}", int_part, frac.trim_end_matches('0'))
        }
    }
}

/// Why a decimal literal failed to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseNumberError {
    Empty,
    InvalidDigit(char),
    /// More than one decimal separator in the literal.
    ExtraSeparator,
    /// More fraction digits than the scale can represent exactly.
    TooPrecise,
    Overflow,
}

impl fmt::Display for ParseNumberError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseNumberError::Empty => write!(f, "empty number literal"),
            ParseNumberError::InvalidDigit(c) => {
                write!(f, "invalid character '{}' in number literal", c)
            }
            ParseNumberError::ExtraSeparator => {
                write!(f, "more than one decimal separator in number literal")
            }
            ParseNumberError::TooPrecise => write!(
                f,
                "number literal has more than {} fraction digits",
                SCALE_DIGITS
            ),
            ParseNumberError::Overflow => write!(f, "number literal out of range"),
        }
    }
}

impl std::error::Error for ParseNumberError {}

impl FromStr for Fixed {
    type Err = ParseNumberError;

    /// Parses decimal-literal text: optional minus sign, one optional `.`
    /// separator, `_` digit-group separators. `"12.25"`, `"-0.5"`,
    /// `"1_000_000"` are all valid.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let mut raw: i128 = 0;
        let mut frac_digits: Option<u32> = None;
        let mut seen_digit = false;

        for c in digits.chars() {
            match c {
                '0'..='9' => {
                    seen_digit = true;
                    if let Some(n) = frac_digits.as_mut() {
                        if *n == SCALE_DIGITS {
                            return Err(ParseNumberError::TooPrecise);
                        }
                        *n += 1;
                    }
                    let d = (c as u8 - b'0') as i128;
                    raw = raw
                        .checked_mul(10)
                        .and_then(|r| r.checked_add(d))
                        .ok_or(ParseNumberError::Overflow)?;
                }
                '_' => {}
                '.' => {
                    if frac_digits.is_some() {
                        return Err(ParseNumberError::ExtraSeparator);
                    }
                    frac_digits = Some(0);
                }
                other => return Err(ParseNumberError::InvalidDigit(other)),
            }
        }

        if !seen_digit {
            return Err(ParseNumberError::Empty);
        }

        // Scale up by the missing fraction digits.
        let missing = SCALE_DIGITS - frac_digits.unwrap_or(0);
        raw = raw
            .checked_mul(10i128.pow(missing))
            .ok_or(ParseNumberError::Overflow)?;

        Ok(Fixed(if negative { -raw } else { raw }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(s: &str) -> Fixed {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_integers() {
        assert_eq!(num("0"), Fixed::ZERO);
        assert_eq!(num("1"), Fixed::ONE);
        assert_eq!(num("42"), Fixed::from_int(42));
        assert_eq!(num("-42"), Fixed::from_int(-42));
        assert_eq!(num("1_000_000"), Fixed::from_int(1_000_000));
    }

    #[test]
    fn test_parse_fractions() {
        assert_eq!(num("0.5").raw(), SCALE as i128 / 2);
        assert_eq!(num("-0.5").raw(), -(SCALE as i128 / 2));
        assert_eq!(num("12.25").raw(), 12 * SCALE as i128 + SCALE as i128 / 4);
        assert_eq!(num(".5"), num("0.5"));
        // All 19 fraction digits are representable
        assert_eq!(num("0.0000000000000000001").raw(), 1);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<Fixed>(), Err(ParseNumberError::Empty));
        assert_eq!("-".parse::<Fixed>(), Err(ParseNumberError::Empty));
        assert_eq!("1..2".parse::<Fixed>(), Err(ParseNumberError::ExtraSeparator));
        assert_eq!("1x".parse::<Fixed>(), Err(ParseNumberError::InvalidDigit('x')));
        assert_eq!(
            "0.00000000000000000001".parse::<Fixed>(),
            Err(ParseNumberError::TooPrecise)
        );
        assert!(matches!(
            "99999999999999999999999999".parse::<Fixed>(),
            Err(ParseNumberError::Overflow)
        ));
    }

    #[test]
    fn test_display_round_trip() {
        for text in [
            "0", "1", "-1", "42", "12.25", "-12.25", "0.5", "-0.000001", "17.00000000000000001",
        ] {
            assert_eq!(num(text).to_string(), text);
        }
        // Normalization of non-canonical input
        assert_eq!(num("1.50").to_string(), "1.5");
        assert_eq!(num("007").to_string(), "7");
        assert_eq!(num("1_000").to_string(), "1000");
    }

    #[test]
    fn test_add_sub() {
        assert_eq!(num("1.5").checked_add(num("2.25")), Some(num("3.75")));
        assert_eq!(num("1").checked_sub(num("2.5")), Some(num("-1.5")));
        assert_eq!(Fixed(i128::MAX).checked_add(Fixed(1)), None);
        assert_eq!(Fixed(i128::MIN).checked_sub(Fixed(1)), None);
    }

    #[test]
    fn test_mul() {
        assert_eq!(num("3").checked_mul(num("4")), Some(num("12")));
        assert_eq!(num("1.5").checked_mul(num("-2")), Some(num("-3")));
        assert_eq!(num("0.1").checked_mul(num("0.1")), Some(num("0.01")));
    }

    #[test]
    fn test_div() {
        assert_eq!(num("12").checked_div(num("4")), Some(num("3")));
        assert_eq!(num("1").checked_div(num("8")), Some(num("0.125")));
        assert_eq!(num("-3").checked_div(num("2")), Some(num("-1.5")));
        assert_eq!(num("3").checked_div(num("-2")), Some(num("-1.5")));
        assert_eq!(num("1").checked_div(Fixed::ZERO), None);
    }

    #[test]
    fn test_mul_div_exact_round_trip() {
        // No rounding drift: multiplying and dividing by the same operand
        // returns the original value bit for bit.
        let counter = num("1_000_000");
        let tiny = num("0.0000001");
        let product = counter.checked_mul(tiny).unwrap();
        assert_eq!(product, num("0.1"));
        assert_eq!(product.checked_div(tiny), Some(counter));
    }

    #[test]
    fn test_mul_wide_intermediate() {
        // raw(1e9) = 1e28; the raw product is 1e56, far past i128, yet the
        // scaled result (1e18) fits.
        let a = num("1_000_000_000");
        let sq = a.checked_mul(a).unwrap();
        assert_eq!(sq.raw(), 10i128.pow(37));
        assert_eq!(sq.checked_div(a), Some(a));
    }

    #[test]
    fn test_mul_overflow() {
        let big = Fixed(i128::MAX / 2);
        assert_eq!(big.checked_mul(Fixed::from_int(1_000_000)), None);
    }

    #[test]
    fn test_ordering_is_exact() {
        assert!(num("0.0000000000000000001") > Fixed::ZERO);
        assert!(num("-0.5") < num("0.5"));
        assert_eq!(num("2.50"), num("2.5"));
    }

    #[test]
    fn test_word_round_trip() {
        for v in [Fixed::ZERO, Fixed::ONE, num("-12.25"), Fixed(i128::MIN)] {
            assert_eq!(Fixed::from_word(v.to_word()), v);
        }
    }
}
