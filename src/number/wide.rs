// =============================================================================
// U256 - double-width intermediate for fixed-point multiply/divide
// =============================================================================

/// Unsigned 256-bit integer, two little-endian u128 limbs.
///
/// Only exists so that `Fixed` multiply/divide can form the full 256-bit
/// product (or scaled dividend) before narrowing back to 128 bits. Not a
/// general-purpose big integer: it supports exactly the operations that
/// `mul_div` needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct U256 {
    hi: u128,
    lo: u128,
}

impl U256 {
    pub const ZERO: U256 = U256 { hi: 0, lo: 0 };

    pub fn from_u128(v: u128) -> Self {
        U256 { hi: 0, lo: v }
    }

    /// Full 256-bit product of two u128 values.
    pub fn mul_full(a: u128, b: u128) -> Self {
        // Schoolbook on 64-bit halves: a = a1*2^64 + a0, b = b1*2^64 + b0.
        let (a1, a0) = (a >> 64, a & u64::MAX as u128);
        let (b1, b0) = (b >> 64, b & u64::MAX as u128);

        let ll = a0 * b0;
        let lh = a0 * b1;
        let hl = a1 * b0;
        let hh = a1 * b1;

        let (mid, carry1) = lh.overflowing_add(hl);
        let (lo, carry2) = ll.overflowing_add(mid << 64);

        let mut hi = hh + (mid >> 64);
        if carry1 {
            hi += 1u128 << 64;
        }
        if carry2 {
            hi += 1;
        }

        U256 { hi, lo }
    }

    pub fn is_zero(&self) -> bool {
        self.hi == 0 && self.lo == 0
    }

    /// The value as u128, if it fits.
    pub fn to_u128(&self) -> Option<u128> {
        if self.hi == 0 { Some(self.lo) } else { None }
    }

    fn bit(&self, i: u32) -> bool {
        if i >= 128 {
            (self.hi >> (i - 128)) & 1 == 1
        } else {
            (self.lo >> i) & 1 == 1
        }
    }

    fn bits(&self) -> u32 {
        if self.hi != 0 {
            256 - self.hi.leading_zeros()
        } else {
            128 - self.lo.leading_zeros()
        }
    }

    fn shl1(self) -> Self {
        U256 {
            hi: (self.hi << 1) | (self.lo >> 127),
            lo: self.lo << 1,
        }
    }

    fn set_bit0(self) -> Self {
        U256 {
            hi: self.hi,
            lo: self.lo | 1,
        }
    }

    fn sub(self, rhs: Self) -> Self {
        let (lo, borrow) = self.lo.overflowing_sub(rhs.lo);
        let hi = self.hi - rhs.hi - borrow as u128;
        U256 { hi, lo }
    }

    /// Truncating division by a non-zero u128 divisor.
    ///
    /// Restoring shift-subtract division, at most 256 iterations. Plenty for
    /// something that runs once per Mul/Div instruction.
    pub fn div_u128(self, divisor: u128) -> U256 {
        debug_assert!(divisor != 0);
        let divisor = U256::from_u128(divisor);

        if self < divisor {
            return U256::ZERO;
        }

        let mut quotient = U256::ZERO;
        let mut remainder = U256::ZERO;

        for i in (0..self.bits()).rev() {
            remainder = remainder.shl1();
            if self.bit(i) {
                remainder = remainder.set_bit0();
            }
            quotient = quotient.shl1();
            if remainder >= divisor {
                remainder = remainder.sub(divisor);
                quotient = quotient.set_bit0();
            }
        }

        quotient
    }
}

/// Computes `a * b / divisor` with a 256-bit intermediate, truncating toward
/// zero. Returns `None` when the result does not fit in i128.
///
/// Sign is handled on unsigned magnitudes so that `i128::MIN` is safe.
pub fn mul_div(a: i128, b: i128, divisor: u128) -> Option<i128> {
    debug_assert!(divisor != 0);
    let negative = (a < 0) != (b < 0);

    let product = U256::mul_full(a.unsigned_abs(), b.unsigned_abs());
    let magnitude = product.div_u128(divisor).to_u128()?;

    if negative {
        if magnitude > i128::MIN.unsigned_abs() {
            return None;
        }
        Some((magnitude as i128).wrapping_neg())
    } else {
        if magnitude > i128::MAX as u128 {
            return None;
        }
        Some(magnitude as i128)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_full_small() {
        assert_eq!(U256::mul_full(6, 7).to_u128(), Some(42));
        assert_eq!(U256::mul_full(0, u128::MAX).to_u128(), Some(0));
    }

    #[test]
    fn test_mul_full_wide() {
        // (2^127) * 2 = 2^128: exactly one bit past the low limb.
        let p = U256::mul_full(1 << 127, 2);
        assert_eq!(p.to_u128(), None);
        assert_eq!(p, U256 { hi: 1, lo: 0 });

        // u128::MAX^2 = 2^256 - 2^129 + 1
        let p = U256::mul_full(u128::MAX, u128::MAX);
        assert_eq!(p.hi, u128::MAX - 1);
        assert_eq!(p.lo, 1);
    }

    #[test]
    fn test_div_u128() {
        assert_eq!(U256::from_u128(100).div_u128(7).to_u128(), Some(14));
        assert_eq!(U256::from_u128(0).div_u128(7).to_u128(), Some(0));

        // (2^128 * 10) / 10 = 2^128, still wider than one limb
        let wide = U256 { hi: 10, lo: 0 };
        assert_eq!(wide.div_u128(10), U256 { hi: 1, lo: 0 });

        // Round-trips through the wide product
        let p = U256::mul_full(u128::MAX, 1_000_000);
        assert_eq!(p.div_u128(1_000_000).to_u128(), Some(u128::MAX));
    }

    #[test]
    fn test_mul_div_signs() {
        assert_eq!(mul_div(6, 7, 2), Some(21));
        assert_eq!(mul_div(-6, 7, 2), Some(-21));
        assert_eq!(mul_div(6, -7, 2), Some(-21));
        assert_eq!(mul_div(-6, -7, 2), Some(21));
    }

    #[test]
    fn test_mul_div_truncates_toward_zero() {
        assert_eq!(mul_div(7, 1, 2), Some(3));
        assert_eq!(mul_div(-7, 1, 2), Some(-3));
    }

    #[test]
    fn test_mul_div_wide_intermediate() {
        // The product overflows i128 but the quotient fits.
        let a = 10i128.pow(28);
        assert_eq!(mul_div(a, a, 10u128.pow(19)), Some(10i128.pow(37)));
    }

    #[test]
    fn test_mul_div_overflow() {
        assert_eq!(mul_div(i128::MAX, 2, 1), None);
        // i128::MIN magnitude is representable only with a negative sign
        assert_eq!(mul_div(i128::MIN, 1, 1), Some(i128::MIN));
        assert_eq!(mul_div(i128::MIN, -1, 1), None);
    }
}
