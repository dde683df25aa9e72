//! 17.14 fixed-point arithmetic.
//!
//! The kernel has no floating point. Quantities such as `recent_cpu` and
//! `load_avg` are real numbers, so they are kept as signed 32-bit integers
//! whose lowest [`FRACTION_BITS`] bits are the fraction.
//!
//! | Operation                      | Result                             |
//! |--------------------------------|------------------------------------|
//! | `x + y`, `x - y`               | `x + y`, `x - y`                   |
//! | `x + n`, `x - n`               | `x + n * f`, `x - n * f`           |
//! | `x * y`                        | `((x as i64) * y / f) as i32`      |
//! | `x / y`                        | `((x as i64) * f / y) as i32`      |
//! | `x * n`, `x / n`               | `x * n`, `x / n`                   |
//!
//! where `f = 1 << 14`, `x`, `y` are fixed-point numbers and `n` an integer.
use core::ops::{Add, AddAssign, Div, Mul, Sub};

/// Number of fraction bits.
pub const FRACTION_BITS: u32 = 14;

const F: i32 = 1 << FRACTION_BITS;

/// A signed 17.14 fixed-point number.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct FixedPoint(i32);

impl FixedPoint {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// Convert integer `n` into a fixed-point number.
    #[inline]
    pub const fn from_int(n: i32) -> Self {
        Self(n * F)
    }

    /// The raw representation.
    #[inline]
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Convert into an integer, rounding toward zero.
    #[inline]
    pub const fn trunc(self) -> i32 {
        self.0 / F
    }

    /// Convert into an integer, rounding to nearest.
    #[inline]
    pub const fn round(self) -> i32 {
        if self.0 >= 0 {
            (self.0 + F / 2) / F
        } else {
            (self.0 - F / 2) / F
        }
    }
}

impl Add for FixedPoint {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for FixedPoint {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for FixedPoint {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Mul for FixedPoint {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self((self.0 as i64 * rhs.0 as i64 / F as i64) as i32)
    }
}

impl Div for FixedPoint {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        Self((self.0 as i64 * F as i64 / rhs.0 as i64) as i32)
    }
}

impl Add<i32> for FixedPoint {
    type Output = Self;
    fn add(self, rhs: i32) -> Self {
        Self(self.0 + rhs * F)
    }
}

impl AddAssign<i32> for FixedPoint {
    fn add_assign(&mut self, rhs: i32) {
        self.0 += rhs * F;
    }
}

impl Sub<i32> for FixedPoint {
    type Output = Self;
    fn sub(self, rhs: i32) -> Self {
        Self(self.0 - rhs * F)
    }
}

impl Mul<i32> for FixedPoint {
    type Output = Self;
    fn mul(self, rhs: i32) -> Self {
        Self(self.0 * rhs)
    }
}

impl Div<i32> for FixedPoint {
    type Output = Self;
    fn div(self, rhs: i32) -> Self {
        Self(self.0 / rhs)
    }
}

impl core::fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let hundredths = (*self * 100).round();
        let sign = if hundredths < 0 { "-" } else { "" };
        let hundredths = hundredths.abs();
        write!(f, "{sign}{}.{:02}", hundredths / 100, hundredths % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_conversion() {
        assert_eq!(FixedPoint::from_int(5).raw(), 5 << 14);
        assert_eq!(FixedPoint::from_int(-3).trunc(), -3);
        assert_eq!(FixedPoint::from_int(0), FixedPoint::ZERO);
    }

    #[test]
    fn rounding() {
        let half = FixedPoint::from_int(1) / 2;
        assert_eq!(half.round(), 1);
        assert_eq!(half.trunc(), 0);
        assert_eq!((FixedPoint::ZERO - half).round(), -1);
        assert_eq!((FixedPoint::ZERO - half).trunc(), 0);
        assert_eq!((FixedPoint::from_int(7) / 3).round(), 2);
        assert_eq!((FixedPoint::from_int(8) / 3).round(), 3);
    }

    #[test]
    fn mixed_arithmetic() {
        let x = FixedPoint::from_int(3) / 2;
        assert_eq!((x * 4).trunc(), 6);
        assert_eq!((x + 1).raw(), FixedPoint::from_int(5).raw() / 2);
        assert_eq!((x - 2).round(), -1);
        assert_eq!((x * x).raw(), FixedPoint::from_int(9).raw() / 4);
        assert_eq!((FixedPoint::from_int(1) / FixedPoint::from_int(4)).raw(), F / 4);
    }

    #[test]
    fn large_products_do_not_overflow() {
        // 100 * 100 needs the 64-bit intermediate.
        let x = FixedPoint::from_int(100);
        assert_eq!((x * x).trunc(), 10_000);
        assert_eq!((x * x / x).trunc(), 100);
    }

    #[test]
    fn display_in_hundredths() {
        assert_eq!(format!("{}", FixedPoint::from_int(59) / 60), "0.98");
        assert_eq!(format!("{}", FixedPoint::ZERO - FixedPoint::from_int(3) / 2), "-1.50");
    }
}
