//! Fixed-point coin amounts.
//!
//! An [`Amount`] is a signed 64-bit count of sela, the smallest coin unit
//! (10^-8 of a whole coin). Vote tallies, deposits and penalties are all
//! carried as amounts; subtraction is allowed to pass through zero because
//! rollback deltas are applied in both directions.

use crate::codec::{ReadExt, WriteExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// Number of sela per whole coin.
pub const SELA_PER_COIN: i64 = 100_000_000;

/// A fixed-point coin quantity with 8 decimal places.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    /// The zero amount.
    pub const ZERO: Self = Self(0);

    /// Creates an amount from a raw sela count.
    #[inline]
    pub const fn from_sela(sela: i64) -> Self {
        Self(sela)
    }

    /// Creates an amount from a whole-coin count.
    #[inline]
    pub const fn from_coins(coins: i64) -> Self {
        Self(coins * SELA_PER_COIN)
    }

    /// Returns the raw sela count.
    #[inline]
    pub const fn sela(&self) -> i64 {
        self.0
    }

    /// Checked addition; `None` on overflow.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    /// Checked subtraction; `None` on overflow.
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    /// Saturating subtraction clamped at zero.
    pub fn saturating_sub_floor(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0).max(0))
    }

    /// Whether the amount is negative.
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Writes the amount to the canonical codec.
    pub fn serialize<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_i64(self.0)
    }

    /// Reads an amount from the canonical codec.
    pub fn deserialize<R: io::Read>(r: &mut R) -> io::Result<Self> {
        Ok(Self(r.read_i64()?))
    }
}

impl Add for Amount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for Amount {
    type Output = Self;
    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Self(iter.map(|a| a.0).sum())
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({self})")
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(
            f,
            "{sign}{}.{:08}",
            abs / SELA_PER_COIN as u64,
            abs % SELA_PER_COIN as u64
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        let a = Amount::from_sela(500);
        let b = Amount::from_sela(200);
        assert_eq!(a + b, Amount::from_sela(700));
        assert_eq!(a - b, Amount::from_sela(300));
        assert_eq!(b - a, Amount::from_sela(-300));
        assert!((b - a).is_negative());
    }

    #[test]
    fn test_display() {
        assert_eq!(Amount::from_coins(5).to_string(), "5.00000000");
        assert_eq!(Amount::from_sela(1).to_string(), "0.00000001");
        assert_eq!(Amount::from_sela(-150_000_000).to_string(), "-1.50000000");
    }

    #[test]
    fn test_saturating_floor() {
        let a = Amount::from_sela(100);
        assert_eq!(a.saturating_sub_floor(Amount::from_sela(300)), Amount::ZERO);
        assert_eq!(
            a.saturating_sub_floor(Amount::from_sela(40)),
            Amount::from_sela(60)
        );
    }

    #[test]
    fn test_sum() {
        let total: Amount = [10, 20, 30].iter().map(|v| Amount::from_sela(*v)).sum();
        assert_eq!(total, Amount::from_sela(60));
    }
}
