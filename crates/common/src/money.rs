use std::iter::Sum;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Number of decimal places money is displayed and settled with.
pub const MONEY_SCALE: u32 = 2;

/// Number of decimal places used for interest and installment arithmetic.
pub const INTERNAL_SCALE: u32 = 6;

/// A monetary amount backed by a fixed-point decimal.
///
/// Amounts are kept at full precision while being computed and only rounded
/// explicitly with [`Money::round`] or [`Money::truncate`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Creates a money amount from a decimal value.
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Creates a money amount from integer cents.
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, MONEY_SCALE))
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self::ZERO
    }

    /// Returns the underlying decimal.
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Rounds half away from zero to cents.
    pub fn round(&self) -> Money {
        Money(
            self.0
                .round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// Drops everything past the cents digit.
    pub fn truncate(&self) -> Money {
        Money(self.0.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::ToZero))
    }

    /// Rounds to the internal precision used by interest math.
    pub fn round_internal(&self) -> Money {
        Money(
            self.0
                .round_dp_with_strategy(INTERNAL_SCALE, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn abs(&self) -> Money {
        Money(self.0.abs())
    }

    /// Multiplies by a decimal factor (a quantity or a rate).
    pub fn multiply(&self, factor: Decimal) -> Money {
        Money(self.0 * factor)
    }

    /// Divides by a decimal divisor. Returns `None` when dividing by zero.
    pub fn divide(&self, divisor: Decimal) -> Option<Money> {
        self.0.checked_div(divisor).map(Money)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.round().0)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl std::ops::Neg for Money {
    type Output = Money;

    fn neg(self) -> Self::Output {
        Money(-self.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::ops::SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + *m)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn from_cents_keeps_two_decimals() {
        assert_eq!(Money::from_cents(1050).amount(), dec!(10.50));
        assert_eq!(Money::from_cents(-5).amount(), dec!(-0.05));
    }

    #[test]
    fn round_is_half_away_from_zero() {
        assert_eq!(Money::new(dec!(1.005)).round(), Money::new(dec!(1.01)));
        assert_eq!(Money::new(dec!(-1.005)).round(), Money::new(dec!(-1.01)));
        assert_eq!(Money::new(dec!(1.004)).round(), Money::new(dec!(1.00)));
    }

    #[test]
    fn truncate_drops_sub_cent_digits() {
        assert_eq!(Money::new(dec!(33.339)).truncate(), Money::new(dec!(33.33)));
        assert_eq!(Money::new(dec!(-33.339)).truncate(), Money::new(dec!(-33.33)));
    }

    #[test]
    fn sign_predicates() {
        assert!(Money::from_cents(1).is_positive());
        assert!(Money::from_cents(-1).is_negative());
        assert!(Money::zero().is_zero());
        assert!(!Money::zero().is_positive());
        assert!(!Money::zero().is_negative());
    }

    #[test]
    fn sum_and_arithmetic() {
        let values = [Money::from_cents(100), Money::from_cents(250), -Money::from_cents(50)];
        let total: Money = values.iter().sum();
        assert_eq!(total, Money::from_cents(300));
        assert_eq!(total - Money::from_cents(300), Money::zero());
        assert_eq!(Money::from_cents(300).multiply(dec!(2)), Money::from_cents(600));
        assert_eq!(Money::from_cents(100).divide(Decimal::ZERO), None);
    }

    #[test]
    fn display_rounds_to_cents() {
        assert_eq!(Money::new(dec!(3.456)).to_string(), "3.46");
        assert_eq!(Money::from_cents(-1200).to_string(), "-12.00");
    }
}
