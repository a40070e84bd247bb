//! Money and quantity value objects.
//!
//! Amounts are integers in the smallest currency unit (cents). Quantities are
//! fixed-point with three decimals so that time (1.25 h) and fractional units
//! (0.5 m²) can be priced without floating point.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// 100% expressed in basis points.
pub const BPS_SCALE: u64 = 10_000;

/// Share of `amount` given in basis points, rounded half up.
///
/// Returns `None` on overflow.
pub fn apply_bps(amount: u64, bps: u32) -> Option<u64> {
    let scaled = (amount as u128)
        .checked_mul(bps as u128)?
        .checked_add((BPS_SCALE / 2) as u128)?
        / BPS_SCALE as u128;
    u64::try_from(scaled).ok()
}

/// ISO-4217 style code: three uppercase ASCII letters.
pub fn validate_currency(code: &str) -> DomainResult<()> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(DomainError::validation(format!(
            "currency must be a 3-letter uppercase code, got '{code}'"
        )))
    }
}

/// An amount in minor units of a currency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    pub amount: u64,
    pub currency: String,
}

impl ValueObject for Money {}

impl Money {
    pub fn new(amount: u64, currency: impl Into<String>) -> DomainResult<Self> {
        let currency = currency.into();
        validate_currency(&currency)?;
        Ok(Self { amount, currency })
    }

    pub fn zero(currency: impl Into<String>) -> DomainResult<Self> {
        Self::new(0, currency)
    }

    pub fn checked_add(&self, other: &Money) -> DomainResult<Money> {
        if self.currency != other.currency {
            return Err(DomainError::invariant(format!(
                "cannot add {} to {}",
                other.currency, self.currency
            )));
        }
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or_else(|| DomainError::invariant("money overflow"))?;
        Ok(Money {
            amount,
            currency: self.currency.clone(),
        })
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02} {}", self.amount / 100, self.amount % 100, self.currency)
    }
}

/// Fixed-point quantity in thousandths (`1500` = 1.5).
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Quantity(i64);

impl ValueObject for Quantity {}

impl Quantity {
    pub const SCALE: i64 = 1_000;
    pub const ZERO: Quantity = Quantity(0);

    pub const fn from_milli(milli: i64) -> Self {
        Self(milli)
    }

    pub const fn from_units(units: i64) -> Self {
        Self(units * Self::SCALE)
    }

    /// Hours worked, rounded half up to the nearest thousandth of an hour.
    pub fn from_minutes(minutes: u32) -> Self {
        Self((minutes as i64 * Self::SCALE + 30) / 60)
    }

    /// Round a float supplied at an API boundary. Non-finite input is rejected.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let milli = (value * Self::SCALE as f64).round();
        if milli.abs() > i64::MAX as f64 {
            return None;
        }
        Some(Self(milli as i64))
    }

    pub const fn milli(self) -> i64 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, other: Quantity) -> Option<Quantity> {
        self.0.checked_add(other.0).map(Quantity)
    }

    pub fn checked_sub(self, other: Quantity) -> Option<Quantity> {
        self.0.checked_sub(other.0).map(Quantity)
    }

    /// `quantity × unit_price`, rounded half up to the minor unit.
    ///
    /// Only defined for non-negative quantities.
    pub fn extend(self, unit_price: u64) -> Option<u64> {
        if self.0 < 0 {
            return None;
        }
        let raw = (self.0 as u128)
            .checked_mul(unit_price as u128)?
            .checked_add((Self::SCALE / 2) as u128)?
            / Self::SCALE as u128;
        u64::try_from(raw).ok()
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = abs / Self::SCALE as u64;
        let frac = abs % Self::SCALE as u64;
        if frac == 0 {
            return write!(f, "{sign}{whole}");
        }
        let digits = format!("{frac:03}");
        write!(f, "{sign}{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl FromStr for Quantity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::validation(format!("invalid quantity '{s}'"));
        let s = s.trim();
        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (whole, frac) = match body.split_once('.') {
            Some((w, f)) => (w, f),
            None => (body, ""),
        };
        if whole.is_empty() || frac.len() > 3 {
            return Err(invalid());
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let whole: i64 = whole.parse().map_err(|_| invalid())?;
        let frac_milli: i64 = if frac.is_empty() {
            0
        } else {
            format!("{frac:0<3}").parse().map_err(|_| invalid())?
        };
        let milli = whole
            .checked_mul(Self::SCALE)
            .and_then(|w| w.checked_add(frac_milli))
            .ok_or_else(invalid)?;
        Ok(Self(if negative { -milli } else { milli }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn quantity_renders_trimmed_decimals() {
        assert_eq!(Quantity::from_milli(1500).to_string(), "1.5");
        assert_eq!(Quantity::from_units(2).to_string(), "2");
        assert_eq!(Quantity::from_milli(1250).to_string(), "1.25");
        assert_eq!(Quantity::from_milli(-5).to_string(), "-0.005");
    }

    #[test]
    fn quantity_parses_decimal_strings() {
        assert_eq!("1.5".parse::<Quantity>().unwrap(), Quantity::from_milli(1500));
        assert_eq!("3".parse::<Quantity>().unwrap(), Quantity::from_units(3));
        assert_eq!("0.125".parse::<Quantity>().unwrap(), Quantity::from_milli(125));
        assert!("1.2345".parse::<Quantity>().is_err());
        assert!(".5".parse::<Quantity>().is_err());
        assert!("abc".parse::<Quantity>().is_err());
    }

    #[test]
    fn minutes_convert_to_hours() {
        assert_eq!(Quantity::from_minutes(90), Quantity::from_milli(1500));
        assert_eq!(Quantity::from_minutes(60), Quantity::from_units(1));
        // 20 minutes = 0.3333.. h
        assert_eq!(Quantity::from_minutes(20), Quantity::from_milli(333));
    }

    #[test]
    fn extend_rounds_half_up() {
        // 1.5 × 1999 = 2998.5 -> 2999
        assert_eq!(Quantity::from_milli(1500).extend(1999), Some(2999));
        assert_eq!(Quantity::from_units(3).extend(250), Some(750));
        assert_eq!(Quantity::from_milli(-1).extend(100), None);
    }

    #[test]
    fn apply_bps_rounds_half_up() {
        // 20% of 1005 = 201
        assert_eq!(apply_bps(1005, 2000), Some(201));
        // 7.5% of 10 = 0.75 -> 1
        assert_eq!(apply_bps(10, 750), Some(1));
        assert_eq!(apply_bps(12345, 0), Some(0));
        assert_eq!(apply_bps(12345, 10_000), Some(12345));
    }

    #[test]
    fn money_addition_requires_same_currency() {
        let a = Money::new(100, "EUR").unwrap();
        let b = Money::new(250, "EUR").unwrap();
        let c = Money::new(1, "USD").unwrap();
        assert_eq!(a.checked_add(&b).unwrap().amount, 350);
        assert!(a.checked_add(&c).is_err());
        assert_eq!(a.checked_add(&b).unwrap().to_string(), "3.50 EUR");
    }

    #[test]
    fn currency_codes_are_validated() {
        assert!(validate_currency("EUR").is_ok());
        assert!(validate_currency("eur").is_err());
        assert!(validate_currency("EURO").is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            .. ProptestConfig::default()
        })]

        #[test]
        fn display_then_parse_is_identity(milli in -10_000_000i64..10_000_000i64) {
            let q = Quantity::from_milli(milli);
            prop_assert_eq!(q.to_string().parse::<Quantity>().unwrap(), q);
        }

        #[test]
        fn bps_share_never_exceeds_amount(amount in 0u64..1_000_000_000u64, bps in 0u32..=10_000u32) {
            let share = apply_bps(amount, bps).unwrap();
            prop_assert!(share <= amount);
        }
    }
}
