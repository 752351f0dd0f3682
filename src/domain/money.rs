use crate::error::BookingError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A positive monetary amount in Kenyan shillings.
///
/// Wraps `rust_decimal::Decimal` so booking totals and commissions never
/// pass through floating point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, BookingError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(BookingError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// M-Pesa only accepts whole shillings, so fractional amounts are rounded up.
    pub fn whole_shillings(&self) -> u64 {
        self.0
            .round_dp_with_strategy(0, RoundingStrategy::AwayFromZero)
            .to_u64()
            .unwrap_or(u64::MAX)
    }

    /// Applies a percentage rate, rounded to cents.
    pub fn percent(&self, rate: Rate) -> Decimal {
        (self.0 * rate.value() / Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = BookingError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KES {}", self.0)
    }
}

/// A commission rate expressed in percent (5 means 5%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Rate(Decimal);

impl Rate {
    pub fn new(percent: Decimal) -> Result<Self, BookingError> {
        if percent >= Decimal::ZERO && percent <= Decimal::ONE_HUNDRED {
            Ok(Self(percent))
        } else {
            Err(BookingError::ValidationError(format!(
                "Commission rate must be between 0 and 100, got {percent}"
            )))
        }
    }

    /// Literal rates known to be within 0..=100.
    pub(crate) const fn from_static(percent: Decimal) -> Self {
        Self(percent)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Rate {
    type Error = BookingError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl FromStr for Rate {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: Decimal = s.trim().parse().map_err(|e| {
            BookingError::ValidationError(format!("Invalid commission rate {s:?}: {e}"))
        })?;
        Self::new(value)
    }
}

impl From<Rate> for Decimal {
    fn from(rate: Rate) -> Self {
        rate.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(1.0)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(BookingError::ValidationError(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(BookingError::ValidationError(_))
        ));
    }

    #[test]
    fn test_whole_shillings_rounds_up() {
        assert_eq!(Amount::new(dec!(100)).unwrap().whole_shillings(), 100);
        assert_eq!(Amount::new(dec!(100.01)).unwrap().whole_shillings(), 101);
        assert_eq!(Amount::new(dec!(0.2)).unwrap().whole_shillings(), 1);
    }

    #[test]
    fn test_percent_rounds_to_cents() {
        let amount = Amount::new(dec!(3333)).unwrap();
        let rate = Rate::new(dec!(5)).unwrap();
        assert_eq!(amount.percent(rate), dec!(166.65));

        let amount = Amount::new(dec!(10.01)).unwrap();
        let rate = Rate::new(dec!(2.5)).unwrap();
        assert_eq!(amount.percent(rate), dec!(0.25));
    }

    #[test]
    fn test_rate_bounds() {
        assert!(Rate::new(dec!(0)).is_ok());
        assert!(Rate::new(dec!(100)).is_ok());
        assert!(Rate::new(dec!(100.5)).is_err());
        assert!(Rate::new(dec!(-1)).is_err());
    }

    #[test]
    fn test_amount_deserialization_rejects_zero() {
        let ok: Amount = serde_json::from_str("\"1500.50\"").unwrap();
        assert_eq!(ok.value(), dec!(1500.50));
        assert!(serde_json::from_str::<Amount>("\"0\"").is_err());
    }
}
