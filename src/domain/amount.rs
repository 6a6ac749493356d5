//! Ether-denominated amounts and their exact wei conversion.
//!
//! Agent charges are quoted in ether ([`Ether`]); every ledger call moves
//! the equivalent number of base units ([`Wei`], 10^-18 ether). The
//! conversion is exact: a charge with more than 18 fractional digits or
//! one that overflows `u128` is rejected rather than rounded.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use utoipa::ToSchema;

/// Number of fractional digits between ether and wei.
pub const ETHER_DECIMALS: u32 = 18;

/// Errors produced when building or converting an amount.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    /// Amounts must not be negative.
    #[error("amount must not be negative: {0}")]
    Negative(Decimal),

    /// More fractional digits than the ledger's base unit supports.
    #[error("amount has {0} fractional digits; at most 18 are supported")]
    TooPrecise(u32),

    /// The wei value does not fit in 128 bits.
    #[error("amount overflows the wei range")]
    Overflow,

    /// The string is not a valid amount.
    #[error("invalid amount: {0}")]
    Parse(String),
}

/// A non-negative amount in ether units.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Ether(Decimal);

impl Ether {
    /// Wraps a decimal ether amount.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError::Negative`] for values below zero.
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AmountError::Negative(value));
        }
        Ok(Self(value.normalize()))
    }

    /// Returns the inner decimal.
    #[must_use]
    pub const fn get(&self) -> Decimal {
        self.0
    }

    /// Converts to wei (`parseEther`).
    ///
    /// # Errors
    ///
    /// Returns [`AmountError::TooPrecise`] when the amount has more than
    /// 18 fractional digits and [`AmountError::Overflow`] when the result
    /// does not fit in a `u128`.
    pub fn to_wei(&self) -> Result<Wei, AmountError> {
        let scale = self.0.scale();
        if scale > ETHER_DECIMALS {
            return Err(AmountError::TooPrecise(scale));
        }
        let mantissa =
            u128::try_from(self.0.mantissa()).map_err(|_| AmountError::Negative(self.0))?;
        let factor = 10u128
            .checked_pow(ETHER_DECIMALS - scale)
            .ok_or(AmountError::Overflow)?;
        mantissa
            .checked_mul(factor)
            .map(Wei)
            .ok_or(AmountError::Overflow)
    }
}

impl TryFrom<Decimal> for Ether {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Ether> for Decimal {
    fn from(value: Ether) -> Self {
        value.0
    }
}

impl FromStr for Ether {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim()).map_err(|e| AmountError::Parse(e.to_string()))?;
        Self::new(value)
    }
}

impl fmt::Display for Ether {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An amount in the ledger's base unit.
///
/// Serialized as a decimal string to keep full `u128` precision in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, ToSchema)]
#[schema(value_type = String)]
pub struct Wei(pub u128);

impl Wei {
    /// Zero wei.
    pub const ZERO: Self = Self(0);

    /// Returns the raw base-unit value.
    #[must_use]
    pub const fn get(&self) -> u128 {
        self.0
    }

    /// Converts back to ether, if the value fits a [`Decimal`].
    #[must_use]
    pub fn to_ether(&self) -> Option<Ether> {
        let raw = i128::try_from(self.0).ok()?;
        let value = Decimal::try_from_i128_with_scale(raw, ETHER_DECIMALS).ok()?;
        Ether::new(value).ok()
    }

    /// Adds two amounts, returning `None` on overflow.
    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Subtracts `other`, returning `None` on underflow.
    #[must_use]
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Wei {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Wei {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<u128>()
            .map(Self)
            .map_err(|_| serde::de::Error::custom(format!("invalid wei amount: {raw}")))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ether(value: Decimal) -> Ether {
        let Ok(e) = Ether::new(value) else {
            panic!("valid ether amount");
        };
        e
    }

    #[test]
    fn converts_fractional_charge_to_wei() {
        assert_eq!(ether(dec!(0.05)).to_wei(), Ok(Wei(50_000_000_000_000_000)));
    }

    #[test]
    fn converts_whole_and_zero_amounts() {
        assert_eq!(
            ether(dec!(2)).to_wei(),
            Ok(Wei(2_000_000_000_000_000_000))
        );
        assert_eq!(ether(dec!(0)).to_wei(), Ok(Wei::ZERO));
    }

    #[test]
    fn trailing_zeros_do_not_count_as_precision() {
        let Ok(value) = Decimal::from_str("0.0500000000000000000000") else {
            panic!("valid decimal");
        };
        assert_eq!(ether(value).to_wei(), Ok(Wei(50_000_000_000_000_000)));
    }

    #[test]
    fn smallest_unit_converts_exactly() {
        let Ok(one_wei) = Ether::from_str("0.000000000000000001") else {
            panic!("valid amount");
        };
        assert_eq!(one_wei.to_wei(), Ok(Wei(1)));
    }

    #[test]
    fn rejects_sub_wei_precision() {
        let Ok(too_fine) = Ether::from_str("0.0000000000000000001") else {
            panic!("valid decimal");
        };
        assert_eq!(too_fine.to_wei(), Err(AmountError::TooPrecise(19)));
    }

    #[test]
    fn rejects_negative_amounts() {
        assert!(matches!(
            Ether::new(dec!(-0.5)),
            Err(AmountError::Negative(_))
        ));
        assert!(serde_json::from_str::<Ether>("\"-1\"").is_err());
    }

    #[test]
    fn wei_round_trips_through_ether() {
        let wei = Wei(50_000_000_000_000_000);
        assert_eq!(wei.to_ether(), Some(ether(dec!(0.05))));
    }

    #[test]
    fn wei_serializes_as_string() {
        let Ok(json) = serde_json::to_string(&Wei(u128::MAX)) else {
            panic!("serialization failed");
        };
        assert_eq!(json, format!("\"{}\"", u128::MAX));
    }

    #[test]
    fn ether_accepts_json_numbers() {
        let Ok(amount) = serde_json::from_str::<Ether>("0.05") else {
            panic!("numeric ether must deserialize");
        };
        assert_eq!(amount.get(), dec!(0.05));
    }
}
