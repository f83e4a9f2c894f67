//! # Fixed-Point Decimals
//!
//! **NO FLOATING POINT IN PAYOUTS OR VALUATIONS**
//!
//! Balances are plain integers. Everything fractional that touches money
//! (item valuations, game multipliers such as `1.95`) is a [`FixedPoint`]:
//! a `u64` holding the value scaled by 10^6.
//!
//! Values are written in TOML as strings (`"45.50"`, `"1.95"`) so the
//! decimal text never passes through an IEEE 754 float on the way in.

use crate::error::{EconomyError, EconomyResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of decimal places.
const DECIMAL_PLACES: u32 = 6;

/// Scale factor for [`DECIMAL_PLACES`].
const SCALE: u64 = 10u64.pow(DECIMAL_PLACES);

/// Unsigned fixed-point decimal with 6 decimal places.
///
/// # Example
///
/// ```
/// use skinforge_economy::FixedPoint;
///
/// let multiplier: FixedPoint = "1.95".parse().unwrap();
/// assert_eq!(multiplier.apply_floor(100), Some(195));
/// assert_eq!(multiplier.apply_floor(15), Some(29)); // 29.25 floors
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[repr(transparent)]
pub struct FixedPoint(u64);

impl FixedPoint {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// One.
    pub const ONE: Self = Self(SCALE);

    /// Creates from a whole number.
    #[inline]
    #[must_use]
    pub const fn from_whole(whole: u64) -> Self {
        Self(whole * SCALE)
    }

    /// Creates from a raw scaled value.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw scaled value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns the whole number part.
    #[inline]
    #[must_use]
    pub const fn whole(self) -> u64 {
        self.0 / SCALE
    }

    /// Returns `true` if zero.
    #[inline]
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Checked addition.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Multiplies an integer amount by this value and floors the result.
    ///
    /// Used for every game payout: `floor(wager × multiplier)`.
    /// Returns `None` if the result does not fit in a `u64`.
    #[must_use]
    pub fn apply_floor(self, amount: u64) -> Option<u64> {
        let product = u128::from(amount) * u128::from(self.0) / u128::from(SCALE);
        u64::try_from(product).ok()
    }

    /// [`Self::apply_floor`] mapped into the economy error type.
    pub fn safe_apply_floor(self, amount: u64) -> EconomyResult<u64> {
        self.apply_floor(amount).ok_or(EconomyError::ArithmeticOverflow)
    }
}

impl FromStr for FixedPoint {
    type Err = EconomyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let invalid = || EconomyError::InvalidConfig(format!("invalid decimal '{s}'"));

        let (whole_text, frac_text) = match text.split_once('.') {
            Some((w, f)) => (w, f),
            None => (text, ""),
        };
        if whole_text.is_empty() || !whole_text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if frac_text.len() > DECIMAL_PLACES as usize
            || !frac_text.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let whole: u64 = whole_text.parse().map_err(|_| invalid())?;
        let mut frac: u64 = 0;
        for (i, digit) in frac_text.bytes().enumerate() {
            let place = DECIMAL_PLACES - 1 - u32::try_from(i).map_err(|_| invalid())?;
            frac += u64::from(digit - b'0') * 10u64.pow(place);
        }

        whole
            .checked_mul(SCALE)
            .and_then(|w| w.checked_add(frac))
            .map(Self)
            .ok_or(EconomyError::ArithmeticOverflow)
    }
}

impl TryFrom<String> for FixedPoint {
    type Error = EconomyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FixedPoint> for String {
    fn from(value: FixedPoint) -> Self {
        value.to_string()
    }
}

impl fmt::Debug for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FixedPoint({self})")
    }
}

impl fmt::Display for FixedPoint {
    /// Prints at least two decimals, trimming trailing zeros beyond that.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frac = format!("{:06}", self.0 % SCALE);
        let trimmed = frac.trim_end_matches('0');
        let shown = if trimmed.len() < 2 { &frac[..2] } else { trimmed };
        write!(f, "{}.{}", self.whole(), shown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let price: FixedPoint = "45.5".parse().unwrap();
        assert_eq!(price.raw(), 45_500_000);
        assert_eq!(price.to_string(), "45.50");

        let mult: FixedPoint = "1.95".parse().unwrap();
        assert_eq!(mult.to_string(), "1.95");

        let whole: FixedPoint = "6".parse().unwrap();
        assert_eq!(whole, FixedPoint::from_whole(6));
        assert_eq!(whole.to_string(), "6.00");

        let fine: FixedPoint = "0.123456".parse().unwrap();
        assert_eq!(fine.to_string(), "0.123456");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<FixedPoint>().is_err());
        assert!("-1".parse::<FixedPoint>().is_err());
        assert!("1.2345678".parse::<FixedPoint>().is_err());
        assert!("1e3".parse::<FixedPoint>().is_err());
        assert!(".5".parse::<FixedPoint>().is_err());
    }

    #[test]
    fn test_apply_floor() {
        let mult: FixedPoint = "1.95".parse().unwrap();
        assert_eq!(mult.apply_floor(10), Some(19));
        assert_eq!(mult.apply_floor(1000), Some(1950));

        assert_eq!(FixedPoint::from_whole(6).apply_floor(100), Some(600));
        assert_eq!(FixedPoint::ZERO.apply_floor(100), Some(0));
        assert_eq!(FixedPoint::from_whole(2).apply_floor(u64::MAX), None);
    }

    #[test]
    fn test_serde_as_string() {
        #[derive(Serialize, Deserialize)]
        struct Row {
            price: FixedPoint,
        }

        let row: Row = toml::from_str("price = \"12.75\"").unwrap();
        assert_eq!(row.price.raw(), 12_750_000);
        let text = toml::to_string(&row).unwrap();
        assert!(text.contains("\"12.75\""));
    }
}
