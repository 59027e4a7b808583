//! Token quantities.
//!
//! Both tokens (stable and game) use 18 decimals on chain. Amounts are held
//! in base units everywhere; human strings are only parsed at the input edge
//! and produced by `Display`.

use crate::Error;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Decimal places of both on-chain tokens.
pub const TOKEN_DECIMALS: u32 = 18;

const UNIT: u128 = 10u128.pow(TOKEN_DECIMALS);

/// An amount of tokens, in the chain's smallest unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(u128);

impl TokenAmount {
    pub const ZERO: Self = Self(0);

    pub const fn from_base_units(units: u128) -> Self {
        Self(units)
    }

    pub const fn base_units(self) -> u128 {
        self.0
    }

    /// Whole tokens, scaled to base units.
    pub fn from_whole(tokens: u64) -> Self {
        Self(u128::from(tokens) * UNIT)
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Parse a human-readable decimal string ("5", "0.25", "12.") into base
    /// units without going through floating point.
    pub fn parse_units(input: &str) -> Result<Self, Error> {
        let trimmed = input.trim();
        let invalid = || Error::InvalidAmount(input.to_string());
        if trimmed.is_empty() {
            return Err(invalid());
        }

        let (whole, frac) = match trimmed.split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (trimmed, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }
        if frac.len() > TOKEN_DECIMALS as usize {
            return Err(invalid());
        }

        let whole_units = if whole.is_empty() {
            0
        } else {
            whole.parse::<u128>().map_err(|_| Error::AmountOverflow)?
        };
        let frac_units = if frac.is_empty() {
            0
        } else {
            let scale = 10u128.pow(TOKEN_DECIMALS - frac.len() as u32);
            frac.parse::<u128>().map_err(|_| invalid())? * scale
        };

        whole_units
            .checked_mul(UNIT)
            .and_then(|units| units.checked_add(frac_units))
            .map(Self)
            .ok_or(Error::AmountOverflow)
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / UNIT;
        let frac = self.0 % UNIT;
        if frac == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{frac:0width$}", width = TOKEN_DECIMALS as usize);
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl Serialize for TokenAmount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

struct TokenAmountVisitor;

impl<'de> Visitor<'de> for TokenAmountVisitor {
    type Value = TokenAmount;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a non-negative integer amount of base units")
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        Ok(TokenAmount(u128::from(value)))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        u128::try_from(value)
            .map(TokenAmount)
            .map_err(|_| E::custom("negative amount"))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        value
            .trim()
            .parse::<u128>()
            .map(TokenAmount)
            .map_err(|_| E::custom(format!("invalid base unit amount: {value}")))
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(TokenAmountVisitor)
    }
}
