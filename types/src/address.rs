//! Account addresses.
//!
//! Addresses are compared after lowercase normalization everywhere in the
//! client, so normalization happens once at construction.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const ADDRESS_HEX_LEN: usize = 40;

/// A lowercase-normalized `0x`-prefixed 20-byte hex address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn parse(value: &str) -> Result<Self, Error> {
        let trimmed = value.trim();
        let hex = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| Error::InvalidAddress(value.to_string()))?;
        if hex.len() != ADDRESS_HEX_LEN || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidAddress(value.to_string()));
        }
        Ok(Self(format!("0x{}", hex.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form (`0x1234...abcd`) for logs and listings.
    pub fn short(&self) -> String {
        format!("{}...{}", &self.0[..6], &self.0[self.0.len() - 4..])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

/// Optional address where the server may send `null`, omit the field, or
/// send an empty string to mean "nobody".
pub mod serde_optional_address {
    use super::Address;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(address: &Option<Address>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match address {
            Some(address) => serializer.serialize_str(address.as_str()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Address>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => Address::parse(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIXED: &str = "0xAbCdEf0123456789aBcDeF0123456789ABCDEF01";

    #[test]
    fn test_parse_normalizes_case() {
        let address = Address::parse(MIXED).unwrap();
        assert_eq!(address.as_str(), "0xabcdef0123456789abcdef0123456789abcdef01");
        assert_eq!(address, Address::parse(&MIXED.to_lowercase()).unwrap());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Address::parse("").is_err());
        assert!(Address::parse("abcdef0123456789abcdef0123456789abcdef01").is_err());
        assert!(Address::parse("0x1234").is_err());
        assert!(Address::parse("0xzzcdef0123456789abcdef0123456789abcdef01").is_err());
    }

    #[test]
    fn test_short() {
        let address = Address::parse(MIXED).unwrap();
        assert_eq!(address.short(), "0xabcd...ef01");
    }

    #[test]
    fn test_deserialize_normalizes() {
        let address: Address = serde_json::from_str(&format!("\"{MIXED}\"")).unwrap();
        assert_eq!(address.as_str(), MIXED.to_lowercase());
        assert!(serde_json::from_str::<Address>("\"nope\"").is_err());
    }

    #[test]
    fn test_optional_address_accepts_empty_and_null() {
        #[derive(serde::Deserialize)]
        struct Holder {
            #[serde(default, with = "serde_optional_address")]
            winner: Option<Address>,
        }

        let holder: Holder = serde_json::from_str(r#"{"winner": ""}"#).unwrap();
        assert!(holder.winner.is_none());
        let holder: Holder = serde_json::from_str(r#"{"winner": null}"#).unwrap();
        assert!(holder.winner.is_none());
        let holder: Holder = serde_json::from_str("{}").unwrap();
        assert!(holder.winner.is_none());
        let holder: Holder = serde_json::from_str(&format!(r#"{{"winner": "{MIXED}"}}"#)).unwrap();
        assert_eq!(holder.winner, Some(Address::parse(MIXED).unwrap()));
    }
}
