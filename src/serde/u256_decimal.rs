//! Helpers for (de)serializing [`U256`] as a decimal string.
//!
//! JSON numbers lose precision above 2^53, so amounts and salts travel as strings. Hex strings
//! and small JSON numbers are accepted on input.

use alloy::primitives::U256;
use serde::{Deserialize, Deserializer, Serializer, de::Error};
use std::str::FromStr;

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(u64),
}

/// Serializes [`U256`] as a decimal string.
pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_string())
}

/// Deserializes a [`U256`] from a decimal string, a `0x` hex string or a JSON number.
pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) if s.trim().is_empty() => Ok(U256::ZERO),
        StringOrNumber::String(s) => U256::from_str(s.trim()).map_err(D::Error::custom),
        StringOrNumber::Number(n) => Ok(U256::from(n)),
    }
}
