//! Deserializes missing, `null` or empty string values as `T::default()`.
//!
//! Wallets sometimes send `""` for absent addresses or signatures. Those should surface as
//! missing fields during validation, not as malformed payloads.

use serde::{Deserialize, Deserializer, de::Error};
use std::{fmt::Display, str::FromStr};

/// Deserializes `T` from its string form, mapping `null` and `""` to `T::default()`.
pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + FromStr<Err: Display>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(s) if !s.trim().is_empty() => T::from_str(s.trim()).map_err(D::Error::custom),
        _ => Ok(T::default()),
    }
}
