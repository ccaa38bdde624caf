//! Serde helpers.

pub mod duration;
pub mod duration_millis;
pub mod empty_as_default;
pub mod u256_decimal;
