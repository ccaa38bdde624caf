//! Shared primitive types.
pub mod contracts;

mod delegation;
pub use delegation::*;

mod execution;
pub use execution::*;

pub mod rpc;

mod user_op;
pub use user_op::*;

pub use crate::codec::{WireCaveat, WireDelegation};
