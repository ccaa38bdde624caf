//! # Redeemer
//!
//! Library for redeeming signed delegation chains as ERC-4337 user operations.
//!
//! A request flows through [`codec`], [`validator`] and [`builder`] before a
//! [`redeemer::Redeemer`] turns the calldata into a transaction hash. [`service`] ties these
//! together and [`rpc`] exposes it over JSON-RPC.

#![recursion_limit = "256"]

pub mod builder;
pub mod cli;
pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod metrics;
pub mod nonce;
pub mod redeemer;
pub mod rpc;
pub mod serde;
pub mod service;
pub mod signers;
pub mod spawn;
pub mod submitter;
pub mod types;
pub mod validator;
