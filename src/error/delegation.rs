use super::ErrorCategory;
use alloy::primitives::{Address, B256};
use thiserror::Error;

/// Errors decoding or validating a delegation chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DelegationError {
    /// The payload is neither a JSON nor an ABI encoded chain, or carries unreadable terms.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    /// The chain has no delegations.
    #[error("delegation chain is empty")]
    EmptyChain,
    /// A required field of a delegation is empty.
    #[error("delegation {index} is missing {field}")]
    MissingField {
        /// Root-first index of the delegation.
        index: usize,
        /// Name of the empty field.
        field: &'static str,
    },
    /// A delegation's authority does not match its parent.
    #[error("delegation {index} has authority {got}, expected {expected}")]
    BrokenChain {
        /// Root-first index of the delegation.
        index: usize,
        /// The parent hash, or the root authority.
        expected: B256,
        /// The authority carried by the delegation.
        got: B256,
    },
    /// A delegation expired before `now`.
    #[error("delegation {index} expired at {expiry}, now {now}")]
    Expired {
        /// Root-first index of the delegation.
        index: usize,
        /// Expiry timestamp in seconds.
        expiry: u64,
        /// Validation timestamp in seconds.
        now: u64,
    },
    /// A signature does not recover to the delegator.
    #[error(
        "delegation {index} signature recovers to {}, expected {expected}",
        .recovered.map(|a| a.to_string()).unwrap_or_else(|| "nothing".to_string())
    )]
    InvalidSignature {
        /// Root-first index of the delegation.
        index: usize,
        /// The delegator.
        expected: Address,
        /// The recovered signer, if the signature was well-formed.
        recovered: Option<Address>,
    },
}

impl DelegationError {
    /// The category this error is reported under.
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::MalformedPayload(_) => ErrorCategory::MalformedPayload,
            Self::EmptyChain | Self::MissingField { .. } => ErrorCategory::MissingField,
            Self::BrokenChain { .. } => ErrorCategory::BrokenChain,
            Self::Expired { .. } => ErrorCategory::Expired,
            Self::InvalidSignature { .. } => ErrorCategory::InvalidSignature,
        }
    }
}
