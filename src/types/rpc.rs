//! Types of the `redemption_` RPC namespace.

use super::{Execution, WireDelegation};
use alloy::primitives::{Address, B256, Bytes};
use serde::{Deserialize, Serialize};

/// One delegation chain as carried by a [`RedeemDelegationRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DelegationChainPayload {
    /// Structured delegations, in the configured wire order.
    Delegations(Vec<WireDelegation>),
    /// An encoded chain, either canonical JSON or `abi.encode(Delegation[])`.
    Encoded(Bytes),
}

/// Request of `redemption_redeemDelegation`.
///
/// `delegation_chains`, `modes` and `executions` are index-aligned. The payment fields only
/// fill execution sets that are empty; when every set is non-empty they are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemDelegationRequest {
    /// Delegation chains to redeem.
    pub delegation_chains: Vec<DelegationChainPayload>,
    /// Redemption mode per chain, `single` or `batch`.
    pub modes: Vec<String>,
    /// Executions per chain.
    pub executions: Vec<Vec<Execution>>,
    /// Merchant receiving the payment.
    #[serde(default)]
    pub merchant_address: Option<Address>,
    /// Token the payment is made in.
    #[serde(default)]
    pub token_contract_address: Option<Address>,
    /// Payment amount in the token's smallest unit, as a decimal string.
    #[serde(default)]
    pub price: Option<String>,
    /// Caller-supplied marker that makes retries of the same request idempotent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// Response of `redemption_redeemDelegation`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemDelegationResponse {
    /// `0x`-prefixed transaction hash, empty on failure.
    pub transaction_hash: String,
    /// Whether the redemption was confirmed on-chain.
    pub success: bool,
    /// Error description, empty on success.
    pub error_message: String,
}

/// Response of `health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
}

/// Outcome of a single redemption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedemptionResult {
    /// Hash of the transaction that included the redemption.
    pub transaction_hash: Option<B256>,
    /// Whether the redemption was confirmed on-chain.
    pub success: bool,
    /// Error description, empty on success.
    pub error_message: String,
}

impl RedemptionResult {
    /// A confirmed redemption.
    pub const fn confirmed(transaction_hash: B256) -> Self {
        Self { transaction_hash: Some(transaction_hash), success: true, error_message: String::new() }
    }

    /// A failed redemption.
    pub fn failed(error_message: impl Into<String>) -> Self {
        Self { transaction_hash: None, success: false, error_message: error_message.into() }
    }
}

impl From<RedemptionResult> for RedeemDelegationResponse {
    fn from(result: RedemptionResult) -> Self {
        Self {
            transaction_hash: result.transaction_hash.map(|h| h.to_string()).unwrap_or_default(),
            success: result.success,
            error_message: result.error_message,
        }
    }
}
