//! Bundler, paymaster and node endpoints used to submit user operations.

use crate::types::{UserOperation, contracts::IEntryPoint};
use alloy::{
    primitives::{Address, B256, Bytes, U256, aliases::U192},
    providers::{DynProvider, Provider},
    rpc::client::{ClientBuilder, RpcClient},
    transports::{RpcError, TransportErrorKind},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{fmt::Debug, time::Duration};
use thiserror::Error;
use url::Url;

/// Errors talking to a bundler, paymaster or node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    /// The request did not reach the endpoint, or the connection broke.
    #[error("transport error: {0}")]
    Transport(String),
    /// The endpoint did not answer in time.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// The endpoint answered with a JSON-RPC error.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message.
        message: String,
    },
    /// The endpoint answered with something we could not read.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl EndpointError {
    /// Whether repeating the request may succeed.
    ///
    /// JSON-RPC error responses are final: the endpoint saw the request and rejected it.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }
}

impl From<RpcError<TransportErrorKind>> for EndpointError {
    fn from(err: RpcError<TransportErrorKind>) -> Self {
        match err {
            RpcError::ErrorResp(payload) => {
                Self::Rpc { code: payload.code, message: payload.message.to_string() }
            }
            RpcError::DeserError { err, text } => Self::InvalidResponse(format!("{err}: {text}")),
            RpcError::NullResp => Self::InvalidResponse("null response".to_string()),
            err => Self::Transport(err.to_string()),
        }
    }
}

impl From<alloy::contract::Error> for EndpointError {
    fn from(err: alloy::contract::Error) -> Self {
        match err {
            alloy::contract::Error::TransportError(err) => err.into(),
            err => Self::InvalidResponse(err.to_string()),
        }
    }
}

/// Gas limits returned by `eth_estimateUserOperationGas`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasEstimate {
    /// Gas paid to the bundler for overhead not tracked on-chain.
    pub pre_verification_gas: U256,
    /// Gas limit of the validation phase.
    pub verification_gas_limit: U256,
    /// Gas limit of the account execution.
    pub call_gas_limit: U256,
    /// Gas limit of the paymaster validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_verification_gas_limit: Option<U256>,
    /// Gas limit of the paymaster post-op call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_post_op_gas_limit: Option<U256>,
}

impl GasEstimate {
    /// Writes the estimated limits into `op`.
    pub fn apply(&self, op: &mut UserOperation) {
        op.pre_verification_gas = self.pre_verification_gas;
        op.verification_gas_limit = self.verification_gas_limit;
        op.call_gas_limit = self.call_gas_limit;
        if self.paymaster_verification_gas_limit.is_some() {
            op.paymaster_verification_gas_limit = self.paymaster_verification_gas_limit;
        }
        if self.paymaster_post_op_gas_limit.is_some() {
            op.paymaster_post_op_gas_limit = self.paymaster_post_op_gas_limit;
        }
    }
}

/// Paymaster fields returned by `pm_sponsorUserOperation`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sponsorship {
    /// The sponsoring paymaster.
    pub paymaster: Address,
    /// Data for the paymaster, usually carrying its signature.
    #[serde(default)]
    pub paymaster_data: Bytes,
    /// Gas limit of the paymaster validation.
    #[serde(default)]
    pub paymaster_verification_gas_limit: U256,
    /// Gas limit of the paymaster post-op call.
    #[serde(default)]
    pub paymaster_post_op_gas_limit: U256,
    /// Gas limits the paymaster signed over, if it re-estimated them.
    #[serde(flatten)]
    pub gas: Option<GasEstimate>,
}

impl Sponsorship {
    /// Writes the paymaster fields into `op`.
    pub fn apply(&self, op: &mut UserOperation) {
        if let Some(gas) = &self.gas {
            gas.apply(op);
        }
        op.paymaster = Some(self.paymaster);
        op.paymaster_data = Some(self.paymaster_data.clone());
        op.paymaster_verification_gas_limit = Some(self.paymaster_verification_gas_limit);
        op.paymaster_post_op_gas_limit = Some(self.paymaster_post_op_gas_limit);
    }
}

/// Transaction details of a [`UserOperationReceipt`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptTransaction {
    /// Hash of the including transaction.
    pub transaction_hash: B256,
}

/// Receipt returned by `eth_getUserOperationReceipt`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    /// The user operation hash.
    pub user_op_hash: B256,
    /// Whether the account execution succeeded.
    pub success: bool,
    /// Revert reason, if execution failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// The including transaction.
    pub receipt: ReceiptTransaction,
}

impl UserOperationReceipt {
    /// Hash of the including transaction.
    pub const fn transaction_hash(&self) -> B256 {
        self.receipt.transaction_hash
    }
}

/// Fees for a user operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GasFees {
    /// Maximum fee per gas.
    pub max_fee_per_gas: u128,
    /// Maximum priority fee per gas.
    pub max_priority_fee_per_gas: u128,
}

/// An ERC-4337 bundler.
#[async_trait::async_trait]
pub trait Bundler: Debug + Send + Sync {
    /// Estimates gas limits of `op` with `eth_estimateUserOperationGas`.
    async fn estimate_user_operation_gas(
        &self,
        op: &UserOperation,
        entry_point: Address,
    ) -> Result<GasEstimate, EndpointError>;

    /// Submits `op` with `eth_sendUserOperation`, returning its hash.
    async fn send_user_operation(
        &self,
        op: &UserOperation,
        entry_point: Address,
    ) -> Result<B256, EndpointError>;

    /// Fetches the receipt of `user_op_hash`, if it was included.
    async fn get_user_operation_receipt(
        &self,
        user_op_hash: B256,
    ) -> Result<Option<UserOperationReceipt>, EndpointError>;
}

/// A paymaster sponsoring gas of user operations.
#[async_trait::async_trait]
pub trait Paymaster: Debug + Send + Sync {
    /// Requests sponsorship of `op` with `pm_sponsorUserOperation`.
    async fn sponsor_user_operation(
        &self,
        op: &UserOperation,
        entry_point: Address,
    ) -> Result<Sponsorship, EndpointError>;
}

/// On-chain state needed to build user operations.
#[async_trait::async_trait]
pub trait ChainState: Debug + Send + Sync {
    /// Returns the next entry point nonce of `sender` under nonce key zero.
    async fn entry_point_nonce(
        &self,
        entry_point: Address,
        sender: Address,
    ) -> Result<U256, EndpointError>;

    /// Returns current EIP-1559 fees.
    async fn gas_fees(&self) -> Result<GasFees, EndpointError>;
}

#[async_trait::async_trait]
impl ChainState for DynProvider {
    async fn entry_point_nonce(
        &self,
        entry_point: Address,
        sender: Address,
    ) -> Result<U256, EndpointError> {
        Ok(IEntryPoint::new(entry_point, self.clone()).getNonce(sender, U192::ZERO).call().await?)
    }

    async fn gas_fees(&self) -> Result<GasFees, EndpointError> {
        let estimate = self.estimate_eip1559_fees().await?;
        Ok(GasFees {
            max_fee_per_gas: estimate.max_fee_per_gas,
            max_priority_fee_per_gas: estimate.max_priority_fee_per_gas,
        })
    }
}

/// JSON-RPC client with a per-request timeout.
#[derive(Debug, Clone)]
struct TimeoutClient {
    client: RpcClient,
    timeout: Duration,
}

impl TimeoutClient {
    fn new(url: Url, timeout: Duration) -> Self {
        Self { client: ClientBuilder::default().http(url), timeout }
    }

    async fn request<P, R>(&self, method: &'static str, params: P) -> Result<R, EndpointError>
    where
        P: Serialize + Clone + Debug + Send + Sync + Unpin + 'static,
        R: DeserializeOwned + Debug + Send + Sync + Unpin + 'static,
    {
        tokio::time::timeout(self.timeout, self.client.request::<P, R>(method, params))
            .await
            .map_err(|_| EndpointError::Timeout(self.timeout))?
            .map_err(Into::into)
    }
}

/// A [`Bundler`] reached over HTTP JSON-RPC.
#[derive(Debug, Clone)]
pub struct HttpBundler {
    client: TimeoutClient,
}

impl HttpBundler {
    /// Creates a bundler client for `url`.
    pub fn new(url: Url, timeout: Duration) -> Self {
        Self { client: TimeoutClient::new(url, timeout) }
    }
}

#[async_trait::async_trait]
impl Bundler for HttpBundler {
    async fn estimate_user_operation_gas(
        &self,
        op: &UserOperation,
        entry_point: Address,
    ) -> Result<GasEstimate, EndpointError> {
        self.client.request("eth_estimateUserOperationGas", (op.clone(), entry_point)).await
    }

    async fn send_user_operation(
        &self,
        op: &UserOperation,
        entry_point: Address,
    ) -> Result<B256, EndpointError> {
        self.client.request("eth_sendUserOperation", (op.clone(), entry_point)).await
    }

    async fn get_user_operation_receipt(
        &self,
        user_op_hash: B256,
    ) -> Result<Option<UserOperationReceipt>, EndpointError> {
        self.client.request("eth_getUserOperationReceipt", (user_op_hash,)).await
    }
}

/// A [`Paymaster`] reached over HTTP JSON-RPC.
#[derive(Debug, Clone)]
pub struct HttpPaymaster {
    client: TimeoutClient,
}

impl HttpPaymaster {
    /// Creates a paymaster client for `url`.
    pub fn new(url: Url, timeout: Duration) -> Self {
        Self { client: TimeoutClient::new(url, timeout) }
    }
}

#[async_trait::async_trait]
impl Paymaster for HttpPaymaster {
    async fn sponsor_user_operation(
        &self,
        op: &UserOperation,
        entry_point: Address,
    ) -> Result<Sponsorship, EndpointError> {
        self.client.request("pm_sponsorUserOperation", (op.clone(), entry_point)).await
    }
}
