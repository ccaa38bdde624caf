//! Executions performed under redeemed authority, and their ERC-7579 encoding.

use super::contracts::{self, IERC20};
use crate::error::BuildError;
use alloy::{
    primitives::{Address, B256, Bytes, U256, b256},
    sol_types::{SolCall, SolValue},
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// ERC-7579 mode code for a single call with default (reverting) execution.
pub const SINGLE_DEFAULT_MODE: B256 =
    b256!("0x0000000000000000000000000000000000000000000000000000000000000000");

/// ERC-7579 mode code for a batch call with default (reverting) execution.
pub const BATCH_DEFAULT_MODE: B256 =
    b256!("0x0100000000000000000000000000000000000000000000000000000000000000");

/// The action to perform once authority is established.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    /// The call target.
    pub target: Address,
    /// Amount of native value to send to the target.
    #[serde(default, with = "crate::serde::u256_decimal")]
    pub value: U256,
    /// The calldata bytes.
    #[serde(default)]
    pub call_data: Bytes,
}

impl Execution {
    /// An ERC-20 `transfer(to, amount)` on `token`.
    pub fn erc20_transfer(token: Address, to: Address, amount: U256) -> Self {
        Self {
            target: token,
            value: U256::ZERO,
            call_data: IERC20::transferCall { to, amount }.abi_encode().into(),
        }
    }

    /// A native value transfer of `amount` to `to`.
    pub fn native_transfer(to: Address, amount: U256) -> Self {
        Self { target: to, value: amount, call_data: Bytes::new() }
    }
}

impl From<&Execution> for contracts::Execution {
    fn from(execution: &Execution) -> Self {
        Self {
            target: execution.target,
            value: execution.value,
            callData: execution.call_data.clone(),
        }
    }
}

/// Redemption semantics for one delegation chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Exactly one execution, encoded as `abi.encodePacked(target, value, callData)`.
    Single,
    /// One or more executions, encoded as `abi.encode(Execution[])`.
    Batch,
}

impl Mode {
    /// The ERC-7579 mode code.
    pub const fn code(&self) -> B256 {
        match self {
            Self::Single => SINGLE_DEFAULT_MODE,
            Self::Batch => BATCH_DEFAULT_MODE,
        }
    }

    /// Encodes `executions` as ERC-7579 execution calldata for this mode.
    pub fn encode_executions(&self, executions: &[Execution]) -> Bytes {
        match self {
            Self::Single => executions
                .first()
                .map(|e| (e.target, e.value, e.call_data.clone()).abi_encode_packed())
                .unwrap_or_default()
                .into(),
            Self::Batch => executions
                .iter()
                .map(contracts::Execution::from)
                .collect::<Vec<_>>()
                .abi_encode()
                .into(),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    /// Accepts `single`, `batch`, or a raw 32-byte ERC-7579 mode code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single" => return Ok(Self::Single),
            "batch" => return Ok(Self::Batch),
            _ => {}
        }

        let code = B256::from_str(s).map_err(|_| format!("unknown mode {s}"))?;
        if code == SINGLE_DEFAULT_MODE {
            Ok(Self::Single)
        } else if code == BATCH_DEFAULT_MODE {
            Ok(Self::Batch)
        } else {
            Err(format!("unsupported mode code {code}"))
        }
    }
}

/// The payment a redemption settles when the caller leaves an execution set empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentTerms {
    /// The merchant receiving the payment.
    pub merchant: Address,
    /// The token contract, or the zero address for the native token.
    pub token: Address,
    /// Amount in the token's smallest unit.
    pub amount: U256,
}

impl PaymentTerms {
    /// Parses payment terms from the request fields.
    ///
    /// Returns `Ok(None)` unless all three fields are present.
    pub fn from_request(
        merchant: Option<Address>,
        token: Option<Address>,
        price: Option<&str>,
    ) -> Result<Option<Self>, BuildError> {
        let (Some(merchant), Some(token), Some(price)) = (merchant, token, price) else {
            return Ok(None);
        };
        let price = price.trim();
        if price.is_empty() || !price.bytes().all(|b| b.is_ascii_digit()) {
            return Err(BuildError::InvalidPrice(price.to_string()));
        }
        let amount = U256::from_str_radix(price, 10)
            .map_err(|_| BuildError::InvalidPrice(price.to_string()))?;

        Ok(Some(Self { merchant, token, amount }))
    }

    /// The execution that settles this payment.
    pub fn execution(&self) -> Execution {
        if self.token.is_zero() {
            Execution::native_transfer(self.merchant, self.amount)
        } else {
            Execution::erc20_transfer(self.token, self.merchant, self.amount)
        }
    }
}
