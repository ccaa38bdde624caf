//! ERC-4337 v0.7 user operations.

use alloy::{
    primitives::{Address, B256, Bytes, ChainId, FixedBytes, U256, bytes, keccak256},
    sol,
    sol_types::SolValue,
};
use serde::{Deserialize, Serialize};

/// Placeholder signature used while estimating gas.
///
/// Bundlers simulate validation with this in place of the real signature, so it has to be a
/// well-formed 65 byte ECDSA signature.
pub const DUMMY_SIGNATURE: Bytes = bytes!(
    "0xfffffffffffffffffffffffffffffff0000000000000000000000000000000007aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1c"
);

sol! {
    struct UserOperationPackedForHash {
        address sender;
        uint256 nonce;
        bytes32 hashInitCode;
        bytes32 hashCallData;
        bytes32 accountGasLimits;
        uint256 preVerificationGas;
        bytes32 gasFees;
        bytes32 hashPaymasterAndData;
    }

    struct UserOperationHashEncoded {
        bytes32 encodedHash;
        address entryPoint;
        uint256 chainId;
    }
}

/// An unpacked ERC-4337 v0.7 user operation, as bundlers accept it over JSON-RPC.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    /// The smart account sending the operation.
    pub sender: Address,
    /// Anti-replay nonce, as tracked by the entry point.
    pub nonce: U256,
    /// Account factory, for accounts that are not deployed yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<Address>,
    /// Calldata for the account factory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory_data: Option<Bytes>,
    /// Calldata the entry point passes to the account.
    pub call_data: Bytes,
    /// Gas limit of the account execution.
    pub call_gas_limit: U256,
    /// Gas limit of the validation phase.
    pub verification_gas_limit: U256,
    /// Gas paid to the bundler for overhead not tracked on-chain.
    pub pre_verification_gas: U256,
    /// Maximum fee per gas.
    pub max_fee_per_gas: U256,
    /// Maximum priority fee per gas.
    pub max_priority_fee_per_gas: U256,
    /// Sponsoring paymaster, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<Address>,
    /// Gas limit of the paymaster validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_verification_gas_limit: Option<U256>,
    /// Gas limit of the paymaster post-op call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_post_op_gas_limit: Option<U256>,
    /// Data for the paymaster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_data: Option<Bytes>,
    /// The account signature over [`UserOperation::hash`].
    pub signature: Bytes,
}

impl UserOperation {
    /// The packed `initCode` field: `factory ++ factoryData`.
    pub fn init_code(&self) -> Bytes {
        let Some(factory) = self.factory else { return Bytes::new() };
        let mut init_code = factory.to_vec();
        if let Some(data) = &self.factory_data {
            init_code.extend_from_slice(data);
        }
        init_code.into()
    }

    /// The packed `paymasterAndData` field.
    pub fn paymaster_and_data(&self) -> Bytes {
        let Some(paymaster) = self.paymaster else { return Bytes::new() };
        let verification: u128 =
            self.paymaster_verification_gas_limit.unwrap_or_default().saturating_to();
        let post_op: u128 = self.paymaster_post_op_gas_limit.unwrap_or_default().saturating_to();

        let mut data = paymaster.to_vec();
        data.extend_from_slice(&verification.to_be_bytes());
        data.extend_from_slice(&post_op.to_be_bytes());
        if let Some(paymaster_data) = &self.paymaster_data {
            data.extend_from_slice(paymaster_data);
        }
        data.into()
    }

    /// Computes the user operation hash the account signs and the entry point reports.
    ///
    /// The signature is not part of the hash.
    pub fn hash(&self, entry_point: Address, chain_id: ChainId) -> B256 {
        let packed = UserOperationPackedForHash {
            sender: self.sender,
            nonce: self.nonce,
            hashInitCode: keccak256(self.init_code()),
            hashCallData: keccak256(&self.call_data),
            accountGasLimits: pack_u128_pair(self.verification_gas_limit, self.call_gas_limit),
            preVerificationGas: self.pre_verification_gas,
            gasFees: pack_u128_pair(self.max_priority_fee_per_gas, self.max_fee_per_gas),
            hashPaymasterAndData: keccak256(self.paymaster_and_data()),
        };

        keccak256(
            UserOperationHashEncoded {
                encodedHash: keccak256(packed.abi_encode()),
                entryPoint: entry_point,
                chainId: U256::from(chain_id),
            }
            .abi_encode(),
        )
    }
}

/// Packs two values into a single word, each truncated to 128 bits.
fn pack_u128_pair(high: U256, low: U256) -> FixedBytes<32> {
    let mask = (U256::from(1u64) << 128) - U256::from(1u64);
    let combined: U256 = ((high & mask) << 128) | (low & mask);
    FixedBytes::from(combined.to_be_bytes::<32>())
}
