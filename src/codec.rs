//! Wire encoding of delegation chains.
//!
//! The primary format is JSON: an array of delegation objects, or a single object for one-link
//! chains. Numeric fields travel as decimal strings. Payloads that are not JSON are decoded as
//! `abi.encode(Delegation[])`.

use crate::{
    error::DelegationError,
    types::{Caveat, ChainOrder, Delegation, DelegationChain},
};
use alloy::{
    primitives::{Address, B256, Bytes, U256},
    sol_types::SolValue,
};
use serde::{Deserialize, Serialize};

/// A caveat as it travels on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireCaveat {
    /// The enforcer contract.
    #[serde(default, deserialize_with = "crate::serde::empty_as_default::deserialize")]
    pub enforcer: Address,
    /// Encoded terms.
    #[serde(default, deserialize_with = "crate::serde::empty_as_default::deserialize")]
    pub terms: Bytes,
    /// Redeemer supplied arguments.
    #[serde(default, deserialize_with = "crate::serde::empty_as_default::deserialize")]
    pub args: Bytes,
}

/// A delegation as it travels on the wire.
///
/// Field order is the canonical key order of the JSON encoding. Absent or empty fields decode to
/// zero values and are rejected by validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireDelegation {
    /// The address receiving authority.
    #[serde(default, deserialize_with = "crate::serde::empty_as_default::deserialize")]
    pub delegate: Address,
    /// The address granting authority.
    #[serde(default, deserialize_with = "crate::serde::empty_as_default::deserialize")]
    pub delegator: Address,
    /// Parent delegation hash, or the root authority.
    #[serde(default, deserialize_with = "crate::serde::empty_as_default::deserialize")]
    pub authority: B256,
    /// Ordered caveats.
    #[serde(default)]
    pub caveats: Vec<WireCaveat>,
    /// Uniqueness nonce, as a decimal string.
    #[serde(default, with = "crate::serde::u256_decimal")]
    pub salt: U256,
    /// The delegator's signature.
    #[serde(default, deserialize_with = "crate::serde::empty_as_default::deserialize")]
    pub signature: Bytes,
}

impl From<&Delegation> for WireDelegation {
    fn from(delegation: &Delegation) -> Self {
        Self {
            delegate: delegation.delegate,
            delegator: delegation.delegator,
            authority: delegation.authority,
            caveats: delegation
                .caveats
                .iter()
                .map(|caveat| WireCaveat {
                    enforcer: caveat.enforcer,
                    terms: caveat.terms.clone(),
                    args: caveat.args.clone(),
                })
                .collect(),
            salt: delegation.salt,
            signature: delegation.signature.clone(),
        }
    }
}

impl From<WireDelegation> for Delegation {
    fn from(wire: WireDelegation) -> Self {
        Self {
            delegate: wire.delegate,
            delegator: wire.delegator,
            authority: wire.authority,
            caveats: wire
                .caveats
                .into_iter()
                .map(|caveat| Caveat {
                    enforcer: caveat.enforcer,
                    terms: caveat.terms,
                    args: caveat.args,
                })
                .collect(),
            salt: wire.salt,
            signature: wire.signature,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WirePayload {
    Chain(Vec<WireDelegation>),
    Single(WireDelegation),
}

impl WirePayload {
    fn into_delegations(self) -> Vec<WireDelegation> {
        match self {
            Self::Chain(delegations) => delegations,
            Self::Single(delegation) => vec![delegation],
        }
    }
}

/// Decodes and encodes delegation chains.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelegationCodec {
    order: ChainOrder,
}

impl DelegationCodec {
    /// Creates a codec for chains travelling in `order`.
    pub const fn new(order: ChainOrder) -> Self {
        Self { order }
    }

    /// The wire order of this codec.
    pub const fn order(&self) -> ChainOrder {
        self.order
    }

    /// Decodes a chain from JSON, falling back to `abi.encode(Delegation[])`.
    pub fn decode(&self, bytes: &[u8]) -> Result<DelegationChain, DelegationError> {
        let json_err = match serde_json::from_slice::<WirePayload>(bytes) {
            Ok(payload) => return Ok(self.chain_from_wire(payload.into_delegations())),
            Err(err) => err,
        };

        match <Vec<Delegation>>::abi_decode(bytes) {
            Ok(delegations) => Ok(DelegationChain::from_wire_order(delegations, self.order)),
            Err(abi_err) => Err(DelegationError::MalformedPayload(format!(
                "not a JSON chain ({json_err}) nor an ABI chain ({abi_err})"
            ))),
        }
    }

    /// Builds a chain from structured wire delegations.
    pub fn chain_from_wire(&self, delegations: Vec<WireDelegation>) -> DelegationChain {
        DelegationChain::from_wire_order(
            delegations.into_iter().map(Delegation::from).collect(),
            self.order,
        )
    }

    /// Encodes `chain` as canonical JSON.
    pub fn encode(&self, chain: &DelegationChain) -> Result<Bytes, serde_json::Error> {
        let wire =
            chain.to_wire_order(self.order).iter().map(WireDelegation::from).collect::<Vec<_>>();
        serde_json::to_vec(&wire).map(Into::into)
    }

    /// Encodes `chain` as `abi.encode(Delegation[])`.
    pub fn encode_abi(&self, chain: &DelegationChain) -> Bytes {
        chain.to_wire_order(self.order).abi_encode().into()
    }
}
