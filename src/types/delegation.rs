//! Delegation primitives.
//!
//! A [`Delegation`] grants authority from `delegator` to `delegate`. Delegations are linked
//! into a [`DelegationChain`] through their `authority` field, which holds the hash of the
//! parent delegation or [`ROOT_AUTHORITY`] for the root grant.

use alloy::{
    dyn_abi::Eip712Domain,
    primitives::{B256, b256},
    sol,
    sol_types::SolStruct,
};
use serde::{Deserialize, Serialize};

/// Authority sentinel carried by the first delegation of a chain.
pub const ROOT_AUTHORITY: B256 =
    b256!("0xffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff");

sol! {
    /// A policy restriction attached to a [`Delegation`].
    #[derive(Debug, Default, PartialEq, Eq)]
    struct Caveat {
        /// The enforcer contract checking this caveat.
        address enforcer;
        /// Encoded terms, interpreted by the enforcer.
        bytes terms;
        /// Arguments supplied by the redeemer.
        ///
        /// Excluded from the delegation hash.
        bytes args;
    }

    /// A signed grant of authority, laid out as the delegation manager expects it.
    #[derive(Debug, Default, PartialEq, Eq)]
    struct Delegation {
        /// The address receiving authority.
        address delegate;
        /// The address granting authority.
        address delegator;
        /// Hash of the parent delegation, or [`ROOT_AUTHORITY`].
        bytes32 authority;
        /// Ordered policy restrictions.
        Caveat[] caveats;
        /// Nonce for uniqueness.
        uint256 salt;
        /// The delegator's signature over the EIP-712 signing hash.
        ///
        /// Excluded from the delegation hash.
        bytes signature;
    }
}

mod eip712 {
    use alloy::sol;

    sol! {
        struct Caveat {
            address enforcer;
            bytes terms;
        }

        struct Delegation {
            address delegate;
            address delegator;
            bytes32 authority;
            Caveat[] caveats;
            uint256 salt;
        }
    }
}

impl Delegation {
    /// Get the EIP-712 encoding of the [`Delegation`].
    ///
    /// Drops the signature and caveat arguments.
    pub fn as_eip712(&self) -> eip712::Delegation {
        eip712::Delegation {
            delegate: self.delegate,
            delegator: self.delegator,
            authority: self.authority,
            caveats: self
                .caveats
                .iter()
                .map(|caveat| eip712::Caveat {
                    enforcer: caveat.enforcer,
                    terms: caveat.terms.clone(),
                })
                .collect(),
            salt: self.salt,
        }
    }

    /// The delegation hash, used as `authority` by child delegations.
    pub fn hash(&self) -> B256 {
        self.as_eip712().eip712_hash_struct()
    }

    /// The digest the delegator signs under the given delegation manager domain.
    pub fn signing_hash(&self, domain: &Eip712Domain) -> B256 {
        self.as_eip712().eip712_signing_hash(domain)
    }

    /// Whether this delegation is a root grant.
    pub fn is_root(&self) -> bool {
        self.authority == ROOT_AUTHORITY
    }
}

/// Order in which delegations of a chain travel on the wire.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ChainOrder {
    /// The root grant comes first, the redeemer's delegation last.
    #[default]
    RootFirst,
    /// The redeemer's delegation comes first, the root grant last.
    LeafFirst,
}

/// An ordered sequence of delegations from the root grantor to the redeemer.
///
/// Delegations are always held root-first. Use [`DelegationChain::from_wire_order`] to build a
/// chain from delegations in another order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelegationChain(Vec<Delegation>);

impl DelegationChain {
    /// Creates a chain from root-first delegations.
    pub const fn new(delegations: Vec<Delegation>) -> Self {
        Self(delegations)
    }

    /// Creates a chain from delegations in the given wire order.
    pub fn from_wire_order(mut delegations: Vec<Delegation>, order: ChainOrder) -> Self {
        if order == ChainOrder::LeafFirst {
            delegations.reverse();
        }
        Self(delegations)
    }

    /// Returns the delegations in the given wire order.
    pub fn to_wire_order(&self, order: ChainOrder) -> Vec<Delegation> {
        match order {
            ChainOrder::RootFirst => self.0.clone(),
            ChainOrder::LeafFirst => self.0.iter().rev().cloned().collect(),
        }
    }

    /// Root-first view of the delegations.
    pub fn delegations(&self) -> &[Delegation] {
        &self.0
    }

    /// Number of delegations in the chain.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the chain has no delegations.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The root grant, if any.
    pub fn root(&self) -> Option<&Delegation> {
        self.0.first()
    }

    /// The delegation held by the redeemer, if any.
    pub fn leaf(&self) -> Option<&Delegation> {
        self.0.last()
    }
}

impl From<DelegationChain> for Vec<Delegation> {
    fn from(chain: DelegationChain) -> Self {
        chain.0
    }
}
