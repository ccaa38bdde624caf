//! Delegation chain validation.

use crate::{
    error::DelegationError,
    types::{Delegation, DelegationChain, ROOT_AUTHORITY},
};
use alloy::{
    dyn_abi::Eip712Domain,
    primitives::{Address, Signature},
};

/// Length of timestamp enforcer terms: `uint128 after || uint128 before`.
const TIMESTAMP_TERMS_LEN: usize = 32;

/// Validates delegation chains against a delegation manager domain.
///
/// Validation is a pure function of the chain and the supplied timestamp.
#[derive(Debug, Clone)]
pub struct DelegationValidator {
    domain: Eip712Domain,
    timestamp_enforcer: Address,
}

impl DelegationValidator {
    /// Creates a validator.
    ///
    /// Caveats enforced by `timestamp_enforcer` are read as expiries.
    pub const fn new(domain: Eip712Domain, timestamp_enforcer: Address) -> Self {
        Self { domain, timestamp_enforcer }
    }

    /// The EIP-712 domain delegations are signed under.
    pub const fn domain(&self) -> &Eip712Domain {
        &self.domain
    }

    /// Validates `chain` at unix timestamp `now`.
    ///
    /// Each check runs over the whole chain before the next one starts, and the first violation
    /// is returned:
    ///
    /// 1. the chain is not empty
    /// 2. delegate, delegator and signature are set
    /// 3. every authority links to the parent hash, or is the root authority for the first link
    /// 4. no delegation expired before `now`
    /// 5. every signature recovers to its delegator
    pub fn validate(&self, chain: &DelegationChain, now: u64) -> Result<(), DelegationError> {
        if chain.is_empty() {
            return Err(DelegationError::EmptyChain);
        }

        let delegations = chain.delegations();
        for (index, delegation) in delegations.iter().enumerate() {
            check_fields(index, delegation)?;
        }

        let mut expected = ROOT_AUTHORITY;
        for (index, delegation) in delegations.iter().enumerate() {
            if delegation.authority != expected {
                return Err(DelegationError::BrokenChain {
                    index,
                    expected,
                    got: delegation.authority,
                });
            }
            expected = delegation.hash();
        }

        for (index, delegation) in delegations.iter().enumerate() {
            if let Some(expiry) = self.expiry(index, delegation)?
                && expiry > 0
                && expiry < now
            {
                return Err(DelegationError::Expired { index, expiry, now });
            }
        }

        for (index, delegation) in delegations.iter().enumerate() {
            self.check_signature(index, delegation)?;
        }

        Ok(())
    }

    /// Returns the earliest expiry among the delegation's timestamp caveats.
    ///
    /// An expiry of zero means no upper bound.
    fn expiry(&self, index: usize, delegation: &Delegation) -> Result<Option<u64>, DelegationError> {
        let mut earliest: Option<u64> = None;
        for caveat in delegation.caveats.iter().filter(|c| c.enforcer == self.timestamp_enforcer) {
            if caveat.terms.len() != TIMESTAMP_TERMS_LEN {
                return Err(DelegationError::MalformedPayload(format!(
                    "delegation {index} has {} bytes of timestamp terms, expected {TIMESTAMP_TERMS_LEN}",
                    caveat.terms.len()
                )));
            }
            let mut before = [0u8; 16];
            before.copy_from_slice(&caveat.terms[16..]);
            let before = u64::try_from(u128::from_be_bytes(before)).unwrap_or(u64::MAX);
            if before == 0 {
                continue;
            }
            earliest = Some(earliest.map_or(before, |e| e.min(before)));
        }
        Ok(earliest)
    }

    fn check_signature(&self, index: usize, delegation: &Delegation) -> Result<(), DelegationError> {
        let recovered = Signature::try_from(delegation.signature.as_ref())
            .ok()
            .and_then(|signature| {
                signature.recover_address_from_prehash(&delegation.signing_hash(&self.domain)).ok()
            });

        if recovered != Some(delegation.delegator) {
            return Err(DelegationError::InvalidSignature {
                index,
                expected: delegation.delegator,
                recovered,
            });
        }
        Ok(())
    }
}

/// Checks that delegate, delegator and signature are set.
fn check_fields(index: usize, delegation: &Delegation) -> Result<(), DelegationError> {
    let missing = if delegation.delegator.is_zero() {
        "delegator"
    } else if delegation.delegate.is_zero() {
        "delegate"
    } else if delegation.signature.is_empty() {
        "signature"
    } else {
        return Ok(());
    };
    Err(DelegationError::MissingField { index, field: missing })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codec::DelegationCodec,
        types::{Caveat, ChainOrder},
    };
    use alloy::{
        sol_types::eip712_domain,
        primitives::{B256, Bytes, U256, address},
        signers::{SignerSync, local::PrivateKeySigner},
    };

    const ENFORCER: Address = address!("0x1046bb45C8d673d4ea75321280DB34899413c069");
    const NOW: u64 = 1_700_000_000;

    fn domain() -> Eip712Domain {
        eip712_domain! {
            name: "DelegationManager",
            version: "1",
            chain_id: 1,
            verifying_contract: address!("0xdb9B1e94B5b69Df7e401DDbedE43491141047dB3"),
        }
    }

    fn validator() -> DelegationValidator {
        DelegationValidator::new(domain(), ENFORCER)
    }

    fn timestamp_terms(after: u128, before: u128) -> Bytes {
        let mut terms = after.to_be_bytes().to_vec();
        terms.extend_from_slice(&before.to_be_bytes());
        terms.into()
    }

    fn signed(
        signer: &PrivateKeySigner,
        delegate: Address,
        authority: B256,
        caveats: Vec<Caveat>,
    ) -> Delegation {
        let mut delegation = Delegation {
            delegate,
            delegator: signer.address(),
            authority,
            caveats,
            salt: U256::from(1),
            signature: Bytes::new(),
        };
        delegation.signature =
            signer.sign_hash_sync(&delegation.signing_hash(&domain())).unwrap().as_bytes().into();
        delegation
    }

    /// A root-first chain `alice -> bob -> carol`.
    fn two_link_chain() -> DelegationChain {
        let alice = PrivateKeySigner::random();
        let bob = PrivateKeySigner::random();
        let carol = Address::with_last_byte(0xca);

        let root = signed(&alice, bob.address(), ROOT_AUTHORITY, vec![]);
        let leaf = signed(&bob, carol, root.hash(), vec![]);
        DelegationChain::new(vec![root, leaf])
    }

    fn with_expiry(before: u128) -> DelegationChain {
        let alice = PrivateKeySigner::random();
        let caveat = Caveat {
            enforcer: ENFORCER,
            terms: timestamp_terms(0, before),
            args: Bytes::new(),
        };
        DelegationChain::new(vec![signed(
            &alice,
            Address::with_last_byte(1),
            ROOT_AUTHORITY,
            vec![caveat],
        )])
    }

    #[test]
    fn valid_chain() {
        validator().validate(&two_link_chain(), NOW).unwrap();
    }

    #[test]
    fn valid_chain_in_both_wire_orders() {
        let chain = two_link_chain();
        for order in [ChainOrder::RootFirst, ChainOrder::LeafFirst] {
            let codec = DelegationCodec::new(order);
            let decoded = codec.decode(&codec.encode(&chain).unwrap()).unwrap();
            validator().validate(&decoded, NOW).unwrap();
        }

        // leaf-first bytes read as root-first do not link
        let leaf_first = DelegationCodec::new(ChainOrder::LeafFirst).encode(&chain).unwrap();
        let misread = DelegationCodec::new(ChainOrder::RootFirst).decode(&leaf_first).unwrap();
        assert!(matches!(
            validator().validate(&misread, NOW),
            Err(DelegationError::BrokenChain { index: 0, .. })
        ));
    }

    #[test]
    fn empty_chain() {
        assert_eq!(
            validator().validate(&DelegationChain::default(), NOW),
            Err(DelegationError::EmptyChain)
        );
    }

    #[test]
    fn missing_fields() {
        let chain = two_link_chain();

        let mut delegations: Vec<Delegation> = chain.clone().into();
        delegations[1].signature = Bytes::new();
        assert_eq!(
            validator().validate(&DelegationChain::new(delegations), NOW),
            Err(DelegationError::MissingField { index: 1, field: "signature" })
        );

        let mut delegations: Vec<Delegation> = chain.into();
        delegations[0].delegate = Address::ZERO;
        assert_eq!(
            validator().validate(&DelegationChain::new(delegations), NOW),
            Err(DelegationError::MissingField { index: 0, field: "delegate" })
        );
    }

    #[test]
    fn broken_linkage_wins_over_valid_signature() {
        let alice = PrivateKeySigner::random();
        let bob = PrivateKeySigner::random();
        let root = signed(&alice, bob.address(), ROOT_AUTHORITY, vec![]);
        // correctly signed, but pointing at the wrong parent
        let leaf = signed(&bob, Address::with_last_byte(2), B256::with_last_byte(1), vec![]);

        let err = validator().validate(&DelegationChain::new(vec![root.clone(), leaf]), NOW);
        assert_eq!(
            err,
            Err(DelegationError::BrokenChain {
                index: 1,
                expected: root.hash(),
                got: B256::with_last_byte(1)
            })
        );
    }

    #[test]
    fn root_must_carry_root_authority() {
        let alice = PrivateKeySigner::random();
        let root = signed(&alice, Address::with_last_byte(1), B256::ZERO, vec![]);
        assert!(matches!(
            validator().validate(&DelegationChain::new(vec![root]), NOW),
            Err(DelegationError::BrokenChain { index: 0, .. })
        ));
    }

    #[test]
    fn expiry_boundary() {
        // expiry == now is still valid
        validator().validate(&with_expiry(NOW as u128), NOW).unwrap();
        // zero means unbounded
        validator().validate(&with_expiry(0), NOW).unwrap();

        assert_eq!(
            validator().validate(&with_expiry(NOW as u128 - 1), NOW),
            Err(DelegationError::Expired { index: 0, expiry: NOW - 1, now: NOW })
        );
    }

    #[test]
    fn malformed_timestamp_terms() {
        let alice = PrivateKeySigner::random();
        let caveat =
            Caveat { enforcer: ENFORCER, terms: Bytes::from(vec![1u8; 20]), args: Bytes::new() };
        let chain = DelegationChain::new(vec![signed(
            &alice,
            Address::with_last_byte(1),
            ROOT_AUTHORITY,
            vec![caveat],
        )]);
        assert!(matches!(
            validator().validate(&chain, NOW),
            Err(DelegationError::MalformedPayload(_))
        ));
    }

    #[test]
    fn other_enforcers_are_ignored() {
        let alice = PrivateKeySigner::random();
        let caveat = Caveat {
            enforcer: Address::with_last_byte(0xee),
            terms: timestamp_terms(0, 1),
            args: Bytes::new(),
        };
        let chain = DelegationChain::new(vec![signed(
            &alice,
            Address::with_last_byte(1),
            ROOT_AUTHORITY,
            vec![caveat],
        )]);
        validator().validate(&chain, NOW).unwrap();
    }

    #[test]
    fn tampered_signature() {
        let mut delegations: Vec<Delegation> = two_link_chain().into();
        let mut signature = delegations[1].signature.to_vec();
        signature[10] ^= 0x01;
        delegations[1].signature = signature.into();

        let err = validator().validate(&DelegationChain::new(delegations.clone()), NOW);
        assert!(matches!(
            err,
            Err(DelegationError::InvalidSignature { index: 1, expected, .. }) if expected == delegations[1].delegator
        ));
    }

    #[test]
    fn signature_from_another_domain() {
        let chain = two_link_chain();
        let other = DelegationValidator::new(
            eip712_domain! {
                name: "DelegationManager",
                version: "1",
                chain_id: 10,
                verifying_contract: address!("0xdb9B1e94B5b69Df7e401DDbedE43491141047dB3"),
            },
            ENFORCER,
        );
        assert!(matches!(
            other.validate(&chain, NOW),
            Err(DelegationError::InvalidSignature { index: 0, .. })
        ));
    }

    #[test]
    fn truncated_signature() {
        let mut delegations: Vec<Delegation> = two_link_chain().into();
        delegations[0].signature = Bytes::from(vec![1u8; 64]);
        assert!(matches!(
            validator().validate(&DelegationChain::new(delegations), NOW),
            Err(DelegationError::InvalidSignature { index: 0, recovered: None, .. })
        ));
    }
}
