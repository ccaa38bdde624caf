//! Redemption test environment

use alloy::{
    dyn_abi::Eip712Domain,
    primitives::{Address, B256, Bytes, U256, keccak256},
    signers::{SignerSync, local::PrivateKeySigner},
};
use redeemer::{
    codec::DelegationCodec,
    constants::{DELEGATION_MANAGER, ENTRYPOINT_V07, TIMESTAMP_ENFORCER},
    redeemer::ChainRedeemer,
    service::RedemptionService,
    signers::DynSigner,
    submitter::{
        Bundler, ChainState, EndpointError, GasEstimate, GasFees, Paymaster, ReceiptTransaction,
        RedemptionSubmitter, Sponsorship, SubmitterConfig, UserOperationReceipt,
    },
    types::{
        ChainOrder, Delegation, Execution, ROOT_AUTHORITY, UserOperation, WireDelegation,
        rpc::{DelegationChainPayload, RedeemDelegationRequest},
    },
    validator::DelegationValidator,
};
use std::{
    borrow::Cow,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

pub const CHAIN_ID: u64 = 1;
pub const NOW: u64 = 1_700_000_000;
pub const SMART_ACCOUNT: Address = Address::new([0x5a; 20]);
pub const PAYMASTER: Address = Address::new([0x9a; 20]);

/// Domain delegations are signed under.
pub fn domain() -> Eip712Domain {
    Eip712Domain::new(
        Some(Cow::Borrowed("DelegationManager")),
        Some(Cow::Borrowed("1")),
        Some(U256::from(CHAIN_ID)),
        Some(DELEGATION_MANAGER),
        None,
    )
}

/// A signed root-first chain of `depth` delegations ending at `redeemer`.
pub fn signed_chain(depth: usize, redeemer: Address) -> Vec<Delegation> {
    let signers = (0..depth).map(|_| PrivateKeySigner::random()).collect::<Vec<_>>();
    let mut authority = ROOT_AUTHORITY;
    let mut chain = Vec::with_capacity(depth);

    for (i, signer) in signers.iter().enumerate() {
        let delegate = signers.get(i + 1).map(|next| next.address()).unwrap_or(redeemer);
        let mut delegation = Delegation {
            delegate,
            delegator: signer.address(),
            authority,
            caveats: vec![],
            salt: U256::from(i),
            signature: Bytes::new(),
        };
        delegation.signature =
            signer.sign_hash_sync(&delegation.signing_hash(&domain())).unwrap().as_bytes().into();
        authority = delegation.hash();
        chain.push(delegation);
    }
    chain
}

/// A single-mode request redeeming `chain` for a native transfer.
pub fn request(chain: &[Delegation]) -> RedeemDelegationRequest {
    RedeemDelegationRequest {
        delegation_chains: vec![DelegationChainPayload::Delegations(
            chain.iter().map(WireDelegation::from).collect(),
        )],
        modes: vec!["single".to_string()],
        executions: vec![vec![Execution::native_transfer(
            Address::with_last_byte(0x42),
            U256::from(1),
        )]],
        ..Default::default()
    }
}

/// Hash the mock bundler assigns to `op`.
pub fn user_op_hash(op: &UserOperation) -> B256 {
    op.hash(ENTRYPOINT_V07, CHAIN_ID)
}

/// Hash of the transaction the mock bundler includes `user_op_hash` in.
pub fn transaction_hash(user_op_hash: B256) -> B256 {
    keccak256(user_op_hash)
}

/// A bundler recording every call it receives.
#[derive(Debug, Default)]
pub struct MockBundler {
    pub estimates: AtomicUsize,
    pub sends: AtomicUsize,
    pub polls: AtomicUsize,
    /// Sends failing with a transport error before sends go through.
    pub failing_sends: AtomicUsize,
    /// Polls answered without a receipt. `usize::MAX` never includes anything.
    pub pending_polls: AtomicUsize,
    /// Whether included operations revert.
    pub reverts: AtomicBool,
    /// Whether gas estimation never answers.
    pub stalls: AtomicBool,
    pub sent: Mutex<Vec<UserOperation>>,
}

impl MockBundler {
    pub fn calls(&self) -> usize {
        self.estimates.load(Ordering::SeqCst)
            + self.sends.load(Ordering::SeqCst)
            + self.polls.load(Ordering::SeqCst)
    }

    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<UserOperation> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Bundler for MockBundler {
    async fn estimate_user_operation_gas(
        &self,
        _op: &UserOperation,
        _entry_point: Address,
    ) -> Result<GasEstimate, EndpointError> {
        self.estimates.fetch_add(1, Ordering::SeqCst);
        if self.stalls.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(GasEstimate {
            pre_verification_gas: U256::from(50_000),
            verification_gas_limit: U256::from(100_000),
            call_gas_limit: U256::from(200_000),
            ..Default::default()
        })
    }

    async fn send_user_operation(
        &self,
        op: &UserOperation,
        _entry_point: Address,
    ) -> Result<B256, EndpointError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(EndpointError::Transport("connection refused".to_string()));
        }
        self.sent.lock().unwrap().push(op.clone());
        Ok(user_op_hash(op))
    }

    async fn get_user_operation_receipt(
        &self,
        user_op_hash: B256,
    ) -> Result<Option<UserOperationReceipt>, EndpointError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let pending = self
            .pending_polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                usize::MAX => Some(n),
                n => Some(n - 1),
            })
            .is_ok();
        if pending {
            return Ok(None);
        }

        let reverts = self.reverts.load(Ordering::SeqCst);
        Ok(Some(UserOperationReceipt {
            user_op_hash,
            success: !reverts,
            reason: reverts.then(|| "TransferFailed()".to_string()),
            receipt: ReceiptTransaction { transaction_hash: transaction_hash(user_op_hash) },
        }))
    }
}

/// A paymaster sponsoring everything.
#[derive(Debug, Default)]
pub struct MockPaymaster {
    pub sponsored: AtomicUsize,
}

#[async_trait::async_trait]
impl Paymaster for MockPaymaster {
    async fn sponsor_user_operation(
        &self,
        _op: &UserOperation,
        _entry_point: Address,
    ) -> Result<Sponsorship, EndpointError> {
        self.sponsored.fetch_add(1, Ordering::SeqCst);
        Ok(Sponsorship {
            paymaster: PAYMASTER,
            paymaster_data: Bytes::from_static(b"sponsored"),
            paymaster_verification_gas_limit: U256::from(30_000),
            paymaster_post_op_gas_limit: U256::from(10_000),
            gas: None,
        })
    }
}

/// Chain state with a fixed starting nonce.
#[derive(Debug, Default)]
pub struct MockChain {
    pub nonce_fetches: AtomicUsize,
}

#[async_trait::async_trait]
impl ChainState for MockChain {
    async fn entry_point_nonce(
        &self,
        _entry_point: Address,
        _sender: Address,
    ) -> Result<U256, EndpointError> {
        self.nonce_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(U256::ZERO)
    }

    async fn gas_fees(&self) -> Result<GasFees, EndpointError> {
        Ok(GasFees { max_fee_per_gas: 2_000_000_000, max_priority_fee_per_gas: 1_000_000 })
    }
}

/// A [`RedemptionService`] wired to mocked endpoints.
#[derive(Debug)]
pub struct Environment {
    pub service: RedemptionService,
    pub bundler: Arc<MockBundler>,
    pub chain: Arc<MockChain>,
    pub paymaster: Option<Arc<MockPaymaster>>,
    pub signer: DynSigner,
}

impl Environment {
    pub fn setup() -> Self {
        Self::setup_with(SubmitterConfig::default(), false)
    }

    pub fn setup_with(config: SubmitterConfig, sponsored: bool) -> Self {
        let config = SubmitterConfig {
            chain_id: CHAIN_ID,
            sender: SMART_ACCOUNT,
            initial_backoff: Duration::from_millis(100),
            poll_interval: Duration::from_millis(100),
            ..config
        };
        let bundler = Arc::new(MockBundler::default());
        let chain = Arc::new(MockChain::default());
        let signer = DynSigner::from(PrivateKeySigner::random());

        let mut submitter = RedemptionSubmitter::new(
            config,
            bundler.clone(),
            chain.clone(),
            Arc::new(signer.clone()),
        );
        let paymaster = sponsored.then(|| Arc::new(MockPaymaster::default()));
        if let Some(paymaster) = &paymaster {
            submitter = submitter.with_paymaster(paymaster.clone());
        }

        let service = RedemptionService::new(
            DelegationCodec::new(ChainOrder::RootFirst),
            DelegationValidator::new(domain(), TIMESTAMP_ENFORCER),
            Arc::new(ChainRedeemer::new(submitter)),
        );

        Self { service, bundler, chain, paymaster, signer }
    }
}
