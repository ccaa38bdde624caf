//! Submission of redemption calls as ERC-4337 user operations.
//!
//! A submission moves through [`SubmissionState`]s:
//!
//! ```text
//! Building -> Signing -> Submitted -> Pending -> Confirmed
//!     \          \           \           \
//!      +----------+-----------+-----------+----> Failed
//! ```
//!
//! Identical requests are deduplicated through an [`IdempotencyCache`]. A request that matches a
//! confirmed submission returns its transaction hash, and one that matches a broadcast but
//! unconfirmed submission resumes waiting for it instead of broadcasting again.

mod bundler;
pub use bundler::{
    Bundler, ChainState, EndpointError, GasEstimate, GasFees, HttpBundler, HttpPaymaster,
    Paymaster, ReceiptTransaction, Sponsorship, UserOperationReceipt,
};

mod idempotency;
pub use idempotency::{IdempotencyCache, SubmissionRecord};

mod metrics;
pub use metrics::SubmitterMetrics;

use crate::{
    constants::{
        DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL,
        DEFAULT_RECEIPT_TIMEOUT, DEFAULT_RECORD_TTL, DELEGATION_MANAGER, ENTRYPOINT_V07,
    },
    error::SubmitError,
    nonce::NonceManager,
    signers::PayloadSigner,
    types::{DUMMY_SIGNATURE, Execution, Mode, UserOperation, contracts::ISmartAccount},
};
use alloy::{
    primitives::{Address, B256, Bytes, ChainId, U256},
    sol_types::SolCall,
};
use core::fmt;
use std::{sync::Arc, time::Duration};
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration of a [`RedemptionSubmitter`].
#[derive(Debug, Clone)]
pub struct SubmitterConfig {
    /// Chain the user operations are submitted on.
    pub chain_id: ChainId,
    /// The ERC-4337 entry point.
    pub entry_point: Address,
    /// The delegation manager the account calls into.
    pub delegation_manager: Address,
    /// The smart account sending the user operations.
    pub sender: Address,
    /// Number of attempts made to hand an operation to the bundler.
    pub max_attempts: u32,
    /// Delay before the first resubmission. Doubles on every further attempt.
    pub initial_backoff: Duration,
    /// Interval between receipt polls.
    pub poll_interval: Duration,
    /// How long to wait for inclusion.
    pub receipt_timeout: Duration,
    /// How long an unused submission record is kept for deduplication.
    pub record_ttl: Duration,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            entry_point: ENTRYPOINT_V07,
            delegation_manager: DELEGATION_MANAGER,
            sender: Address::ZERO,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            poll_interval: DEFAULT_POLL_INTERVAL,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
            record_ttl: DEFAULT_RECORD_TTL,
        }
    }
}

/// States of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    /// Assembling the user operation.
    Building,
    /// Signing the user operation.
    Signing,
    /// Handing the user operation to the bundler.
    Submitted,
    /// Waiting for inclusion.
    Pending,
    /// Included and executed.
    Confirmed,
    /// Gave up.
    Failed,
}

impl fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Building => "building",
            Self::Signing => "signing",
            Self::Submitted => "submitted",
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        })
    }
}

/// Submits redemption calls through a bundler and waits for their inclusion.
#[derive(Debug, Clone)]
pub struct RedemptionSubmitter {
    config: SubmitterConfig,
    bundler: Arc<dyn Bundler>,
    paymaster: Option<Arc<dyn Paymaster>>,
    chain: Arc<dyn ChainState>,
    signer: Arc<dyn PayloadSigner>,
    nonces: NonceManager,
    submissions: IdempotencyCache,
    metrics: Arc<SubmitterMetrics>,
}

impl RedemptionSubmitter {
    /// Creates a new [`RedemptionSubmitter`].
    pub fn new(
        config: SubmitterConfig,
        bundler: Arc<dyn Bundler>,
        chain: Arc<dyn ChainState>,
        signer: Arc<dyn PayloadSigner>,
    ) -> Self {
        Self {
            submissions: IdempotencyCache::new(config.record_ttl),
            config,
            bundler,
            paymaster: None,
            chain,
            signer,
            nonces: NonceManager::default(),
            metrics: Arc::new(SubmitterMetrics::default()),
        }
    }

    /// Sponsors user operations through `paymaster`.
    pub fn with_paymaster(mut self, paymaster: Arc<dyn Paymaster>) -> Self {
        self.paymaster = Some(paymaster);
        self
    }

    /// The submitter configuration.
    pub const fn config(&self) -> &SubmitterConfig {
        &self.config
    }

    /// Submits `call_data` for the delegation manager and waits for its inclusion.
    ///
    /// Returns the hash of the including transaction.
    pub async fn submit(
        &self,
        call_data: Bytes,
        idempotency_key: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<B256, SubmitError> {
        let key = IdempotencyCache::key(&call_data, idempotency_key);
        let result = self.submit_keyed(key, call_data, cancel).await;

        match &result {
            Ok(transaction_hash) => {
                info!(%key, %transaction_hash, state = %SubmissionState::Confirmed, "Redemption confirmed");
            }
            Err(err) => {
                self.metrics.failed.increment(1);
                warn!(
                    %key,
                    state = %SubmissionState::Failed,
                    broadcast = err.is_after_broadcast(),
                    %err,
                    "Redemption failed"
                );
            }
        }
        self.submissions.prune(key);

        result
    }

    async fn submit_keyed(
        &self,
        key: B256,
        call_data: Bytes,
        cancel: &CancellationToken,
    ) -> Result<B256, SubmitError> {
        let record = self.submissions.record(key);
        let mut record = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SubmitError::Cancelled { user_op_hash: None }),
            record = record.lock() => record,
        };

        let user_op_hash = match *record {
            SubmissionRecord::Confirmed(transaction_hash) => {
                debug!(%key, %transaction_hash, "Returning earlier confirmation");
                self.metrics.deduplicated.increment(1);
                return Ok(transaction_hash);
            }
            SubmissionRecord::Submitted(user_op_hash) => {
                debug!(%key, %user_op_hash, "Resuming earlier submission");
                self.metrics.deduplicated.increment(1);
                user_op_hash
            }
            SubmissionRecord::New => {
                let user_op_hash = self.broadcast(key, call_data, cancel).await?;
                *record = SubmissionRecord::Submitted(user_op_hash);
                user_op_hash
            }
        };

        let started = Instant::now();
        match self.await_receipt(key, user_op_hash, cancel).await {
            Ok(transaction_hash) => {
                self.metrics.confirmed.increment(1);
                self.metrics.confirmation_time.record(started.elapsed().as_millis() as f64);
                *record = SubmissionRecord::Confirmed(transaction_hash);
                Ok(transaction_hash)
            }
            Err(err) => {
                // a reverted operation is final, so the same request may be tried again
                if matches!(err, SubmitError::Reverted { .. }) {
                    *record = SubmissionRecord::New;
                }
                Err(err)
            }
        }
    }

    /// Builds, signs and sends a new user operation, returning its hash.
    ///
    /// The nonce is released if the operation never reached the bundler, including when this
    /// future is dropped before the send completes.
    async fn broadcast(
        &self,
        key: B256,
        call_data: Bytes,
        cancel: &CancellationToken,
    ) -> Result<B256, SubmitError> {
        info!(%key, state = %SubmissionState::Building, "Redemption state transition");

        let SubmitterConfig { chain_id, entry_point, sender, .. } = self.config;
        let lease = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SubmitError::Cancelled { user_op_hash: None }),
            lease = self.nonces.lease(chain_id, sender, || {
                self.chain.entry_point_nonce(entry_point, sender)
            }) => lease.map_err(SubmitError::Building)?,
        };

        let op = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SubmitError::Cancelled { user_op_hash: None }),
            op = self.build_user_op(call_data, lease.nonce()) => op?,
        };
        let op = self.sign(key, op).await?;
        let user_op_hash = self.send_with_retries(key, &op, cancel).await?;

        lease.commit();
        Ok(user_op_hash)
    }

    /// Assembles an unsigned user operation executing `call_data` on the delegation manager.
    async fn build_user_op(
        &self,
        call_data: Bytes,
        nonce: U256,
    ) -> Result<UserOperation, SubmitError> {
        let fees = self.chain.gas_fees().await.map_err(SubmitError::Building)?;
        let execution = Execution {
            target: self.config.delegation_manager,
            value: U256::ZERO,
            call_data,
        };

        let mut op = UserOperation {
            sender: self.config.sender,
            nonce,
            call_data: ISmartAccount::executeCall {
                mode: Mode::Single.code(),
                executionCalldata: Mode::Single.encode_executions(&[execution]),
            }
            .abi_encode()
            .into(),
            max_fee_per_gas: U256::from(fees.max_fee_per_gas),
            max_priority_fee_per_gas: U256::from(fees.max_priority_fee_per_gas),
            signature: DUMMY_SIGNATURE,
            ..Default::default()
        };

        self.bundler
            .estimate_user_operation_gas(&op, self.config.entry_point)
            .await
            .map_err(SubmitError::Building)?
            .apply(&mut op);

        if let Some(paymaster) = &self.paymaster {
            paymaster
                .sponsor_user_operation(&op, self.config.entry_point)
                .await
                .map_err(SubmitError::Sponsorship)?
                .apply(&mut op);
        }

        Ok(op)
    }

    async fn sign(&self, key: B256, mut op: UserOperation) -> Result<UserOperation, SubmitError> {
        info!(%key, state = %SubmissionState::Signing, nonce = %op.nonce, "Redemption state transition");
        let hash = op.hash(self.config.entry_point, self.config.chain_id);
        op.signature = self.signer.sign_payload_hash(hash).await?;
        Ok(op)
    }

    /// Sends `op` to the bundler, retrying transport failures with exponential backoff.
    async fn send_with_retries(
        &self,
        key: B256,
        op: &UserOperation,
        cancel: &CancellationToken,
    ) -> Result<B256, SubmitError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = self.config.initial_backoff;
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(SubmitError::Cancelled { user_op_hash: None });
            }
            attempt += 1;

            match self.bundler.send_user_operation(op, self.config.entry_point).await {
                Ok(user_op_hash) => {
                    self.metrics.sent.increment(1);
                    info!(%key, state = %SubmissionState::Submitted, %user_op_hash, attempt, "Redemption state transition");
                    return Ok(user_op_hash);
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    warn!(%key, attempt, %err, ?backoff, "Retrying user operation submission");
                    self.metrics.retried.increment(1);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return Err(SubmitError::Cancelled { user_op_hash: None })
                        }
                        _ = sleep(backoff) => {}
                    }
                    backoff = backoff.saturating_mul(2);
                }
                Err(source) => return Err(SubmitError::Submission { attempts: attempt, source }),
            }
        }
    }

    /// Polls the bundler for the receipt of `user_op_hash`.
    async fn await_receipt(
        &self,
        key: B256,
        user_op_hash: B256,
        cancel: &CancellationToken,
    ) -> Result<B256, SubmitError> {
        info!(%key, state = %SubmissionState::Pending, %user_op_hash, "Redemption state transition");
        let deadline = Instant::now() + self.config.receipt_timeout;

        let poll = async {
            loop {
                match self.bundler.get_user_operation_receipt(user_op_hash).await {
                    Ok(Some(receipt)) if receipt.success => return Ok(receipt.transaction_hash()),
                    Ok(Some(receipt)) => {
                        return Err(SubmitError::Reverted {
                            user_op_hash,
                            transaction_hash: receipt.transaction_hash(),
                            reason: receipt.reason,
                        });
                    }
                    Ok(None) => {}
                    Err(err) => warn!(%key, %user_op_hash, %err, "Failed to fetch receipt"),
                }
                sleep(self.config.poll_interval).await;
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SubmitError::Cancelled { user_op_hash: Some(user_op_hash) }),
            _ = sleep_until(deadline) => Err(SubmitError::Timeout {
                user_op_hash,
                timeout: self.config.receipt_timeout,
            }),
            result = poll => result,
        }
    }
}
