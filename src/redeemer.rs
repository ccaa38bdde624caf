//! Redemption backends.
//!
//! A [`Redeemer`] takes finished `redeemDelegations` calldata and turns it into a transaction
//! hash. The backend is picked once at startup and injected into the
//! [`RedemptionService`](crate::service::RedemptionService).

use crate::{error::SubmitError, submitter::RedemptionSubmitter};
use alloy::primitives::{B256, Bytes, keccak256};
use serde::{Deserialize, Serialize};
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// The redemption backend to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RedeemerKind {
    /// Returns canned hashes without touching the chain.
    #[default]
    Mock,
    /// Submits user operations through a bundler.
    Chain,
}

/// Executes redemption calldata.
#[async_trait::async_trait]
pub trait Redeemer: std::fmt::Debug + Send + Sync {
    /// Redeems `call_data`, returning the hash of the including transaction.
    async fn redeem(
        &self,
        call_data: Bytes,
        idempotency_key: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<B256, SubmitError>;
}

/// A [`Redeemer`] that confirms everything without submitting.
///
/// The returned hash is `keccak256(call_data)`, so identical calls get identical hashes.
#[derive(Debug, Default)]
pub struct MockRedeemer {
    redemptions: AtomicU64,
}

impl MockRedeemer {
    /// Number of redemptions confirmed so far.
    pub fn redemptions(&self) -> u64 {
        self.redemptions.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl Redeemer for MockRedeemer {
    async fn redeem(
        &self,
        call_data: Bytes,
        _idempotency_key: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<B256, SubmitError> {
        if cancel.is_cancelled() {
            return Err(SubmitError::Cancelled { user_op_hash: None });
        }
        self.redemptions.fetch_add(1, Ordering::Relaxed);
        let transaction_hash = keccak256(&call_data);
        debug!(%transaction_hash, "Mock redemption");
        Ok(transaction_hash)
    }
}

/// A [`Redeemer`] submitting user operations through a [`RedemptionSubmitter`].
#[derive(Debug, Clone)]
pub struct ChainRedeemer {
    submitter: Arc<RedemptionSubmitter>,
}

impl ChainRedeemer {
    /// Creates a new [`ChainRedeemer`].
    pub fn new(submitter: RedemptionSubmitter) -> Self {
        Self { submitter: Arc::new(submitter) }
    }

    /// The underlying submitter.
    pub fn submitter(&self) -> &RedemptionSubmitter {
        &self.submitter
    }
}

#[async_trait::async_trait]
impl Redeemer for ChainRedeemer {
    async fn redeem(
        &self,
        call_data: Bytes,
        idempotency_key: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<B256, SubmitError> {
        self.submitter.submit(call_data, idempotency_key, cancel).await
    }
}
