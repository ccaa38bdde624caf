//! Nonce management for the submitting account.
//!
//! User operations from one sender are ordered by the entry point nonce, so concurrent
//! redemptions must never build two operations with the same nonce.

use std::{collections::BTreeSet, future::Future, sync::Arc};

use alloy::primitives::{Address, ChainId, U256};
use dashmap::DashMap;
use futures_util::lock::Mutex;
use tracing::debug;

/// Local nonce state of one sender.
#[derive(Debug, Default)]
struct NonceSlot {
    /// Next fresh nonce, `None` until fetched.
    next: Option<U256>,
    /// Nonces below `next` that were handed out and returned unused.
    released: BTreeSet<U256>,
}

/// Hands out entry point nonces per `(chain, sender)`.
///
/// The first acquisition for a sender reads the nonce from chain. Later acquisitions reuse the
/// lowest released nonce, or increment the local counter, while holding that sender's lock.
/// The counter is never reset, since the chain nonce does not account for operations still
/// pending in the bundler.
#[derive(Clone, Debug, Default)]
pub struct NonceManager {
    nonces: Arc<DashMap<(ChainId, Address), Arc<Mutex<NonceSlot>>>>,
}

impl NonceManager {
    fn slot(&self, chain_id: ChainId, sender: Address) -> Arc<Mutex<NonceSlot>> {
        // Locks dashmap internally for a short duration to clone the `Arc`.
        // We don't want to hold the dashmap lock through the await points of callers.
        let rm = self.nonces.entry((chain_id, sender)).or_insert_with(Default::default);
        Arc::clone(rm.value())
    }

    /// Acquires the next nonce of `sender`, calling `fetch` if it is not known yet.
    pub async fn acquire<F, Fut, E>(
        &self,
        chain_id: ChainId,
        sender: Address,
        fetch: F,
    ) -> Result<U256, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<U256, E>>,
    {
        let slot = self.slot(chain_id, sender);
        let mut slot = slot.lock().await;
        if let Some(nonce) = slot.released.pop_first() {
            debug!(%chain_id, %sender, %nonce, "Reusing released nonce");
            return Ok(nonce);
        }
        let nonce = match slot.next {
            Some(nonce) => nonce,
            None => {
                let nonce = fetch().await?;
                debug!(%chain_id, %sender, %nonce, "Fetched account nonce");
                nonce
            }
        };
        slot.next = Some(nonce + U256::from(1));
        Ok(nonce)
    }

    /// Acquires a nonce like [`Self::acquire`], wrapped in a [`NonceLease`] that returns it on
    /// drop.
    pub async fn lease<F, Fut, E>(
        &self,
        chain_id: ChainId,
        sender: Address,
        fetch: F,
    ) -> Result<NonceLease, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<U256, E>>,
    {
        let nonce = self.acquire(chain_id, sender, fetch).await?;
        Ok(NonceLease { manager: self.clone(), chain_id, sender, nonce, armed: true })
    }

    /// Returns a nonce that was acquired but never broadcast.
    ///
    /// The counter steps back over released nonces at its tail. Any other released nonce is
    /// kept aside and handed out again before a fresh one.
    pub async fn release(&self, chain_id: ChainId, sender: Address, nonce: U256) {
        let slot = self.slot(chain_id, sender);
        let mut slot = slot.lock().await;
        slot.release(nonce);
    }
}

impl NonceSlot {
    fn release(&mut self, nonce: U256) {
        let Some(next) = self.next else { return };
        if nonce >= next {
            return;
        }
        if nonce + U256::from(1) != next {
            self.released.insert(nonce);
            return;
        }

        let mut next = nonce;
        while next > U256::ZERO && self.released.remove(&(next - U256::from(1))) {
            next -= U256::from(1);
        }
        self.next = Some(next);
    }
}

/// A nonce that goes back to its [`NonceManager`] when dropped, unless committed.
///
/// Dropping covers both failed broadcasts and callers that stop polling mid-build.
#[derive(Debug)]
pub struct NonceLease {
    manager: NonceManager,
    chain_id: ChainId,
    sender: Address,
    nonce: U256,
    armed: bool,
}

impl NonceLease {
    /// The leased nonce.
    pub const fn nonce(&self) -> U256 {
        self.nonce
    }

    /// Keeps the nonce, once an operation using it reached the bundler.
    pub fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for NonceLease {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let (chain_id, sender, nonce) = (self.chain_id, self.sender, self.nonce);
        debug!(%chain_id, %sender, %nonce, "Releasing unused nonce");

        let slot = self.manager.slot(chain_id, sender);
        if let Some(mut slot) = slot.try_lock() {
            slot.release(nonce);
            return;
        }
        // Another acquisition holds the lock across a chain read.
        let manager = self.manager.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { manager.release(chain_id, sender, nonce).await });
        }
    }
}
