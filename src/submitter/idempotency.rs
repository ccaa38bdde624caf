//! Deduplication of identical redemption requests.

use crate::constants::DEFAULT_RECORD_TTL;
use alloy::primitives::{B256, Bytes, keccak256};
use dashmap::DashMap;
use std::{sync::Arc, time::Duration};
use tokio::{sync::Mutex, time::Instant};
use tracing::debug;

/// Progress of a submission, as far as deduplication is concerned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubmissionRecord {
    /// Nothing was broadcast.
    #[default]
    New,
    /// The user operation with this hash was accepted by the bundler.
    Submitted(B256),
    /// The user operation was included in the transaction with this hash.
    Confirmed(B256),
}

/// A record with the last time a request used it.
#[derive(Debug)]
struct Entry {
    record: Arc<Mutex<SubmissionRecord>>,
    touched: Instant,
}

/// In-memory submission records keyed by [`IdempotencyCache::key`].
///
/// Each record sits behind its own lock, so identical requests are serialized while unrelated
/// ones proceed concurrently. Records nobody used for `ttl` are evicted, and none survive a
/// restart.
#[derive(Debug, Clone)]
pub struct IdempotencyCache {
    records: Arc<DashMap<B256, Entry>>,
    ttl: Duration,
}

impl Default for IdempotencyCache {
    fn default() -> Self {
        Self::new(DEFAULT_RECORD_TTL)
    }
}

impl IdempotencyCache {
    /// Creates a cache evicting records unused for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self { records: Default::default(), ttl }
    }

    /// Computes `keccak256(call_data || marker)`.
    pub fn key(call_data: &Bytes, marker: Option<&str>) -> B256 {
        let mut preimage = call_data.to_vec();
        if let Some(marker) = marker {
            preimage.extend_from_slice(marker.as_bytes());
        }
        keccak256(preimage)
    }

    /// Returns the record of `key`, creating an empty one if needed.
    pub fn record(&self, key: B256) -> Arc<Mutex<SubmissionRecord>> {
        let mut entry = self.records.entry(key).or_insert_with(|| Entry {
            record: Default::default(),
            touched: Instant::now(),
        });
        entry.touched = Instant::now();
        Arc::clone(&entry.record)
    }

    /// Drops the record of `key` if nothing was broadcast and nobody else holds it, then evicts
    /// expired records.
    pub fn prune(&self, key: B256) {
        self.records.remove_if(&key, |_, entry| {
            Arc::strong_count(&entry.record) == 1
                && entry.record.try_lock().is_ok_and(|record| *record == SubmissionRecord::New)
        });
        self.evict_expired();
    }

    /// Evicts records that nobody holds and nobody used for `ttl`.
    pub fn evict_expired(&self) {
        let before = self.records.len();
        self.records.retain(|_, entry| {
            Arc::strong_count(&entry.record) > 1 || entry.touched.elapsed() < self.ttl
        });
        let evicted = before.saturating_sub(self.records.len());
        if evicted > 0 {
            debug!(evicted, "Evicted expired submission records");
        }
    }

    /// Number of tracked records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no records are tracked.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
