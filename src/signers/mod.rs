//! Redemption signers.

mod r#dyn;
use alloy::primitives::{Address, B256, Bytes};
pub use r#dyn::DynSigner;

/// Trait for a signer of user operation hashes.
#[async_trait::async_trait]
pub trait PayloadSigner: std::fmt::Debug + Send + Sync {
    /// The address signatures recover to.
    fn address(&self) -> Address;

    /// Signs the payload hash.
    ///
    /// Returns the 65 byte `r || s || v` signature as [`Bytes`].
    async fn sign_payload_hash(&self, payload_hash: B256) -> alloy::signers::Result<Bytes>;
}
