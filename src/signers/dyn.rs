//! Multi-signer abstraction.
//!
//! A signer abstracted over a local key or AWS KMS.
use super::PayloadSigner;
use crate::error::ConfigError;
use alloy::{
    network::{FullSigner, TxSigner},
    primitives::{Address, B256, Bytes, ChainId, Signature},
    signers::{aws::AwsSigner, local::PrivateKeySigner},
};
use aws_config::BehaviorVersion;
use std::{fmt, ops::Deref, str::FromStr, sync::Arc};

/// Prefix marking a signer key as an AWS KMS key id.
const KMS_PREFIX: &str = "kms:";

/// Abstraction over local and remote signers.
#[derive(Clone)]
pub struct DynSigner(pub Arc<dyn FullSigner<Signature> + Send + Sync>);

impl fmt::Debug for DynSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DynSigner").field(&self.address()).finish()
    }
}

impl DynSigner {
    /// Loads the signer described by `key`.
    ///
    /// `kms:<key id>` loads an AWS KMS key, anything else is parsed as a hex private key.
    pub async fn load(key: &str, chain_id: Option<ChainId>) -> Result<Self, ConfigError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::KeyUnavailable("no signer key configured".to_string()));
        }
        match key.strip_prefix(KMS_PREFIX) {
            Some(key_id) => Self::from_kms(key_id, chain_id).await,
            None => Self::from_signing_key(key),
        }
    }

    /// Load a private key.
    pub fn from_signing_key(key: &str) -> Result<Self, ConfigError> {
        let signer = PrivateKeySigner::from_str(key)
            .map_err(|err| ConfigError::KeyUnavailable(format!("invalid private key: {err}")))?;
        Ok(Self(Arc::new(signer)))
    }

    /// Load a signer from AWS KMS.
    pub async fn from_kms(key_id: &str, chain_id: Option<ChainId>) -> Result<Self, ConfigError> {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        let client = aws_sdk_kms::Client::new(&config);
        let signer = AwsSigner::new(client, key_id.to_string(), chain_id)
            .await
            .map_err(|err| ConfigError::KeyUnavailable(format!("kms key {key_id}: {err}")))?;
        Ok(Self(Arc::new(signer)))
    }

    /// Returns the signer's Ethereum Address.
    pub fn address(&self) -> Address {
        TxSigner::address(&self.0)
    }
}

impl From<PrivateKeySigner> for DynSigner {
    fn from(signer: PrivateKeySigner) -> Self {
        Self(Arc::new(signer))
    }
}

impl Deref for DynSigner {
    type Target = dyn FullSigner<Signature> + Send + Sync;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

#[async_trait::async_trait]
impl PayloadSigner for DynSigner {
    fn address(&self) -> Address {
        Self::address(self)
    }

    async fn sign_payload_hash(&self, payload_hash: B256) -> alloy::signers::Result<Bytes> {
        Ok(self.sign_hash(&payload_hash).await?.as_bytes().into())
    }
}
