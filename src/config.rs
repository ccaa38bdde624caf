//! Redemption service configuration.
use crate::{
    constants::{
        DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_CONNECTIONS,
        DEFAULT_METRICS_PORT, DEFAULT_POLL_INTERVAL, DEFAULT_PORT, DEFAULT_RECEIPT_TIMEOUT,
        DEFAULT_RECORD_TTL, DEFAULT_RPC_TIMEOUT, DELEGATION_MANAGER, DELEGATION_MANAGER_NAME,
        DELEGATION_MANAGER_VERSION, ENTRYPOINT_V07, TIMESTAMP_ENFORCER,
    },
    redeemer::RedeemerKind,
    submitter::SubmitterConfig,
    types::ChainOrder,
};
use alloy::{
    dyn_abi::Eip712Domain,
    primitives::{Address, ChainId, U256},
};
use eyre::Context;
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    net::{IpAddr, Ipv4Addr},
    path::Path,
    time::Duration,
};
use url::Url;

/// Redemption service configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RedemptionConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Chain configuration.
    #[serde(default)]
    pub chain: ChainConfig,
    /// Bundler and paymaster configuration.
    #[serde(default)]
    pub bundler: BundlerConfig,
    /// Contract addresses.
    #[serde(default)]
    pub contracts: ContractsConfig,
    /// Submission configuration.
    #[serde(default)]
    pub submission: SubmissionConfig,
    /// Order in which delegation chains travel on the wire.
    #[serde(default)]
    pub chain_order: ChainOrder,
    /// The redemption backend.
    #[serde(default)]
    pub redeemer: RedeemerKind,
    /// Secrets.
    #[serde(skip_serializing, default)]
    pub secrets: SecretsConfig,
}

impl RedemptionConfig {
    /// Sets the IP address to serve the RPC on.
    pub fn with_address(mut self, address: IpAddr) -> Self {
        self.server.address = address;
        self
    }

    /// Sets the port to serve the RPC on.
    pub fn with_port(mut self, port: u16) -> Self {
        self.server.port = port;
        self
    }

    /// Sets the port to serve the metrics on.
    pub fn with_metrics_port(mut self, port: u16) -> Self {
        self.server.metrics_port = port;
        self
    }

    /// Sets the maximum number of concurrent connections the service can handle.
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.server.max_connections = max_connections;
        self
    }

    /// Sets the chain id.
    pub fn with_chain_id(mut self, chain_id: ChainId) -> Self {
        self.chain.id = chain_id;
        self
    }

    /// Sets the chain RPC endpoint.
    pub fn with_endpoint(mut self, endpoint: Option<Url>) -> Self {
        self.chain.endpoint = endpoint.or(self.chain.endpoint);
        self
    }

    /// Sets the bundler URL.
    pub fn with_bundler_url(mut self, url: Option<Url>) -> Self {
        self.bundler.url = url.or(self.bundler.url);
        self
    }

    /// Sets the paymaster URL.
    pub fn with_paymaster_url(mut self, url: Option<Url>) -> Self {
        self.bundler.paymaster_url = url.or(self.bundler.paymaster_url);
        self
    }

    /// Sets the timeout of bundler and paymaster requests.
    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.bundler.timeout = timeout;
        self
    }

    /// Sets the entry point address.
    pub fn with_entry_point(mut self, entry_point: Address) -> Self {
        self.contracts.entry_point = entry_point;
        self
    }

    /// Sets the delegation manager address.
    pub fn with_delegation_manager(mut self, delegation_manager: Address) -> Self {
        self.contracts.delegation_manager = delegation_manager;
        self
    }

    /// Sets the smart account submitting user operations.
    pub fn with_smart_account(mut self, smart_account: Address) -> Self {
        self.contracts.smart_account = smart_account;
        self
    }

    /// Sets the timestamp caveat enforcer address.
    pub fn with_timestamp_enforcer(mut self, timestamp_enforcer: Address) -> Self {
        self.contracts.timestamp_enforcer = timestamp_enforcer;
        self
    }

    /// Sets the wire order of delegation chains.
    pub fn with_chain_order(mut self, chain_order: ChainOrder) -> Self {
        self.chain_order = chain_order;
        self
    }

    /// Sets the number of attempts made to hand an operation to the bundler.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.submission.max_attempts = max_attempts;
        self
    }

    /// Sets the delay before the first resubmission.
    pub fn with_initial_backoff(mut self, initial_backoff: Duration) -> Self {
        self.submission.initial_backoff = initial_backoff;
        self
    }

    /// Sets the interval between receipt polls.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.submission.poll_interval = poll_interval;
        self
    }

    /// Sets how long to wait for a user operation to be included.
    pub fn with_receipt_timeout(mut self, receipt_timeout: Duration) -> Self {
        self.submission.receipt_timeout = receipt_timeout;
        self
    }

    /// Sets how long an unused submission record is kept for deduplication.
    pub fn with_record_ttl(mut self, record_ttl: Duration) -> Self {
        self.submission.record_ttl = record_ttl;
        self
    }

    /// Sets the redemption backend.
    pub fn with_redeemer(mut self, redeemer: RedeemerKind) -> Self {
        self.redeemer = redeemer;
        self
    }

    /// Sets the key used to sign user operations.
    pub fn with_signer_key(mut self, signer_key: Option<String>) -> Self {
        if let Some(signer_key) = signer_key {
            self.secrets.signer_key = signer_key;
        }
        self
    }

    /// The EIP-712 domain delegations are signed under.
    pub fn delegation_domain(&self) -> Eip712Domain {
        Eip712Domain::new(
            Some(Cow::Borrowed(DELEGATION_MANAGER_NAME)),
            Some(Cow::Borrowed(DELEGATION_MANAGER_VERSION)),
            Some(U256::from(self.chain.id)),
            Some(self.contracts.delegation_manager),
            None,
        )
    }

    /// The configuration of the user operation submitter.
    pub fn submitter_config(&self) -> SubmitterConfig {
        SubmitterConfig {
            chain_id: self.chain.id,
            entry_point: self.contracts.entry_point,
            delegation_manager: self.contracts.delegation_manager,
            sender: self.contracts.smart_account,
            max_attempts: self.submission.max_attempts,
            initial_backoff: self.submission.initial_backoff,
            poll_interval: self.submission.poll_interval,
            receipt_timeout: self.submission.receipt_timeout,
            record_ttl: self.submission.record_ttl,
        }
    }

    /// Load from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> eyre::Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .wrap_err_with(|| format!("failed to read config file: {}", path.display()))?;
        let config = serde_yaml::from_reader(&file)
            .wrap_err_with(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Save to a YAML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> eyre::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address to serve the RPC on.
    pub address: IpAddr,
    /// The port to serve the RPC on.
    pub port: u16,
    /// The port to serve the metrics on.
    pub metrics_port: u16,
    /// The maximum number of concurrent connections the service can handle.
    pub max_connections: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            metrics_port: DEFAULT_METRICS_PORT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

/// Chain configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// The chain id.
    pub id: ChainId,
    /// The RPC endpoint used to read nonces and fees.
    #[serde(default)]
    pub endpoint: Option<Url>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self { id: 1, endpoint: None }
    }
}

/// Bundler and paymaster configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundlerConfig {
    /// The ERC-4337 bundler URL.
    #[serde(default)]
    pub url: Option<Url>,
    /// The paymaster URL. User operations are not sponsored if unset.
    #[serde(default)]
    pub paymaster_url: Option<Url>,
    /// Timeout of a single request.
    #[serde(with = "crate::serde::duration")]
    pub timeout: Duration,
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self { url: None, paymaster_url: None, timeout: DEFAULT_RPC_TIMEOUT }
    }
}

/// Contract addresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractsConfig {
    /// The ERC-4337 entry point.
    pub entry_point: Address,
    /// The delegation manager.
    pub delegation_manager: Address,
    /// The smart account submitting user operations.
    pub smart_account: Address,
    /// The timestamp caveat enforcer.
    pub timestamp_enforcer: Address,
}

impl Default for ContractsConfig {
    fn default() -> Self {
        Self {
            entry_point: ENTRYPOINT_V07,
            delegation_manager: DELEGATION_MANAGER,
            smart_account: Address::ZERO,
            timestamp_enforcer: TIMESTAMP_ENFORCER,
        }
    }
}

/// Retry and polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    /// Number of attempts made to hand an operation to the bundler.
    pub max_attempts: u32,
    /// Delay before the first resubmission, in milliseconds.
    #[serde(with = "crate::serde::duration_millis")]
    pub initial_backoff: Duration,
    /// Interval between receipt polls, in milliseconds.
    #[serde(with = "crate::serde::duration_millis")]
    pub poll_interval: Duration,
    /// How long to wait for inclusion, in seconds.
    #[serde(with = "crate::serde::duration")]
    pub receipt_timeout: Duration,
    /// How long an unused submission record is kept for deduplication, in seconds.
    #[serde(with = "crate::serde::duration", default = "default_record_ttl")]
    pub record_ttl: Duration,
}

const fn default_record_ttl() -> Duration {
    DEFAULT_RECORD_TTL
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            poll_interval: DEFAULT_POLL_INTERVAL,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
            record_ttl: DEFAULT_RECORD_TTL,
        }
    }
}

/// Secrets (kept out of serialized output).
#[derive(Clone, Default, Deserialize)]
pub struct SecretsConfig {
    /// The private key or `kms:<key id>` signing user operations.
    #[serde(default)]
    pub signer_key: String,
}

impl std::fmt::Debug for SecretsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretsConfig").field("signer_key", &"<redacted>").finish()
    }
}
