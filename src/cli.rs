//! # Redemption CLI
use crate::{
    config::RedemptionConfig,
    constants::{DEFAULT_MAX_CONNECTIONS, DEFAULT_METRICS_PORT, DEFAULT_PORT},
    redeemer::RedeemerKind,
    spawn::try_spawn_with_args,
    types::ChainOrder,
};
use alloy::primitives::Address;
use alloy_chains::Chain;
use clap::Parser;
use std::{
    net::{IpAddr, Ipv4Addr},
    path::PathBuf,
    time::Duration,
};
use tracing::info;
use url::Url;

/// Redeems signed delegation chains through ERC-4337 bundlers.
///
/// Values passed on the command line take precedence over the configuration file. Unset
/// optional values keep what the file says.
#[derive(Debug, Parser)]
#[command(author, about = "Redeemer", long_about = None)]
pub struct Args {
    /// The configuration file.
    ///
    /// If missing, a default one will be used and stored in the working directory under
    /// `redemption.yaml`.
    #[arg(
        long,
        value_name = "CONFIG",
        env = "REDEMPTION_CONFIG",
        default_value = "redemption.yaml"
    )]
    pub config: PathBuf,
    /// The address to serve the RPC on.
    #[arg(long = "http.addr", value_name = "ADDR", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub address: IpAddr,
    /// The port to serve the RPC on.
    #[arg(long = "http.port", value_name = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// The port to serve the metrics on.
    #[arg(long = "http.metrics-port", value_name = "PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,
    /// The maximum number of concurrent connections the service can handle.
    #[arg(long = "max-connections", value_name = "NUM", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: u32,
    /// The chain redemptions are submitted on, by name or id.
    #[arg(long = "chain", value_name = "CHAIN")]
    pub chain: Option<Chain>,
    /// The RPC endpoint used to read account nonces and gas fees.
    #[arg(long = "endpoint", value_name = "RPC_ENDPOINT")]
    pub endpoint: Option<Url>,
    /// The ERC-4337 bundler URL.
    #[arg(long = "bundler-url", value_name = "URL", env = "REDEMPTION_BUNDLER_URL")]
    pub bundler_url: Option<Url>,
    /// The paymaster URL.
    #[arg(long = "paymaster-url", value_name = "URL", env = "REDEMPTION_PAYMASTER_URL")]
    pub paymaster_url: Option<Url>,
    /// Timeout of a single bundler or paymaster request.
    #[arg(long = "rpc-timeout", value_name = "SECONDS", value_parser = parse_duration_secs)]
    pub rpc_timeout: Option<Duration>,
    /// The ERC-4337 entry point.
    #[arg(long = "entry-point", value_name = "ADDRESS")]
    pub entry_point: Option<Address>,
    /// The delegation manager.
    #[arg(long = "delegation-manager", value_name = "ADDRESS")]
    pub delegation_manager: Option<Address>,
    /// The smart account submitting user operations.
    #[arg(long = "smart-account", value_name = "ADDRESS")]
    pub smart_account: Option<Address>,
    /// The timestamp caveat enforcer.
    #[arg(long = "timestamp-enforcer", value_name = "ADDRESS")]
    pub timestamp_enforcer: Option<Address>,
    /// Order in which delegation chains are received.
    #[arg(long = "chain-order", value_name = "ORDER")]
    pub chain_order: Option<ChainOrder>,
    /// The redemption backend.
    #[arg(long = "redeemer", value_name = "KIND")]
    pub redeemer: Option<RedeemerKind>,
    /// Number of attempts made to hand an operation to the bundler.
    #[arg(long = "max-attempts", value_name = "NUM")]
    pub max_attempts: Option<u32>,
    /// Delay before the first resubmission.
    #[arg(long = "initial-backoff", value_name = "MILLISECONDS", value_parser = parse_duration_millis)]
    pub initial_backoff: Option<Duration>,
    /// Interval between receipt polls.
    #[arg(long = "poll-interval", value_name = "MILLISECONDS", value_parser = parse_duration_millis)]
    pub poll_interval: Option<Duration>,
    /// How long to wait for a user operation to be included.
    #[arg(long = "receipt-timeout", value_name = "SECONDS", value_parser = parse_duration_secs)]
    pub receipt_timeout: Option<Duration>,
    /// How long a finished redemption is remembered for deduplication.
    #[arg(long = "record-ttl", value_name = "SECONDS", value_parser = parse_duration_secs)]
    pub record_ttl: Option<Duration>,
    /// The private key, or `kms:<key id>`, signing user operations.
    #[arg(long = "signer-key", value_name = "KEY", env = "REDEMPTION_SIGNER_KEY", hide_env_values = true)]
    pub signer_key: Option<String>,
}

impl Args {
    /// Run the redemption service until it stops or Ctrl-C is received.
    pub async fn run(self) -> eyre::Result<()> {
        let config_path = self.config.clone();
        let handle = try_spawn_with_args(self, &config_path).await?;

        tokio::select! {
            _ = handle.server.clone().stopped() => {}
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Received Ctrl-C, shutting down");
                handle.shutdown()?;
                handle.server.stopped().await;
            }
        }

        Ok(())
    }

    /// Merges [`Args`] values into an existing [`RedemptionConfig`] instance.
    pub fn merge_config(self, config: RedemptionConfig) -> RedemptionConfig {
        let mut config = config
            .with_address(self.address)
            .with_port(self.port)
            .with_metrics_port(self.metrics_port)
            .with_max_connections(self.max_connections);

        if let Some(chain) = self.chain {
            config = config.with_chain_id(chain.id());
        }
        if self.endpoint.is_some() {
            config = config.with_endpoint(self.endpoint);
        }
        if self.bundler_url.is_some() {
            config = config.with_bundler_url(self.bundler_url);
        }
        if self.paymaster_url.is_some() {
            config = config.with_paymaster_url(self.paymaster_url);
        }
        if let Some(timeout) = self.rpc_timeout {
            config = config.with_rpc_timeout(timeout);
        }
        if let Some(entry_point) = self.entry_point {
            config = config.with_entry_point(entry_point);
        }
        if let Some(delegation_manager) = self.delegation_manager {
            config = config.with_delegation_manager(delegation_manager);
        }
        if let Some(smart_account) = self.smart_account {
            config = config.with_smart_account(smart_account);
        }
        if let Some(timestamp_enforcer) = self.timestamp_enforcer {
            config = config.with_timestamp_enforcer(timestamp_enforcer);
        }
        if let Some(order) = self.chain_order {
            config = config.with_chain_order(order);
        }
        if let Some(redeemer) = self.redeemer {
            config = config.with_redeemer(redeemer);
        }
        if let Some(max_attempts) = self.max_attempts {
            config = config.with_max_attempts(max_attempts);
        }
        if let Some(backoff) = self.initial_backoff {
            config = config.with_initial_backoff(backoff);
        }
        if let Some(interval) = self.poll_interval {
            config = config.with_poll_interval(interval);
        }
        if let Some(timeout) = self.receipt_timeout {
            config = config.with_receipt_timeout(timeout);
        }
        if let Some(ttl) = self.record_ttl {
            config = config.with_record_ttl(ttl);
        }
        if self.signer_key.is_some() {
            config = config.with_signer_key(self.signer_key);
        }
        config
    }
}

/// Parses a string representing seconds to a [`Duration`].
fn parse_duration_secs(arg: &str) -> Result<Duration, std::num::ParseIntError> {
    let seconds = arg.parse()?;
    Ok(Duration::from_secs(seconds))
}

/// Parses a string representing milliseconds to a [`Duration`].
fn parse_duration_millis(arg: &str) -> Result<Duration, std::num::ParseIntError> {
    let millis = arg.parse()?;
    Ok(Duration::from_millis(millis))
}
