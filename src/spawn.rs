//! Redemption service spawn utilities.
use crate::{
    cli::Args,
    codec::DelegationCodec,
    config::RedemptionConfig,
    error::ConfigError,
    metrics,
    redeemer::{ChainRedeemer, MockRedeemer, Redeemer, RedeemerKind},
    rpc::{Redemption, RedemptionApiServer},
    service::RedemptionService,
    signers::DynSigner,
    submitter::{HttpBundler, HttpPaymaster, RedemptionSubmitter},
    validator::DelegationValidator,
};
use alloy::{
    providers::{Provider, ProviderBuilder},
    rpc::client::ClientBuilder,
    transports::layers::RetryBackoffLayer,
};
use http::header;
use jsonrpsee::server::{Server, ServerConfig, ServerHandle, middleware::http::ProxyGetRequestLayer};
use metrics_exporter_prometheus::PrometheusHandle;
use std::{net::SocketAddr, path::Path, sync::Arc};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::{AllowMethods, AllowOrigin, CorsLayer};
use tracing::{info, warn};

/// [`RetryBackoffLayer`] used for the chain provider.
///
/// We are allowing max 10 retries with a backoff of 800ms. The CU/s is set to max value to avoid
/// any throttling.
const RETRY_LAYER: RetryBackoffLayer = RetryBackoffLayer::new(10, 800, u64::MAX);

/// Context returned once the service is launched.
#[derive(Debug, Clone)]
pub struct RedemptionHandle {
    /// The socket address to which the server is bound.
    pub local_addr: SocketAddr,
    /// Handle to RPC server.
    pub server: ServerHandle,
    /// Metrics collector handle.
    pub metrics: PrometheusHandle,
    /// Cancels in-flight redemptions.
    pub cancel: CancellationToken,
}

impl RedemptionHandle {
    /// Returns the url to the http server
    pub fn http_url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    /// Cancels in-flight redemptions and stops the server.
    pub fn shutdown(&self) -> eyre::Result<()> {
        self.cancel.cancel();
        self.server.stop()?;
        Ok(())
    }
}

/// Attempts to spawn the redemption service using CLI arguments and a configuration file.
pub async fn try_spawn_with_args<P: AsRef<Path>>(
    args: Args,
    config_path: P,
) -> eyre::Result<RedemptionHandle> {
    let config = if !config_path.as_ref().exists() {
        let config = args.merge_config(RedemptionConfig::default());
        config.save_to_file(&config_path)?;
        config
    } else {
        // File exists: load and override with CLI values.
        args.merge_config(RedemptionConfig::load_from_file(&config_path)?)
    };

    try_spawn(config).await
}

/// Spawns the redemption service using the provided [`RedemptionConfig`].
///
/// Refuses to start a chain backend without a usable signing key.
pub async fn try_spawn(config: RedemptionConfig) -> eyre::Result<RedemptionHandle> {
    let redeemer: Arc<dyn Redeemer> = match config.redeemer {
        RedeemerKind::Mock => {
            warn!("Using the mock redeemer. Redemptions are not submitted on-chain!");
            Arc::new(MockRedeemer::default())
        }
        RedeemerKind::Chain => Arc::new(chain_redeemer(&config).await?),
    };

    try_spawn_with_redeemer(config, redeemer).await
}

/// Spawns the redemption service with an already constructed [`Redeemer`].
pub async fn try_spawn_with_redeemer(
    config: RedemptionConfig,
    redeemer: Arc<dyn Redeemer>,
) -> eyre::Result<RedemptionHandle> {
    let metrics =
        metrics::setup_exporter((config.server.address, config.server.metrics_port)).await?;

    let service = RedemptionService::new(
        DelegationCodec::new(config.chain_order),
        DelegationValidator::new(config.delegation_domain(), config.contracts.timestamp_enforcer),
        redeemer,
    );
    let cancel = CancellationToken::new();
    let rpc = Redemption::new(service, cancel.clone()).into_rpc();

    // http layers
    let cors = CorsLayer::new()
        .allow_methods(AllowMethods::any())
        .allow_origin(AllowOrigin::any())
        .allow_headers([header::CONTENT_TYPE]);

    // start server
    let server = Server::builder()
        .set_config(
            ServerConfig::builder()
                .http_only()
                .max_connections(config.server.max_connections)
                .build(),
        )
        .set_http_middleware(
            ServiceBuilder::new()
                .layer(cors)
                .layer(ProxyGetRequestLayer::new([("/health", "health")])?),
        )
        .build((config.server.address, config.server.port))
        .await?;
    let addr = server.local_addr()?;
    info!(
        %addr,
        chain_id = config.chain.id,
        chain_order = ?config.chain_order,
        redeemer = ?config.redeemer,
        "Started redemption service"
    );

    Ok(RedemptionHandle { local_addr: addr, server: server.start(rpc), metrics, cancel })
}

/// Builds the [`ChainRedeemer`] described by `config`.
async fn chain_redeemer(config: &RedemptionConfig) -> eyre::Result<ChainRedeemer> {
    let bundler_url = config.bundler.url.clone().ok_or(ConfigError::Missing("bundler.url"))?;
    let endpoint = config.chain.endpoint.clone().ok_or(ConfigError::Missing("chain.endpoint"))?;
    let signer = DynSigner::load(&config.secrets.signer_key, Some(config.chain.id)).await?;

    let client =
        ClientBuilder::default().layer(RETRY_LAYER.clone()).connect(endpoint.as_str()).await?;
    let provider = ProviderBuilder::new().connect_client(client).erased();

    let remote_chain_id = provider.get_chain_id().await?;
    if remote_chain_id != config.chain.id {
        warn!(configured = config.chain.id, remote = remote_chain_id, "Chain id mismatch");
    }

    let submitter_config = config.submitter_config();
    info!(
        chain_id = submitter_config.chain_id,
        sender = %submitter_config.sender,
        signer = %signer.address(),
        bundler = %bundler_url,
        "Submitting redemptions on-chain"
    );

    let mut submitter = RedemptionSubmitter::new(
        submitter_config,
        Arc::new(HttpBundler::new(bundler_url, config.bundler.timeout)),
        Arc::new(provider),
        Arc::new(signer),
    );
    if let Some(paymaster_url) = config.bundler.paymaster_url.clone() {
        info!(paymaster = %paymaster_url, "Sponsoring user operations");
        submitter = submitter
            .with_paymaster(Arc::new(HttpPaymaster::new(paymaster_url, config.bundler.timeout)));
    }

    Ok(ChainRedeemer::new(submitter))
}
