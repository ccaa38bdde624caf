//! RPC related end-to-end test cases

use crate::redemption::environment::{SMART_ACCOUNT, request, signed_chain};
use jsonrpsee::{
    core::client::ClientT,
    http_client::{HttpClient, HttpClientBuilder},
    rpc_params,
};
use redeemer::{
    config::RedemptionConfig,
    redeemer::{MockRedeemer, RedeemerKind},
    rpc::{RedemptionApiClient, VERSION},
    spawn::{RedemptionHandle, try_spawn, try_spawn_with_redeemer},
    types::{
        ChainOrder, WireDelegation,
        rpc::{DelegationChainPayload, RedeemDelegationResponse},
    },
};
use std::sync::Arc;
use url::Url;

fn config() -> RedemptionConfig {
    RedemptionConfig::default().with_port(0).with_metrics_port(0)
}

async fn spawn(
    config: RedemptionConfig,
) -> eyre::Result<(RedemptionHandle, HttpClient, Arc<MockRedeemer>)> {
    let redeemer = Arc::new(MockRedeemer::default());
    let handle = try_spawn_with_redeemer(config, redeemer.clone()).await?;
    let client = HttpClientBuilder::default().build(handle.http_url())?;
    Ok((handle, client, redeemer))
}

#[tokio::test(flavor = "multi_thread")]
async fn health() -> eyre::Result<()> {
    let (handle, client, _) = spawn(config()).await?;

    let health = client.health().await?;
    assert_eq!(health.status, "rpc ok");
    assert_eq!(health.version, VERSION);

    handle.shutdown()?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn redeem_over_rpc() -> eyre::Result<()> {
    let (handle, client, redeemer) = spawn(config()).await?;
    let chain = signed_chain(2, SMART_ACCOUNT);

    let response = client.redeem_delegation(request(&chain)).await?;
    assert!(response.success, "{}", response.error_message);
    assert_eq!(response.transaction_hash.len(), 66);
    assert!(response.error_message.is_empty());

    // the unqualified alias serves the same method
    let aliased: RedeemDelegationResponse =
        client.request("RedeemDelegation", rpc_params![request(&chain)]).await?;
    assert_eq!(aliased, response);
    assert_eq!(redeemer.redemptions(), 2);

    handle.shutdown()?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn failures_are_reported_in_response() -> eyre::Result<()> {
    let (handle, client, redeemer) = spawn(config()).await?;
    let chain = signed_chain(1, SMART_ACCOUNT);

    let mut arity = request(&chain);
    arity.modes.push("batch".to_string());
    let response = client.redeem_delegation(arity).await?;
    assert!(!response.success);
    assert!(response.transaction_hash.is_empty());
    assert!(response.error_message.starts_with("ArityMismatch: "), "{}", response.error_message);

    let mut mode = request(&chain);
    mode.modes = vec!["try".to_string()];
    let response = client.redeem_delegation(mode).await?;
    assert!(response.error_message.starts_with("MalformedPayload: "), "{}", response.error_message);

    assert_eq!(redeemer.redemptions(), 0);
    handle.shutdown()?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn configured_chain_order() -> eyre::Result<()> {
    let (handle, client, _) = spawn(config().with_chain_order(ChainOrder::LeafFirst)).await?;
    let chain = signed_chain(2, SMART_ACCOUNT);

    let mut leaf_first = request(&chain);
    leaf_first.delegation_chains = vec![DelegationChainPayload::Delegations(
        chain.iter().rev().map(WireDelegation::from).collect(),
    )];
    let response = client.redeem_delegation(leaf_first).await?;
    assert!(response.success, "{}", response.error_message);

    let response = client.redeem_delegation(request(&chain)).await?;
    assert!(response.error_message.starts_with("BrokenChain: "), "{}", response.error_message);

    handle.shutdown()?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn chain_redeemer_requires_key() -> eyre::Result<()> {
    let url: Url = "http://127.0.0.1:1".parse()?;

    let missing = try_spawn(config().with_redeemer(RedeemerKind::Chain)).await.unwrap_err();
    assert!(missing.to_string().contains("bundler.url"), "{missing}");

    let no_key = try_spawn(
        config()
            .with_redeemer(RedeemerKind::Chain)
            .with_bundler_url(Some(url.clone()))
            .with_endpoint(Some(url)),
    )
    .await
    .unwrap_err();
    assert!(no_key.to_string().starts_with("KeyUnavailable"), "{no_key}");
    Ok(())
}
