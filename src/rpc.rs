//! The `redemption_` RPC namespace.

use crate::{
    service::RedemptionService,
    types::rpc::{Health, RedeemDelegationRequest, RedeemDelegationResponse},
};
use jsonrpsee::{core::RpcResult, proc_macros::rpc};
use tokio_util::sync::CancellationToken;

/// The version reported by `health`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Delegation redemption RPC namespace.
#[rpc(server, client, namespace = "redemption")]
pub trait RedemptionApi {
    /// Checks the health of the service and returns its version.
    #[method(name = "health", aliases = ["health"])]
    async fn health(&self) -> RpcResult<Health>;

    /// Redeems one or more delegation chains in a single user operation.
    ///
    /// Always succeeds at the transport level. Failures are reported in the response.
    #[method(name = "redeemDelegation", aliases = ["RedeemDelegation"])]
    async fn redeem_delegation(
        &self,
        request: RedeemDelegationRequest,
    ) -> RpcResult<RedeemDelegationResponse>;
}

/// Implementation of [`RedemptionApiServer`].
#[derive(Debug, Clone)]
pub struct Redemption {
    service: RedemptionService,
    shutdown: CancellationToken,
}

impl Redemption {
    /// Creates a new [`Redemption`] RPC handler.
    ///
    /// Cancelling `shutdown` cancels all in-flight redemptions.
    pub const fn new(service: RedemptionService, shutdown: CancellationToken) -> Self {
        Self { service, shutdown }
    }
}

#[async_trait::async_trait]
impl RedemptionApiServer for Redemption {
    async fn health(&self) -> RpcResult<Health> {
        Ok(Health { status: "rpc ok".into(), version: VERSION.into() })
    }

    async fn redeem_delegation(
        &self,
        request: RedeemDelegationRequest,
    ) -> RpcResult<RedeemDelegationResponse> {
        let cancel = self.shutdown.child_token();
        Ok(self.service.redeem(request, &cancel).await.into())
    }
}
