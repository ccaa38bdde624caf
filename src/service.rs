//! The redemption facade.

use crate::{
    builder::ExecutionBuilder,
    codec::DelegationCodec,
    error::RedemptionError,
    redeemer::Redeemer,
    types::{
        DelegationChain, PaymentTerms,
        rpc::{DelegationChainPayload, RedeemDelegationRequest, RedemptionResult},
    },
    validator::DelegationValidator,
};
use alloy::primitives::B256;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Decodes, validates, builds and redeems delegation requests.
#[derive(Debug, Clone)]
pub struct RedemptionService {
    codec: DelegationCodec,
    validator: DelegationValidator,
    redeemer: Arc<dyn Redeemer>,
}

impl RedemptionService {
    /// Creates a new [`RedemptionService`].
    pub fn new(
        codec: DelegationCodec,
        validator: DelegationValidator,
        redeemer: Arc<dyn Redeemer>,
    ) -> Self {
        Self { codec, validator, redeemer }
    }

    /// Redeems `request` against the current time.
    pub async fn redeem(
        &self,
        request: RedeemDelegationRequest,
        cancel: &CancellationToken,
    ) -> RedemptionResult {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        self.redeem_at(request, now, cancel).await
    }

    /// Redeems `request`, checking expiries against `now`.
    ///
    /// Never fails: errors are reported through [`RedemptionResult::error_message`].
    #[instrument(skip_all, fields(chains = request.delegation_chains.len()))]
    pub async fn redeem_at(
        &self,
        request: RedeemDelegationRequest,
        now: u64,
        cancel: &CancellationToken,
    ) -> RedemptionResult {
        match self.try_redeem(request, now, cancel).await {
            Ok(transaction_hash) => {
                info!(%transaction_hash, "Redeemed delegations");
                RedemptionResult::confirmed(transaction_hash)
            }
            Err(err) => {
                let message = err.to_error_message();
                warn!(category = %err.category(), %err, "Redemption failed");
                RedemptionResult::failed(message)
            }
        }
    }

    async fn try_redeem(
        &self,
        request: RedeemDelegationRequest,
        now: u64,
        cancel: &CancellationToken,
    ) -> Result<B256, RedemptionError> {
        let RedeemDelegationRequest {
            delegation_chains,
            modes,
            executions,
            merchant_address,
            token_contract_address,
            price,
            idempotency_key,
        } = request;

        ExecutionBuilder::check_arity(delegation_chains.len(), modes.len(), executions.len())?;

        let chains = delegation_chains
            .into_iter()
            .enumerate()
            .map(|(index, payload)| self.decode_and_validate(index, payload, now))
            .collect::<Result<Vec<_>, _>>()?;

        let modes = ExecutionBuilder::parse_modes(&modes)?;
        let payment =
            PaymentTerms::from_request(merchant_address, token_contract_address, price.as_deref())?;
        if payment.is_some() && executions.iter().all(|set| !set.is_empty()) {
            debug!("Payment terms unused, every execution set is non-empty");
        }
        let call_data =
            ExecutionBuilder::default().with_payment(payment).build(&chains, &modes, &executions)?;

        Ok(self.redeemer.redeem(call_data, idempotency_key.as_deref(), cancel).await?)
    }

    fn decode_and_validate(
        &self,
        index: usize,
        payload: DelegationChainPayload,
        now: u64,
    ) -> Result<DelegationChain, RedemptionError> {
        let chain = match payload {
            DelegationChainPayload::Delegations(delegations) => {
                self.codec.chain_from_wire(delegations)
            }
            DelegationChainPayload::Encoded(bytes) => {
                self.codec.decode(&bytes).map_err(|err| RedemptionError::delegation(index, err))?
            }
        };
        self.validator.validate(&chain, now).map_err(|err| RedemptionError::delegation(index, err))?;
        Ok(chain)
    }
}
