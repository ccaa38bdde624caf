//! Builds the delegation manager call that redeems a set of chains.

use crate::{
    error::BuildError,
    types::{
        ChainOrder, DelegationChain, Execution, Mode, PaymentTerms,
        contracts::IDelegationManager,
    },
};
use alloy::{
    primitives::Bytes,
    sol_types::{SolCall, SolValue},
};

/// Encodes validated chains and their executions into `redeemDelegations` calldata.
///
/// The output only depends on the inputs, so identical requests produce identical bytes.
#[derive(Debug, Clone, Default)]
pub struct ExecutionBuilder {
    payment: Option<PaymentTerms>,
}

impl ExecutionBuilder {
    /// Sets the payment that fills empty execution sets.
    pub fn with_payment(mut self, payment: Option<PaymentTerms>) -> Self {
        self.payment = payment;
        self
    }

    /// Checks that the index-aligned arrays have the same length.
    pub const fn check_arity(
        chains: usize,
        modes: usize,
        executions: usize,
    ) -> Result<(), BuildError> {
        if chains != modes || chains != executions {
            return Err(BuildError::ArityMismatch { chains, modes, executions });
        }
        Ok(())
    }

    /// Parses the mode strings of a request.
    pub fn parse_modes<S: AsRef<str>>(modes: &[S]) -> Result<Vec<Mode>, BuildError> {
        modes
            .iter()
            .enumerate()
            .map(|(index, mode)| {
                mode.as_ref()
                    .parse()
                    .map_err(|_| BuildError::InvalidMode { index, mode: mode.as_ref().to_string() })
            })
            .collect()
    }

    /// Builds the `redeemDelegations` calldata.
    ///
    /// Each chain becomes a leaf-first `abi.encode(Delegation[])` permission context.
    pub fn build(
        &self,
        chains: &[DelegationChain],
        modes: &[Mode],
        executions: &[Vec<Execution>],
    ) -> Result<Bytes, BuildError> {
        Self::check_arity(chains.len(), modes.len(), executions.len())?;

        let mut permission_contexts = Vec::with_capacity(chains.len());
        let mut mode_codes = Vec::with_capacity(chains.len());
        let mut execution_call_datas = Vec::with_capacity(chains.len());

        for (index, ((chain, mode), executions)) in
            chains.iter().zip(modes).zip(executions).enumerate()
        {
            let filled;
            let executions = match (executions.is_empty(), &self.payment) {
                (false, _) => executions.as_slice(),
                (true, Some(payment)) => {
                    filled = [payment.execution()];
                    &filled[..]
                }
                (true, None) => return Err(BuildError::EmptyExecutions { index }),
            };
            if *mode == Mode::Single && executions.len() != 1 {
                return Err(BuildError::SingleModeArity { index, got: executions.len() });
            }

            permission_contexts
                .push(Bytes::from(chain.to_wire_order(ChainOrder::LeafFirst).abi_encode()));
            mode_codes.push(mode.code());
            execution_call_datas.push(mode.encode_executions(executions));
        }

        Ok(IDelegationManager::redeemDelegationsCall {
            permissionContexts: permission_contexts,
            modes: mode_codes,
            executionCallDatas: execution_call_datas,
        }
        .abi_encode()
        .into())
    }
}
