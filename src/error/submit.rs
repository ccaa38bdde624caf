use super::ErrorCategory;
use crate::submitter::EndpointError;
use alloy::primitives::B256;
use std::time::Duration;
use thiserror::Error;

/// Errors submitting a redemption as a user operation.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Nonce, fees or gas limits could not be obtained.
    #[error("failed to build user operation: {0}")]
    Building(#[source] EndpointError),
    /// The paymaster refused to sponsor the operation.
    #[error("paymaster rejected sponsorship: {0}")]
    Sponsorship(#[source] EndpointError),
    /// The process key could not sign the operation.
    #[error("failed to sign user operation: {0}")]
    Signing(#[from] alloy::signers::Error),
    /// The bundler did not accept the operation.
    #[error("bundler rejected user operation after {attempts} attempt(s): {source}")]
    Submission {
        /// Number of send attempts made.
        attempts: u32,
        /// The last error returned.
        #[source]
        source: EndpointError,
    },
    /// The operation was included but its execution reverted.
    #[error(
        "user operation {user_op_hash} reverted in {transaction_hash}{}",
        .reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default()
    )]
    Reverted {
        /// The user operation hash.
        user_op_hash: B256,
        /// The including transaction.
        transaction_hash: B256,
        /// Revert reason reported by the bundler.
        reason: Option<String>,
    },
    /// The operation was not included before the receipt timeout.
    ///
    /// The operation may still land later.
    #[error("user operation {user_op_hash} not included within {timeout:?}")]
    Timeout {
        /// The user operation hash.
        user_op_hash: B256,
        /// The receipt timeout.
        timeout: Duration,
    },
    /// The request was cancelled.
    #[error(
        "request cancelled{}",
        .user_op_hash.map(|h| format!(" while awaiting user operation {h}")).unwrap_or_default()
    )]
    Cancelled {
        /// The broadcast user operation, if cancelled while pending.
        user_op_hash: Option<B256>,
    },
}

impl SubmitError {
    /// The category this error is reported under.
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Building(_)
            | Self::Sponsorship(_)
            | Self::Submission { .. }
            | Self::Reverted { .. } => ErrorCategory::SubmissionError,
            Self::Signing(_) => ErrorCategory::KeyUnavailable,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Cancelled { .. } => ErrorCategory::Cancelled,
        }
    }

    /// Whether the operation may have been broadcast.
    pub const fn is_after_broadcast(&self) -> bool {
        matches!(
            self,
            Self::Reverted { .. } | Self::Timeout { .. } | Self::Cancelled { user_op_hash: Some(_) }
        )
    }
}
