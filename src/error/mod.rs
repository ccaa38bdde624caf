//! Redemption error types.
//!
//! Every failure a request can hit maps onto one [`ErrorCategory`]. The category name prefixes
//! the `error_message` returned to callers.
use core::fmt;
use thiserror::Error;

mod build;
pub use build::BuildError;

mod config;
pub use config::ConfigError;

mod delegation;
pub use delegation::DelegationError;

mod submit;
pub use submit::SubmitError;

/// The externally visible error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The payload could not be decoded.
    MalformedPayload,
    /// A required field is empty.
    MissingField,
    /// A delegation does not reference its parent.
    BrokenChain,
    /// A delegation has expired.
    Expired,
    /// A signature does not recover to its delegator.
    InvalidSignature,
    /// Index-aligned request arrays differ in length.
    ArityMismatch,
    /// The user operation could not be submitted or reverted.
    SubmissionError,
    /// The user operation was not included in time.
    Timeout,
    /// The request was cancelled.
    Cancelled,
    /// Key material is missing or unusable.
    KeyUnavailable,
}

impl ErrorCategory {
    /// The category name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedPayload => "MalformedPayload",
            Self::MissingField => "MissingField",
            Self::BrokenChain => "BrokenChain",
            Self::Expired => "Expired",
            Self::InvalidSignature => "InvalidSignature",
            Self::ArityMismatch => "ArityMismatch",
            Self::SubmissionError => "SubmissionError",
            Self::Timeout => "Timeout",
            Self::Cancelled => "Cancelled",
            Self::KeyUnavailable => "KeyUnavailable",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The overarching error type of a redemption.
#[derive(Debug, Error)]
pub enum RedemptionError {
    /// A delegation chain failed to decode or validate.
    #[error("chain {chain}: {source}")]
    Delegation {
        /// Index of the offending chain in the request.
        chain: usize,
        /// The underlying error.
        #[source]
        source: DelegationError,
    },
    /// The redemption call could not be built.
    #[error(transparent)]
    Build(#[from] BuildError),
    /// The user operation could not be submitted or confirmed.
    #[error(transparent)]
    Submit(#[from] SubmitError),
}

impl RedemptionError {
    /// Wraps a [`DelegationError`] of the chain at index `chain`.
    pub const fn delegation(chain: usize, source: DelegationError) -> Self {
        Self::Delegation { chain, source }
    }

    /// The category this error is reported under.
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Delegation { source, .. } => source.category(),
            Self::Build(err) => err.category(),
            Self::Submit(err) => err.category(),
        }
    }

    /// Formats the error as `"<Category>: <detail>"`.
    pub fn to_error_message(&self) -> String {
        format!("{}: {self}", self.category())
    }
}
