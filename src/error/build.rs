use super::ErrorCategory;
use thiserror::Error;

/// Errors building the redemption call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// `chains`, `modes` and `executions` differ in length.
    #[error("got {chains} chains, {modes} modes and {executions} execution sets")]
    ArityMismatch {
        /// Number of delegation chains.
        chains: usize,
        /// Number of modes.
        modes: usize,
        /// Number of execution sets.
        executions: usize,
    },
    /// A mode string is not recognized.
    #[error("invalid mode {mode:?} at index {index}")]
    InvalidMode {
        /// Index of the mode.
        index: usize,
        /// The offending mode string.
        mode: String,
    },
    /// An execution set is empty and no payment terms fill it.
    #[error("no executions at index {index}")]
    EmptyExecutions {
        /// Index of the execution set.
        index: usize,
    },
    /// A single mode redemption has more than one execution.
    #[error("single mode at index {index} takes exactly one execution, got {got}")]
    SingleModeArity {
        /// Index of the execution set.
        index: usize,
        /// Number of executions supplied.
        got: usize,
    },
    /// The price is not an integer amount.
    #[error("invalid price {0:?}")]
    InvalidPrice(String),
}

impl BuildError {
    /// The category this error is reported under.
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::ArityMismatch { .. } => ErrorCategory::ArityMismatch,
            Self::InvalidMode { .. }
            | Self::EmptyExecutions { .. }
            | Self::SingleModeArity { .. }
            | Self::InvalidPrice(_) => ErrorCategory::MalformedPayload,
        }
    }
}
