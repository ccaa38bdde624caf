use thiserror::Error;

/// Errors raised while loading configuration and key material at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No usable signer key was configured.
    #[error("KeyUnavailable: {0}")]
    KeyUnavailable(String),
    /// A setting required by the configured redeemer is missing.
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
}
