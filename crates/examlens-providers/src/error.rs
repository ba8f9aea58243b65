//! Provider error types.

use thiserror::Error;

pub use examlens_core::error::OracleError;

/// Errors selecting or building a backend from configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No provider with this name is configured.
    #[error("provider '{0}' is not configured (add [providers.{0}] to examlens.toml)")]
    UnknownProvider(String),

    /// The provider needs an API key and none was found.
    #[error("provider '{0}' has no API key (set api_key or EXAMLENS_API_KEY)")]
    MissingApiKey(String),
}
