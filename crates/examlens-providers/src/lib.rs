//! examlens-providers — text oracle backends.
//!
//! Implements the `Oracle` trait for OpenAI-compatible chat APIs (DeepSeek,
//! OpenAI, vLLM, ...) and Ollama, and builds the configured backend from
//! `examlens.toml`.

pub mod config;
pub mod error;
pub mod ollama;
pub mod openai;

pub use config::{create_oracle, load_config, load_config_from, ExamlensConfig, ProviderConfig};
pub use error::{ConfigError, OracleError};
pub use examlens_core::mock::MockOracle;
