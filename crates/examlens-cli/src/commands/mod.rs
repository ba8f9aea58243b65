pub mod analyze;
pub mod chart;
pub mod grade;
pub mod init;
pub mod list_models;
pub mod segment;
pub mod settings;
pub mod verify;

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

use examlens_core::extraction::Extractor;
use examlens_providers::{create_oracle, ExamlensConfig};

/// Build an extractor over the configured default provider.
pub fn build_extractor(config: &ExamlensConfig) -> Result<Extractor> {
    let (name, provider) = config.provider(None)?;
    let oracle = create_oracle(name, provider)?;
    tracing::debug!(provider = name, model = %config.default_model, "oracle ready");
    Ok(Extractor::new(oracle, config.extractor_config()))
}

/// Read and deserialize a JSON input file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}
