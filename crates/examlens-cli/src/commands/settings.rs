//! The `examlens settings` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use examlens_core::settings::extract_settings;
use examlens_providers::config::load_config_from;

pub async fn execute(text: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let notice = std::fs::read_to_string(&text)
        .with_context(|| format!("failed to read {}", text.display()))?;

    let extractor = super::build_extractor(&config)?;
    let result = extract_settings(&extractor, &notice).await;
    if result.defaulted {
        eprintln!(
            "Warning: settings could not be extracted after {} attempt(s)",
            result.attempts
        );
    }

    println!("{}", serde_json::to_string_pretty(&result.value)?);
    Ok(())
}
