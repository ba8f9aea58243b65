//! The `examlens list-models` command.

use std::path::PathBuf;

use anyhow::Result;

use examlens_core::traits::ModelInfo;
use examlens_providers::config::load_config_from;
use examlens_providers::ollama::OllamaOracle;
use examlens_providers::{create_oracle, ProviderConfig};

pub async fn execute(provider_filter: Option<String>, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;

    let mut names: Vec<&String> = config.providers.keys().collect();
    names.sort();

    let mut found_any = false;

    for name in names {
        if provider_filter.as_ref().is_some_and(|filter| filter != name) {
            continue;
        }
        let provider_config = &config.providers[name];

        let models: Vec<ModelInfo> = match provider_config {
            ProviderConfig::Ollama { base_url } => {
                match OllamaOracle::new(base_url)?.list_models_async().await {
                    Ok(models) => models,
                    Err(e) => {
                        eprintln!("Warning: {name}: {e:#}");
                        continue;
                    }
                }
            }
            other => match create_oracle(name, other) {
                Ok(oracle) => oracle.available_models(),
                Err(e) => {
                    eprintln!("Warning: {name}: {e:#}");
                    continue;
                }
            },
        };

        if !models.is_empty() {
            found_any = true;
            let marker = if *name == config.default_provider {
                " (default)"
            } else {
                ""
            };
            println!("Provider: {name}{marker}");
            for model in &models {
                if model.max_context > 0 {
                    println!(
                        "  {} — {} ({}K context)",
                        model.id,
                        model.name,
                        model.max_context / 1000
                    );
                } else {
                    println!("  {} — {}", model.id, model.name);
                }
            }
            println!();
        }
    }

    if !found_any {
        println!("No providers configured. Run `examlens init` to create a config file.");
    }

    Ok(())
}
