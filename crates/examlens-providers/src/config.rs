//! Configuration and oracle factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use examlens_core::analyzer::AnalyzerConfig;
use examlens_core::extraction::ExtractorConfig;
use examlens_core::mock::MockOracle;
use examlens_core::traits::Oracle;
use examlens_core::verify::VerifyConfig;

use crate::error::ConfigError;
use crate::ollama::OllamaOracle;
use crate::openai::OpenAiOracle;

/// Configuration for a single oracle backend.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    /// Any OpenAI-compatible chat completions API.
    #[serde(rename = "openai")]
    OpenAI {
        #[serde(default)]
        api_key: String,
        /// Base URL including the version segment, e.g. `https://api.deepseek.com/v1`.
        #[serde(default)]
        base_url: Option<String>,
    },
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
    },
    /// Scripted replies, for dry runs and tests.
    Mock {
        #[serde(default)]
        routes: Vec<MockRoute>,
        #[serde(default)]
        fallback: Option<String>,
    },
}

/// A scripted reply for prompts containing `contains`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockRoute {
    pub contains: String,
    pub reply: String,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::OpenAI {
                api_key: _,
                base_url,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Ollama { base_url } => f
                .debug_struct("Ollama")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Mock { routes, fallback } => f
                .debug_struct("Mock")
                .field("routes", &routes.len())
                .field("fallback", fallback)
                .finish(),
        }
    }
}

fn default_ollama_url() -> String {
    crate::ollama::DEFAULT_BASE_URL.to_string()
}

/// Top-level examlens configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamlensConfig {
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Provider used when none is named.
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Model passed to the provider.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Sampling temperature (0.0 for repeatable extraction).
    #[serde(default)]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Oracle attempts per structured extraction.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Timeout for each oracle attempt.
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,
    /// Upper bound on verification steps in the verify-fix loop.
    #[serde(default = "default_max_fix_attempts")]
    pub max_fix_attempts: u32,
    /// Ask the oracle to refine preliminary topic mastery.
    #[serde(default = "default_true")]
    pub refine_mastery: bool,
    /// Prompts longer than this many characters are truncated.
    #[serde(default = "default_prompt_char_limit")]
    pub prompt_char_limit: usize,
    /// Max answer sheets analyzed concurrently.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Output directory for reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "deepseek-chat".to_string()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_max_attempts() -> u32 {
    3
}
fn default_attempt_timeout() -> u64 {
    120
}
fn default_max_fix_attempts() -> u32 {
    3
}
fn default_true() -> bool {
    true
}
fn default_prompt_char_limit() -> usize {
    8000
}
fn default_parallelism() -> usize {
    4
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./examlens-reports")
}

impl Default for ExamlensConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider(),
            default_model: default_model(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            max_attempts: default_max_attempts(),
            attempt_timeout_secs: default_attempt_timeout(),
            max_fix_attempts: default_max_fix_attempts(),
            refine_mastery: true,
            prompt_char_limit: default_prompt_char_limit(),
            parallelism: default_parallelism(),
            output_dir: default_output_dir(),
        }
    }
}

impl ExamlensConfig {
    pub fn extractor_config(&self) -> ExtractorConfig {
        ExtractorConfig {
            model: self.default_model.clone(),
            system_prompt: None,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            max_attempts: self.max_attempts,
            attempt_timeout: Duration::from_secs(self.attempt_timeout_secs),
        }
    }

    pub fn analyzer_config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            refine_mastery: self.refine_mastery,
            prompt_char_limit: self.prompt_char_limit,
            ..AnalyzerConfig::default()
        }
    }

    pub fn verify_config(&self) -> VerifyConfig {
        VerifyConfig {
            max_fix_attempts: self.max_fix_attempts,
        }
    }

    /// Look up a provider by name, or the default provider.
    pub fn provider(&self, name: Option<&str>) -> Result<(&str, &ProviderConfig), ConfigError> {
        let name = name.unwrap_or(&self.default_provider);
        self.providers
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| ConfigError::UnknownProvider(name.to_string()))
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Resolve env vars in a provider config.
fn resolve_provider_config(config: &ProviderConfig) -> ProviderConfig {
    match config {
        ProviderConfig::OpenAI { api_key, base_url } => ProviderConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
        },
        ProviderConfig::Ollama { base_url } => ProviderConfig::Ollama {
            base_url: resolve_env_vars(base_url),
        },
        ProviderConfig::Mock { .. } => config.clone(),
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `examlens.toml` in the current directory
/// 2. `~/.config/examlens/config.toml`
///
/// Environment variable overrides: `EXAMLENS_API_KEY`, `EXAMLENS_MODEL`.
pub fn load_config() -> Result<ExamlensConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<ExamlensConfig> {
    let config_path = find_config(path, Path::new("."), dirs_path())?;

    let config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            parse_config(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => ExamlensConfig::default(),
    };

    Ok(apply_env_overrides(
        config,
        std::env::var("EXAMLENS_API_KEY").ok(),
        std::env::var("EXAMLENS_MODEL").ok(),
    ))
}

/// Pick the config file: the explicit path (which must exist), else
/// `examlens.toml` in `cwd`, else `config.toml` in `global_dir`.
fn find_config(
    explicit: Option<&Path>,
    cwd: &Path,
    global_dir: Option<PathBuf>,
) -> Result<Option<PathBuf>> {
    if let Some(p) = explicit {
        anyhow::ensure!(p.exists(), "config file not found: {}", p.display());
        return Ok(Some(p.to_path_buf()));
    }

    let local = cwd.join("examlens.toml");
    if local.exists() {
        return Ok(Some(local));
    }
    Ok(global_dir
        .map(|dir| dir.join("config.toml"))
        .filter(|global| global.exists()))
}

/// Parse a config file's contents.
pub fn parse_config(content: &str) -> Result<ExamlensConfig> {
    Ok(toml::from_str(content)?)
}

fn apply_env_overrides(
    mut config: ExamlensConfig,
    api_key: Option<String>,
    model: Option<String>,
) -> ExamlensConfig {
    if let Some(key) = api_key.filter(|k| !k.is_empty()) {
        let entry = config
            .providers
            .entry("openai".into())
            .or_insert(ProviderConfig::OpenAI {
                api_key: String::new(),
                base_url: None,
            });
        if let ProviderConfig::OpenAI { api_key, .. } = entry {
            *api_key = key;
        }
    }

    if let Some(model) = model.filter(|m| !m.is_empty()) {
        config.default_model = model;
    }

    config.providers = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_provider_config(v)))
        .collect();

    config
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("examlens"))
}

/// Create an oracle instance from its configuration.
pub fn create_oracle(name: &str, config: &ProviderConfig) -> Result<Arc<dyn Oracle>> {
    match config {
        ProviderConfig::OpenAI { api_key, base_url } => {
            if api_key.trim().is_empty() {
                return Err(ConfigError::MissingApiKey(name.to_string()).into());
            }
            Ok(Arc::new(OpenAiOracle::new(api_key, base_url.clone())?))
        }
        ProviderConfig::Ollama { base_url } => Ok(Arc::new(OllamaOracle::new(base_url)?)),
        ProviderConfig::Mock { routes, fallback } => {
            let mut mock = MockOracle::new();
            for route in routes {
                mock = mock.with_route(&route.contains, &route.reply);
            }
            if let Some(fallback) = fallback {
                mock = mock.with_fallback(fallback);
            }
            Ok(Arc::new(mock))
        }
    }
}
