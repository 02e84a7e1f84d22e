//! TOML configuration parsing and validation.
//!
//! Every section except `[db]` is optional and falls back to defaults, so a
//! two-line config file is enough to run `repo-rag init`. Validation happens
//! once in [`load_config`]; the rest of the crate trusts the values.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Remote model settings shared by summarize, embed, and generate calls.
#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub chat_model: Option<String>,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (e.g. an OpenAI-compatible gateway or a remote Ollama).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            chat_model: None,
            embedding_model: None,
            dims: None,
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ModelConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub skip_existing: bool,
    #[serde(default)]
    pub extra_skip_globs: Vec<String>,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            concurrency: default_concurrency(),
            call_timeout_secs: default_call_timeout_secs(),
            delay_ms: 0,
            skip_existing: false,
            extra_skip_globs: Vec::new(),
        }
    }
}

fn default_max_file_bytes() -> usize {
    100_000
}
fn default_concurrency() -> usize {
    8
}
fn default_call_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
    #[serde(default = "default_source_preview_chars")]
    pub source_preview_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
            source_preview_chars: default_source_preview_chars(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_max_top_k() -> usize {
    20
}
fn default_source_preview_chars() -> usize {
    2000
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Name of the environment variable holding the access token, if any.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_commit_limit")]
    pub commit_limit: usize,
    /// Where `GitCloneLoader` keeps its checkouts. Defaults next to the DB file.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token_env: default_token_env(),
            commit_limit: default_commit_limit(),
            cache_dir: None,
        }
    }
}

impl GithubConfig {
    /// Reads the access token from the configured environment variable.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_commit_limit() -> usize {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Config {
    /// A config with every section at its default and the database in the
    /// working directory. Used by tests and by callers that build a config
    /// in code.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/repo-rag.sqlite"),
            },
            model: ModelConfig::default(),
            indexing: IndexingConfig::default(),
            retrieval: RetrievalConfig::default(),
            github: GithubConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    match config.model.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown model provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    if config.model.is_enabled() {
        if config.model.dims.is_none() || config.model.dims == Some(0) {
            bail!(
                "model.dims must be > 0 when provider is '{}'",
                config.model.provider
            );
        }
        if config.model.chat_model.is_none() {
            bail!(
                "model.chat_model must be specified when provider is '{}'",
                config.model.provider
            );
        }
        if config.model.embedding_model.is_none() {
            bail!(
                "model.embedding_model must be specified when provider is '{}'",
                config.model.provider
            );
        }
    }

    if config.indexing.max_file_bytes == 0 {
        bail!("indexing.max_file_bytes must be > 0");
    }
    if config.indexing.concurrency == 0 {
        bail!("indexing.concurrency must be > 0");
    }

    let retrieval = &config.retrieval;
    if retrieval.max_top_k == 0 {
        bail!("retrieval.max_top_k must be >= 1");
    }
    if retrieval.default_top_k == 0 || retrieval.default_top_k > retrieval.max_top_k {
        bail!(
            "retrieval.default_top_k must be in [1, {}]",
            retrieval.max_top_k
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_file_uses_defaults() {
        let config = parse("[db]\npath = \"x.sqlite\"\n").unwrap();
        assert_eq!(config.model.provider, "disabled");
        assert_eq!(config.retrieval.default_top_k, 5);
        assert_eq!(config.retrieval.max_top_k, 20);
        assert_eq!(config.indexing.max_file_bytes, 100_000);
        assert!(!config.indexing.skip_existing);
    }

    #[test]
    fn test_enabled_provider_requires_dims() {
        let err = parse(
            r#"
            [db]
            path = "x.sqlite"
            [model]
            provider = "openai"
            chat_model = "gpt-4o-mini"
            embedding_model = "text-embedding-3-small"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("model.dims"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = parse("[db]\npath = \"x\"\n[model]\nprovider = \"bard\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown model provider"));
    }

    #[test]
    fn test_default_top_k_must_fit_max() {
        let err = parse("[db]\npath = \"x\"\n[retrieval]\ndefault_top_k = 30\n").unwrap_err();
        assert!(err.to_string().contains("default_top_k"));
    }

    #[test]
    fn test_full_ollama_config() {
        let config = parse(
            r#"
            [db]
            path = "x.sqlite"
            [model]
            provider = "ollama"
            chat_model = "llama3.1"
            embedding_model = "nomic-embed-text"
            dims = 768
            [indexing]
            concurrency = 2
            skip_existing = true
            "#,
        )
        .unwrap();
        assert!(config.model.is_enabled());
        assert_eq!(config.model.dims, Some(768));
        assert_eq!(config.indexing.concurrency, 2);
        assert!(config.indexing.skip_existing);
    }
}
