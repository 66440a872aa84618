//! TOML configuration with environment overrides.
//!
//! Secrets never live in the file: the vector store endpoint and key, and
//! the generation provider keys, are read from the environment so that a
//! checked-in `rfp.toml` stays safe to share. Absent secrets do not fail
//! loading; they leave the corresponding component in its degraded mode.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// `memory`, `weaviate`, or `disabled`.
    #[serde(default = "default_store_provider")]
    pub provider: String,
    /// Snapshot file for the memory store. In-process only when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Weaviate endpoint, e.g. `https://my-cluster.weaviate.network`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Key forwarded to the store-side vectorizer.
    #[serde(skip)]
    pub vectorizer_api_key: Option<String>,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            provider: default_store_provider(),
            path: None,
            url: None,
            api_key: None,
            vectorizer_api_key: None,
            collection: default_collection(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_store_provider() -> String {
    "memory".to_string()
}
fn default_collection() -> String {
    "RFPDocument".to_string()
}
fn default_connect_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestionConfig {
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    /// Maximum records fetched per clear-all pass.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            include_globs: default_include_globs(),
            page_size: default_page_size(),
        }
    }
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("./data/rfps")
}
fn default_include_globs() -> Vec<String> {
    vec!["*.pdf".to_string()]
}
fn default_page_size() -> usize {
    1000
}

/// Embeddings computed by the memory store. The Weaviate backend
/// vectorizes server-side and ignores this section.
#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `local`, `openai`, or `disabled`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Override for OpenAI-compatible endpoints.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(skip)]
    pub api_key: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            api_key: None,
            batch_size: default_batch_size(),
            max_retries: default_embedding_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn disabled() -> Self {
        Self {
            provider: "disabled".to_string(),
            ..Self::default()
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_max_retries() -> u32 {
    5
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_snippet_length")]
    pub snippet_length: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            snippet_length: default_snippet_length(),
        }
    }
}

fn default_limit() -> usize {
    10
}
fn default_snippet_length() -> usize {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// `disabled`, `gemini`, or `openai`.
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Override for OpenAI-compatible endpoints.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(skip)]
    pub api_key: Option<String>,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Cap on reference documents folded into a prompt.
    #[serde(default = "default_max_references")]
    pub max_references: usize,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: None,
            url: None,
            api_key: None,
            max_output_tokens: default_max_output_tokens(),
            max_references: default_max_references(),
            timeout_secs: default_generation_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_generation_provider() -> String {
    "disabled".to_string()
}
fn default_max_output_tokens() -> u32 {
    4096
}
fn default_max_references() -> usize {
    5
}
fn default_generation_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
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
    "127.0.0.1:5000".to_string()
}

impl Config {
    /// In-process defaults: memory store without embeddings, template
    /// generation. Nothing is downloaded or called over the network.
    pub fn minimal() -> Self {
        Self {
            embedding: EmbeddingConfig::disabled(),
            ..Self::default()
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = parse_config(&content)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

/// Fill secrets and endpoint overrides from the environment.
///
/// `lookup` abstracts `std::env::var` so tests do not mutate process state.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(url) = non_empty("WEAVIATE_URL") {
        config.store.url = Some(url);
    }
    if let Some(key) = non_empty("WEAVIATE_API_KEY") {
        config.store.api_key = Some(key);
    }
    config.store.vectorizer_api_key = non_empty("OPENAI_API_KEY");
    config.embedding.api_key = non_empty("OPENAI_API_KEY");

    config.generation.api_key = match config.generation.provider.as_str() {
        "gemini" => non_empty("GEMINI_API_KEY"),
        "openai" => non_empty("OPENAI_API_KEY"),
        _ => None,
    };

    if let Some(bind) = non_empty("RFP_BIND") {
        config.server.bind = bind;
    }
}

pub fn validate(config: &Config) -> Result<()> {
    match config.store.provider.as_str() {
        "memory" | "weaviate" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown store provider: '{}'. Must be memory, weaviate, or disabled.",
            other
        ),
    }

    match config.embedding.provider.as_str() {
        "local" | "openai" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be local, openai, or disabled.",
            other
        ),
    }
    if config.embedding.provider == "openai" {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!("embedding.dims must be > 0 when provider is 'openai'");
        }
        if config.embedding.model.is_none() {
            anyhow::bail!("embedding.model must be specified when provider is 'openai'");
        }
    }
    if config.embedding.batch_size < 1 {
        anyhow::bail!("embedding.batch_size must be >= 1");
    }

    match config.generation.provider.as_str() {
        "disabled" | "gemini" | "openai" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled, gemini, or openai.",
            other
        ),
    }

    if config.store.collection.trim().is_empty() {
        anyhow::bail!("store.collection must not be empty");
    }
    if config.retrieval.default_limit < 1 {
        anyhow::bail!("retrieval.default_limit must be >= 1");
    }
    if config.retrieval.snippet_length == 0 {
        anyhow::bail!("retrieval.snippet_length must be > 0");
    }
    if config.generation.max_references < 1 {
        anyhow::bail!("generation.max_references must be >= 1");
    }
    if config.ingestion.page_size < 1 {
        anyhow::bail!("ingestion.page_size must be >= 1");
    }
    if config.ingestion.include_globs.is_empty() {
        anyhow::bail!("ingestion.include_globs must list at least one pattern");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.store.provider, "memory");
        assert_eq!(config.store.collection, "RFPDocument");
        assert_eq!(config.store.connect_timeout_secs, 10);
        assert_eq!(config.ingestion.include_globs, vec!["*.pdf".to_string()]);
        assert_eq!(config.ingestion.page_size, 1000);
        assert_eq!(config.retrieval.snippet_length, 300);
        assert_eq!(config.generation.max_references, 5);
        assert!(!config.generation.is_enabled());
        assert_eq!(config.embedding.provider, "local");
        assert_eq!(config.embedding.batch_size, 64);
        validate(&config).unwrap();
    }

    #[test]
    fn minimal_config_disables_embeddings() {
        let config = Config::minimal();
        assert_eq!(config.embedding.provider, "disabled");
        assert_eq!(config.store.provider, "memory");
        validate(&config).unwrap();
    }

    #[test]
    fn openai_embeddings_need_model_and_dims() {
        let config = parse_config("[embedding]\nprovider = \"openai\"").unwrap();
        assert!(validate(&config).is_err());

        let config = parse_config(
            "[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\ndims = 1536",
        )
        .unwrap();
        validate(&config).unwrap();

        let config = parse_config("[embedding]\nprovider = \"glove\"").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn env_overrides_fill_secrets() {
        let mut config = parse_config(
            r#"
            [store]
            provider = "weaviate"
            url = "http://file-value"

            [generation]
            provider = "gemini"
            "#,
        )
        .unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            ("WEAVIATE_URL", "https://cluster.weaviate.network"),
            ("WEAVIATE_API_KEY", "wv-key"),
            ("OPENAI_API_KEY", "sk-test"),
            ("GEMINI_API_KEY", "gm-key"),
        ]);
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(
            config.store.url.as_deref(),
            Some("https://cluster.weaviate.network")
        );
        assert_eq!(config.store.api_key.as_deref(), Some("wv-key"));
        assert_eq!(config.store.vectorizer_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.embedding.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.generation.api_key.as_deref(), Some("gm-key"));
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut config = parse_config("[generation]\nprovider = \"openai\"").unwrap();
        apply_env_overrides(&mut config, |k| {
            (k == "OPENAI_API_KEY").then(|| "   ".to_string())
        });
        assert!(config.generation.api_key.is_none());
    }

    #[test]
    fn unknown_providers_are_rejected() {
        let config = parse_config("[store]\nprovider = \"pinecone\"").unwrap();
        assert!(validate(&config).is_err());

        let config = parse_config("[generation]\nprovider = \"llama\"").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn zero_limits_are_rejected() {
        let config = parse_config("[retrieval]\ndefault_limit = 0").unwrap();
        assert!(validate(&config).is_err());

        let config = parse_config("[generation]\nmax_references = 0").unwrap();
        assert!(validate(&config).is_err());
    }
}
