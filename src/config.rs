use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::providers::ollama::{
    DEFAULT_CHAT_MODEL, DEFAULT_EMBED_DIM, DEFAULT_EMBED_MODEL, DEFAULT_OLLAMA_URL,
};
use crate::retrieval::{StrategyKind, RRF_K};
use crate::steps::StepSettings;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub qdrant: QdrantConfig,
    #[serde(default)]
    pub reasoning: ReasoningConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub url: String,
    pub chat_model: String,
    pub embed_model: String,
    pub request_timeout_secs: u64,
    /// Compute embeddings in-process instead of through Ollama
    pub local_embeddings: bool,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_OLLAMA_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            request_timeout_secs: 120,
            local_embeddings: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QdrantConfig {
    pub url: String,
    pub collection: String,
    pub dimension: usize,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:6334".to_string(),
            collection: "multihop_chunks".to_string(),
            dimension: DEFAULT_EMBED_DIM,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    pub max_iterations: usize,
    pub timeout_secs: u64,
    pub max_plan_steps: usize,
    pub temperature: f32,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            timeout_secs: 300,
            max_plan_steps: 5,
            temperature: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub rerank_keep: usize,
    pub default_strategy: StrategyKind,
    pub rrf_k: f64,
    pub context_max_tokens: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            rerank_keep: 5,
            default_strategy: StrategyKind::Hybrid,
            rrf_k: RRF_K,
            context_max_tokens: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub cache_ttl_secs: u64,
    /// Directory of additional `*.json` patterns loaded at startup
    pub patterns_dir: Option<PathBuf>,
    pub max_analysis_chars: usize,
    pub match_threshold: f32,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 3600,
            patterns_dir: None,
            max_analysis_chars: 8000,
            match_threshold: 0.5,
        }
    }
}

impl Config {
    /// Load configuration from the default path, creating it if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            let config = Config::default();
            config.save_to(&config_path)?;
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(config)
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, toml_string)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;

        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;

        Ok(home.join(".multihop").join("config.toml"))
    }

    /// Deadline of one reasoning run
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.reasoning.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.schema.cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.ollama.request_timeout_secs)
    }

    /// Step tunables derived from the reasoning and retrieval sections
    pub fn step_settings(&self) -> StepSettings {
        StepSettings {
            max_plan_steps: self.reasoning.max_plan_steps,
            top_k: self.retrieval.top_k,
            rerank_keep: self.retrieval.rerank_keep,
            default_strategy: self.retrieval.default_strategy,
            context_max_tokens: self.retrieval.context_max_tokens,
            temperature: self.reasoning.temperature,
        }
    }
}
