
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::index::DistanceMetric;

pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_HISTORY_WINDOW: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    Ollama,
}

impl std::fmt::Display for ProviderKind {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            ProviderKind::OpenAi => write!(f, "openai"),
            ProviderKind::Ollama => write!(f, "ollama"),
        }
    }
}

/// Connection settings for the embedding and completion services.
///
/// The API key itself is never stored in the config file; `api_key_env`
/// names the environment variable it is read from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub base_url: Url,
    pub api_key_env: String,
    pub embedding_model: String,
    pub chat_model: String,
    pub advanced_chat_model: String,
    pub timeout_seconds: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::OpenAi,
            base_url: Url::parse("https://api.openai.com/v1").expect("default base url is valid"),
            api_key_env: "OPENAI_API_KEY".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            advanced_chat_model: "gpt-4o".to_string(),
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Entries live for the lifetime of the process.
    #[default]
    Ephemeral,
    /// Entries are kept in a SQLite file and reused across runs.
    Durable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexConfig {
    pub storage: StorageMode,
    /// Overrides the default `index.db` location inside the config directory
    pub path: Option<PathBuf>,
    pub metric: DistanceMetric,
    pub top_k: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            storage: StorageMode::Ephemeral,
            path: None,
            metric: DistanceMetric::Cosine,
            top_k: DEFAULT_TOP_K,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    pub source_dir: Option<PathBuf>,
    pub extensions: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source_dir: None,
            extensions: vec!["pdf".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    /// Number of most recent turns kept in the session history
    pub history_window: usize,
    pub system_prompt: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_window: DEFAULT_HISTORY_WINDOW,
            system_prompt: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid API key variable: {0} (cannot be empty for the openai provider)")]
    InvalidApiKeyEnv(String),
    #[error("Invalid timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid top_k: {0} (must be between 1 and 100)")]
    InvalidTopK(usize),
    #[error("Invalid history window: {0} (must be between 1 and 100 turns)")]
    InvalidHistoryWindow(usize),
    #[error("Invalid extension list: {0}")]
    InvalidExtensions(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Platform config directory, falling back to `~/.coursebot`
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("coursebot"))
            .or_else(|| dirs::home_dir().map(|home| home.join(".coursebot")))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load() -> Result<Self> {
        let config_dir = Self::config_dir().context("Failed to determine config directory")?;
        Self::load_from(config_dir)
    }

    #[inline]
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Location of the SQLite file backing a durable index
    #[inline]
    pub fn index_database_path(&self) -> PathBuf {
        self.index
            .path
            .clone()
            .unwrap_or_else(|| self.get_base_dir().join("index.db"))
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.provider.validate()?;

        if !(1..=100).contains(&self.index.top_k) {
            return Err(ConfigError::InvalidTopK(self.index.top_k));
        }

        if !(1..=100).contains(&self.chat.history_window) {
            return Err(ConfigError::InvalidHistoryWindow(self.chat.history_window));
        }

        if self.ingest.extensions.is_empty() {
            return Err(ConfigError::InvalidExtensions(
                "at least one extension is required".to_string(),
            ));
        }
        if let Some(bad) = self
            .ingest
            .extensions
            .iter()
            .find(|ext| ext.trim().is_empty() || ext.starts_with('.'))
        {
            return Err(ConfigError::InvalidExtensions(format!(
                "'{}' (use bare extensions such as \"pdf\")",
                bad
            )));
        }

        Ok(())
    }
}

impl ProviderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let scheme = self.base_url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(ConfigError::InvalidProtocol(scheme.to_string()));
        }

        if self.base_url.host_str().is_none() {
            return Err(ConfigError::InvalidUrl(self.base_url.to_string()));
        }

        for model in [
            &self.embedding_model,
            &self.chat_model,
            &self.advanced_chat_model,
        ] {
            if model.trim().is_empty() {
                return Err(ConfigError::InvalidModel(model.clone()));
            }
        }

        if self.kind == ProviderKind::OpenAi && self.api_key_env.trim().is_empty() {
            return Err(ConfigError::InvalidApiKeyEnv(self.api_key_env.clone()));
        }

        if !(1..=600).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        Ok(())
    }

    /// Read the API key from the process environment
    pub fn api_key(&self) -> Option<String> {
        self.api_key_with(|name| std::env::var(name).ok())
    }

    /// Resolve the API key through `lookup`, treating blank values as unset
    pub fn api_key_with<F>(&self, lookup: F) -> Option<String>
    where
        F: FnOnce(&str) -> Option<String>,
    {
        if self.api_key_env.trim().is_empty() {
            return None;
        }
        lookup(&self.api_key_env).filter(|key| !key.trim().is_empty())
    }

    pub fn set_base_url(&mut self, base_url: &str) -> Result<(), ConfigError> {
        let url = Url::parse(base_url).map_err(|_| ConfigError::InvalidUrl(base_url.to_string()))?;
        let candidate = ProviderConfig {
            base_url: url,
            ..self.clone()
        };
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }

    pub fn set_embedding_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.embedding_model = model;
        Ok(())
    }

    pub fn set_chat_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.chat_model = model;
        Ok(())
    }

    pub fn set_advanced_chat_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.advanced_chat_model = model;
        Ok(())
    }

    /// The advanced chat model when `advanced` is set, otherwise the regular one
    pub fn chat_model_for(&self, advanced: bool) -> &str {
        if advanced {
            &self.advanced_chat_model
        } else {
            &self.chat_model
        }
    }

    /// Switch provider kind, resetting the endpoint and models to that provider's defaults
    pub fn switch_kind(&mut self, kind: ProviderKind) {
        if self.kind == kind {
            return;
        }
        *self = match kind {
            ProviderKind::OpenAi => ProviderConfig::default(),
            ProviderKind::Ollama => ProviderConfig::ollama_defaults(),
        };
    }

    pub fn ollama_defaults() -> Self {
        Self {
            kind: ProviderKind::Ollama,
            base_url: Url::parse("http://localhost:11434").expect("default base url is valid"),
            api_key_env: String::new(),
            embedding_model: "nomic-embed-text:latest".to_string(),
            chat_model: "llama3.2:latest".to_string(),
            advanced_chat_model: "llama3.1:8b".to_string(),
            timeout_seconds: 120,
        }
    }
}
