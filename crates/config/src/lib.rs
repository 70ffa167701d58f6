//! Configuration loading, validation, and management for Boundless.
//!
//! Loads configuration from `~/.boundless/config.toml` with environment
//! variable overrides for secrets. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.boundless/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Active chat provider
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Semantic memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Storage backend selection
    #[serde(default)]
    pub storage: StorageConfig,

    /// Streaming timeouts
    #[serde(default)]
    pub stream: StreamConfig,
}

/// Chat provider settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider base URL; the dialect is classified from this.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key; local providers run without one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Active model id
    #[serde(default = "default_model")]
    pub model: String,

    /// Whether the active model accepts image input
    #[serde(default)]
    pub vision_capable: bool,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            vision_capable: false,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("vision_capable", &self.vision_capable)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("provider", &self.provider)
            .field("memory", &self.memory)
            .field("storage", &self.storage)
            .field("stream", &self.stream)
            .finish()
    }
}

/// Semantic memory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Master switch. Disabling is non-destructive: stored embeddings
    /// stay on disk and retrieval just returns nothing.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base URL of the embedding endpoint (OpenAI-compatible).
    #[serde(default = "default_base_url")]
    pub embedding_base_url: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// How many retrieved snippets to inject into context.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_top_k() -> usize {
    5
}
fn default_true() -> bool {
    true
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            embedding_base_url: default_base_url(),
            embedding_model: default_embedding_model(),
            top_k: default_top_k(),
        }
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "sqlite" (embedded, always available) or "directory"
    /// (capability-gated folder, one file per record).
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Path of the embedded database file.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,

    /// Granted directory root, remembered across sessions so
    /// re-authorization does not require re-picking it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory_root: Option<PathBuf>,
}

fn default_storage_backend() -> String {
    "sqlite".into()
}
fn default_sqlite_path() -> String {
    AppConfig::config_dir()
        .join("boundless.db")
        .to_string_lossy()
        .into_owned()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            sqlite_path: default_sqlite_path(),
            directory_root: None,
        }
    }
}

/// Streaming timeouts. The stall timeout bounds each individual read;
/// the request timeout bounds the whole turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_stall_timeout")]
    pub stall_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    180
}
fn default_stall_timeout() -> u64 {
    30
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            stall_timeout_secs: default_stall_timeout(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            memory: MemoryConfig::default(),
            storage: StorageConfig::default(),
            stream: StreamConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.boundless/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `BOUNDLESS_API_KEY` (highest priority)
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        // Environment variable overrides (highest priority)
        if config.provider.api_key.is_none() {
            config.provider.api_key = std::env::var("BOUNDLESS_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("BOUNDLESS_MODEL") {
            config.provider.model = model;
        }

        if let Ok(url) = std::env::var("BOUNDLESS_BASE_URL") {
            config.provider.base_url = url;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".boundless")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.temperature < 0.0 || self.provider.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        match self.storage.backend.as_str() {
            "sqlite" | "directory" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "storage.backend must be \"sqlite\" or \"directory\", got \"{other}\""
                )));
            }
        }

        if self.storage.backend == "directory" && self.storage.directory_root.is_none() {
            return Err(ConfigError::ValidationError(
                "storage.backend = \"directory\" requires storage.directory_root".into(),
            ));
        }

        if self.stream.stall_timeout_secs >= self.stream.request_timeout_secs {
            return Err(ConfigError::ValidationError(
                "stream.stall_timeout_secs must be shorter than request_timeout_secs".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
