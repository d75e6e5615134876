//! Configuration management for SuperLink
//!
//! TOML-based configuration with defaults and validation.
//! Location: ~/.superlink/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{LinkError, Result};

/// Upper bound for hour-based windows (one year)
pub const MAX_WINDOW_HOURS: i64 = 24 * 365;

/// Upper bound for minute-based windows (one year)
pub const MAX_WINDOW_MINUTES: i64 = MAX_WINDOW_HOURS * 60;

/// Complete configuration for SuperLink
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub ai: AiConfig,
    pub suggestions: SuggestionsConfig,
    pub chat: ChatConfig,
    pub stories: StoriesConfig,
    pub presence: PresenceConfig,
    pub assistant: AssistantConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Chat-completion provider settings (OpenAI-compatible endpoint)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AiConfig {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SuggestionsConfig {
    pub page_size: usize,
    pub cache_hours: i64,
    pub alchemy_batch_size: usize,
    pub alchemy_top_n: usize,
    pub default_purpose: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    pub max_message_chars: usize,
    /// Messages of history handed to the reply suggester
    pub context_messages: usize,
    pub max_reply_suggestions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoriesConfig {
    pub default_ttl_hours: i64,
    pub min_duration_secs: u32,
    pub max_duration_secs: u32,
    pub default_duration_secs: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PresenceConfig {
    pub stale_after_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssistantConfig {
    pub context_window: usize,
    pub history_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "mistralai/mistral-large".to_string(),
            api_key_env: "SUPERLINK_AI_API_KEY".to_string(),
            timeout_secs: 60,
            temperature: 0.7,
            top_p: 1.0,
            max_tokens: 1500,
        }
    }
}

impl Default for SuggestionsConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            cache_hours: 24,
            alchemy_batch_size: 5,
            alchemy_top_n: 10,
            default_purpose: "find the most interesting connection".to_string(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_chars: 5000,
            context_messages: 20,
            max_reply_suggestions: 3,
        }
    }
}

impl Default for StoriesConfig {
    fn default() -> Self {
        Self {
            default_ttl_hours: 24,
            min_duration_secs: 5,
            max_duration_secs: 300,
            default_duration_secs: 15,
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            stale_after_minutes: 10,
        }
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            context_window: 10,
            history_limit: 500,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.superlink/data".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            Self::load_from_file(&config_path)
        } else {
            Self::load_default()
        }
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| LinkError::Config(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| LinkError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load default configuration from standard location or use built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Some(config_path) = Self::default_path() {
            if config_path.exists() {
                return Self::load_from_file(&config_path);
            }
        }

        Ok(Config::default())
    }

    /// Standard config location
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".superlink").join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.suggestions.page_size == 0 {
            return Err(LinkError::Config(
                "suggestions.page_size must be greater than 0".to_string(),
            ));
        }

        if self.suggestions.alchemy_batch_size == 0 {
            return Err(LinkError::Config(
                "suggestions.alchemy_batch_size must be greater than 0".to_string(),
            ));
        }

        if !(0..=MAX_WINDOW_HOURS).contains(&self.suggestions.cache_hours) {
            return Err(LinkError::Config(format!(
                "suggestions.cache_hours must be between 0 and {}",
                MAX_WINDOW_HOURS
            )));
        }

        if !(1..=MAX_WINDOW_HOURS).contains(&self.stories.default_ttl_hours) {
            return Err(LinkError::Config(format!(
                "stories.default_ttl_hours must be between 1 and {}",
                MAX_WINDOW_HOURS
            )));
        }

        if !(1..=MAX_WINDOW_MINUTES).contains(&self.presence.stale_after_minutes) {
            return Err(LinkError::Config(format!(
                "presence.stale_after_minutes must be between 1 and {}",
                MAX_WINDOW_MINUTES
            )));
        }

        if self.stories.min_duration_secs > self.stories.max_duration_secs {
            return Err(LinkError::Config(
                "stories.min_duration_secs must not exceed max_duration_secs".to_string(),
            ));
        }

        let default_duration = self.stories.default_duration_secs;
        if default_duration < self.stories.min_duration_secs
            || default_duration > self.stories.max_duration_secs
        {
            return Err(LinkError::Config(
                "stories.default_duration_secs must lie within the duration bounds".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.ai.temperature) {
            return Err(LinkError::Config(
                "ai.temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.chat.max_message_chars == 0 {
            return Err(LinkError::Config(
                "chat.max_message_chars must be greater than 0".to_string(),
            ));
        }

        if self.assistant.context_window == 0 {
            return Err(LinkError::Config(
                "assistant.context_window must be greater than 0".to_string(),
            ));
        }

        match self.logging.level.to_ascii_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            other => {
                return Err(LinkError::Config(format!(
                    "Invalid logging level: {}",
                    other
                )))
            }
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LinkError::Config(format!("Failed to create config dir: {}", e)))?;
        }

        std::fs::write(path, contents)
            .map_err(|e| LinkError::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Expand tilde in paths
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    /// Get data directory path
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.storage.data_dir)
    }

    /// Read the AI API key from the configured environment variable
    pub fn ai_api_key(&self) -> Option<String> {
        std::env::var(&self.ai.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}
