//! Configuration management with YAML support

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::model::{Conversation, Creativity};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub creativity: CreativityConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Defaults applied when building provider requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default)]
    pub stream: bool,

    #[serde(default)]
    pub user_id: Option<String>,
}

/// Temperature used for each creativity level
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreativityConfig {
    #[serde(default = "default_none_temperature")]
    pub none: f32,

    #[serde(default = "default_normal_temperature")]
    pub normal: f32,

    #[serde(default = "default_high_temperature")]
    pub high: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

// Default value functions
fn default_model() -> String {
    "ernie-bot".to_string()
}

fn default_none_temperature() -> f32 {
    Creativity::None.temperature()
}

fn default_normal_temperature() -> f32 {
    Creativity::Normal.temperature()
}

fn default_high_temperature() -> f32 {
    Creativity::High.temperature()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: None,
            stream: false,
            user_id: None,
        }
    }
}

impl Default for CreativityConfig {
    fn default() -> Self {
        Self {
            none: default_none_temperature(),
            normal: default_normal_temperature(),
            high: default_high_temperature(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    /// Searches in order:
    /// 1. Provided path
    /// 2. ./parley.yaml (current directory)
    /// 3. ~/.config/parley/parley.yaml
    pub fn load(path: &str) -> Result<Self> {
        let search_paths = vec![
            shellexpand::tilde(path).to_string(),
            "parley.yaml".to_string(),
            shellexpand::tilde("~/.config/parley/parley.yaml").to_string(),
        ];

        Self::load_first(&search_paths)
    }

    /// Load the first existing file among `search_paths`, else defaults
    fn load_first(search_paths: &[String]) -> Result<Self> {
        for search_path in search_paths {
            if Path::new(search_path).exists() {
                let content = std::fs::read_to_string(search_path)
                    .with_context(|| format!("Failed to read {}", search_path))?;
                let config: Config = serde_yaml::from_str(&content)
                    .with_context(|| format!("Failed to parse {}", search_path))?;
                return Ok(config);
            }
        }

        // No config file found, use defaults
        Ok(Config::default())
    }

    /// Provider temperature for a creativity level
    pub fn temperature_for(&self, creativity: Creativity) -> f32 {
        match creativity {
            Creativity::None => self.creativity.none,
            Creativity::Normal => self.creativity.normal,
            Creativity::High => self.creativity.high,
        }
    }

    /// Model for a conversation: its own setting, else the configured default
    pub fn model_for<'a>(&'a self, conversation: &'a Conversation) -> &'a str {
        conversation
            .settings
            .as_ref()
            .and_then(|s| s.model())
            .unwrap_or(self.provider.model.as_str())
    }

    /// Token bound for a conversation; an explicit null in settings clears the default
    pub fn max_tokens_for(&self, conversation: &Conversation) -> Option<u32> {
        match conversation.settings.as_ref().and_then(|s| s.max_tokens) {
            Some(explicit) => explicit,
            None => self.provider.max_tokens,
        }
    }
}
