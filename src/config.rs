//! Configuration management for wagpt
//!
//! Configuration is loaded once before the first supervisor poll: an
//! optional YAML file provides the base, environment variables override it,
//! and [`Config::validate`] rejects anything missing or out of range.

use crate::error::{Result, WagptError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Engines accepted by `WHATSAPP_GPT_ENGINE`
pub const VALID_ENGINES: [&str; 2] = ["openai", "ollama"];

/// Datastore types accepted by `WHATSAPP_DATASTORE_TYPE`
pub const VALID_DATASTORES: [&str; 2] = ["sqlite", "sqlite3"];

/// Main configuration structure for wagpt
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Messaging session settings
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    /// Generative backend settings
    #[serde(default)]
    pub gpt: GptConfig,
}

/// Messaging session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    /// Device store type (`sqlite`)
    #[serde(default)]
    pub datastore_type: String,

    /// Device store location, e.g. `file:data/whatsapp.db?_foreign_keys=on`
    #[serde(default)]
    pub datastore_uri: String,

    /// Base URL of the multi-device bridge service
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,

    /// Optional outbound proxy for the messaging connection
    #[serde(default)]
    pub proxy_url: Option<String>,

    /// Trigger tag that must prefix a message body
    #[serde(default)]
    pub tag: String,

    /// Client version reported to the messaging service
    #[serde(default)]
    pub version: ClientVersionConfig,
}

fn default_bridge_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            datastore_type: String::new(),
            datastore_uri: String::new(),
            bridge_url: default_bridge_url(),
            proxy_url: None,
            tag: String::new(),
            version: ClientVersionConfig::default(),
        }
    }
}

/// Client version triple; unset means the bridge's built-in version
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientVersionConfig {
    #[serde(default)]
    pub major: Option<u32>,
    #[serde(default)]
    pub minor: Option<u32>,
    #[serde(default)]
    pub patch: Option<u32>,
}

impl ClientVersionConfig {
    /// Returns the full triple when all three parts are set
    pub fn triple(&self) -> Option<(u32, u32, u32)> {
        match (self.major, self.minor, self.patch) {
            (Some(major), Some(minor), Some(patch)) => Some((major, minor, patch)),
            _ => None,
        }
    }

    fn is_partial(&self) -> bool {
        let set = [self.major, self.minor, self.patch]
            .iter()
            .filter(|part| part.is_some())
            .count();
        set != 0 && set != 3
    }
}

/// Generative backend configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GptConfig {
    /// Backend selector: `openai` (hosted) or `ollama` (local)
    #[serde(default)]
    pub engine: String,

    /// Extra pipe-separated blocklist terms
    #[serde(default)]
    pub blocked_words: Option<String>,

    /// Model and sampling parameters shared by both engines
    #[serde(default)]
    pub model: ModelConfig,

    /// Hosted backend settings
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Local backend settings
    #[serde(default)]
    pub ollama: OllamaConfig,
}

/// Model and sampling parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_name")]
    pub name: String,

    /// Optional system prompt; empty means none
    #[serde(default)]
    pub system_prompt: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default)]
    pub presence_penalty: f32,

    #[serde(default)]
    pub frequency_penalty: f32,

    /// Request incrementally streamed completions from the hosted backend
    #[serde(default)]
    pub stream: bool,
}

fn default_model_name() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_top_p() -> f32 {
    1.0
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            system_prompt: String::new(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            top_p: default_top_p(),
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            stream: false,
        }
    }
}

/// Hosted (OpenAI-compatible) backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_openai_host")]
    pub host: String,

    #[serde(default = "default_openai_host_path")]
    pub host_path: String,

    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_openai_host() -> String {
    "https://api.openai.com".to_string()
}

fn default_openai_host_path() -> String {
    "/v1".to_string()
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            host: default_openai_host(),
            host_path: default_openai_host_path(),
            api_key: None,
        }
    }
}

/// Local (Ollama) backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Server host, with or without scheme and port
    #[serde(default)]
    pub host: String,

    #[serde(default = "default_ollama_host_path")]
    pub host_path: String,
}

fn default_ollama_host_path() -> String {
    "/".to_string()
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            host_path: default_ollama_host_path(),
        }
    }
}

/// Logging configuration, read from the environment before anything else
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json_format: bool,

    /// Optional file receiving a copy of every log line
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            file_path: None,
        }
    }
}

impl LoggingConfig {
    /// Build logging settings from `WAGPT_LOG_*` variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(level) = std::env::var("WAGPT_LOG_LEVEL") {
            config.level = level;
        }
        if let Ok(json) = std::env::var("WAGPT_LOG_JSON") {
            config.json_format = parse_bool(&json).unwrap_or(false);
        }
        if let Ok(path) = std::env::var("WAGPT_LOG_FILE") {
            if !path.trim().is_empty() {
                config.file_path = Some(path);
            }
        }
        config
    }
}

impl Config {
    /// Load configuration from file with environment variable overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to an optional YAML configuration file
    ///
    /// # Returns
    ///
    /// Returns the merged configuration; call [`Config::validate`] before use
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::debug!("Config file not found at {}, using environment only", path);
            Self::default()
        };

        config.apply_env_vars();
        config.normalize_selectors();

        Ok(config)
    }

    /// Lowercase the engine and datastore selectors regardless of source
    fn normalize_selectors(&mut self) {
        self.gpt.engine = self.gpt.engine.trim().to_lowercase();
        self.whatsapp.datastore_type = self.whatsapp.datastore_type.trim().to_lowercase();
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| WagptError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| WagptError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        let wa = &mut self.whatsapp;
        if let Ok(value) = std::env::var("WHATSAPP_DATASTORE_TYPE") {
            wa.datastore_type = value.trim().to_lowercase();
        }
        if let Ok(value) = std::env::var("WHATSAPP_DATASTORE_URI") {
            wa.datastore_uri = value;
        }
        if let Ok(value) = std::env::var("WHATSAPP_BRIDGE_URL") {
            wa.bridge_url = value;
        }
        if let Ok(value) = std::env::var("WHATSAPP_CLIENT_PROXY_URL") {
            wa.proxy_url = non_empty(value);
        }
        if let Ok(value) = std::env::var("WHATSAPP_GPT_TAG") {
            wa.tag = value;
        }
        parse_env("WHATSAPP_VERSION_MAJOR", &mut wa.version.major, |v| {
            v.parse().ok().map(Some)
        });
        parse_env("WHATSAPP_VERSION_MINOR", &mut wa.version.minor, |v| {
            v.parse().ok().map(Some)
        });
        parse_env("WHATSAPP_VERSION_PATCH", &mut wa.version.patch, |v| {
            v.parse().ok().map(Some)
        });

        let gpt = &mut self.gpt;
        if let Ok(value) = std::env::var("WHATSAPP_GPT_ENGINE") {
            gpt.engine = value.trim().to_lowercase();
        }
        if let Ok(value) = std::env::var("WHATSAPP_GPT_BLOCKED_WORD") {
            gpt.blocked_words = non_empty(value);
        }
        if let Ok(value) = std::env::var("OPENAI_HOST") {
            gpt.openai.host = value;
        }
        if let Ok(value) = std::env::var("OPENAI_HOST_PATH") {
            gpt.openai.host_path = value;
        }
        if let Ok(value) = std::env::var("OPENAI_API_KEY") {
            gpt.openai.api_key = non_empty(value);
        }
        if let Ok(value) = std::env::var("OLLAMA_HOST") {
            gpt.ollama.host = value;
        }
        if let Ok(value) = std::env::var("OLLAMA_HOST_PATH") {
            gpt.ollama.host_path = value;
        }

        let model = &mut gpt.model;
        if let Ok(value) = std::env::var("GPT_MODEL_NAME") {
            model.name = value;
        }
        if let Ok(value) = std::env::var("GPT_MODEL_SYSTEM_PROMPT") {
            model.system_prompt = value;
        }
        parse_env("GPT_MODEL_TOKEN", &mut model.max_tokens, |v| v.parse().ok());
        parse_env("GPT_MODEL_TEMPERATURE", &mut model.temperature, |v| {
            v.parse().ok()
        });
        parse_env("GPT_MODEL_TOP_P", &mut model.top_p, |v| v.parse().ok());
        parse_env("GPT_MODEL_PENALTY_PRESENCE", &mut model.presence_penalty, |v| {
            v.parse().ok()
        });
        parse_env(
            "GPT_MODEL_PENALTY_FREQUENCY",
            &mut model.frequency_penalty,
            |v| v.parse().ok(),
        );
        parse_env("GPT_MODEL_STREAM", &mut model.stream, parse_bool);
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns [`WagptError::Config`] naming the first missing or invalid
    /// setting
    pub fn validate(&self) -> Result<()> {
        let wa = &self.whatsapp;
        if wa.datastore_type.is_empty() {
            return Err(config_error("WHATSAPP_DATASTORE_TYPE is required"));
        }
        if !VALID_DATASTORES.contains(&wa.datastore_type.as_str()) {
            return Err(config_error(format!(
                "Invalid datastore type: {}. Must be one of: {}",
                wa.datastore_type,
                VALID_DATASTORES.join(", ")
            )));
        }
        if wa.datastore_uri.trim().is_empty() {
            return Err(config_error("WHATSAPP_DATASTORE_URI is required"));
        }
        if wa.tag.trim().is_empty() {
            return Err(config_error("WHATSAPP_GPT_TAG is required"));
        }
        if url::Url::parse(&wa.bridge_url).is_err() {
            return Err(config_error(format!(
                "Invalid bridge URL: {}",
                wa.bridge_url
            )));
        }
        if let Some(proxy) = &wa.proxy_url {
            if url::Url::parse(proxy).is_err() {
                return Err(config_error(format!("Invalid proxy URL: {}", proxy)));
            }
        }
        if wa.version.is_partial() {
            return Err(config_error(
                "WHATSAPP_VERSION_MAJOR, WHATSAPP_VERSION_MINOR and WHATSAPP_VERSION_PATCH must be set together",
            ));
        }

        let gpt = &self.gpt;
        if gpt.engine.is_empty() {
            return Err(config_error("WHATSAPP_GPT_ENGINE is required"));
        }
        match gpt.engine.as_str() {
            "openai" => {
                if gpt.openai.api_key.as_deref().unwrap_or("").is_empty() {
                    return Err(config_error("OPENAI_API_KEY is required for openai"));
                }
            }
            "ollama" => {
                if gpt.ollama.host.trim().is_empty() {
                    return Err(config_error("OLLAMA_HOST is required for ollama"));
                }
            }
            other => {
                return Err(config_error(format!(
                    "Invalid engine: {}. Must be one of: {}",
                    other,
                    VALID_ENGINES.join(", ")
                )));
            }
        }

        let model = &gpt.model;
        if model.name.trim().is_empty() {
            return Err(config_error("GPT_MODEL_NAME cannot be empty"));
        }
        if model.max_tokens == 0 {
            return Err(config_error("GPT_MODEL_TOKEN must be greater than 0"));
        }
        if !(0.0..=2.0).contains(&model.temperature) {
            return Err(config_error("GPT_MODEL_TEMPERATURE must be between 0 and 2"));
        }
        if !(0.0..=1.0).contains(&model.top_p) {
            return Err(config_error("GPT_MODEL_TOP_P must be between 0 and 1"));
        }
        if !(-2.0..=2.0).contains(&model.presence_penalty) {
            return Err(config_error(
                "GPT_MODEL_PENALTY_PRESENCE must be between -2 and 2",
            ));
        }
        if !(-2.0..=2.0).contains(&model.frequency_penalty) {
            return Err(config_error(
                "GPT_MODEL_PENALTY_FREQUENCY must be between -2 and 2",
            ));
        }

        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> anyhow::Error {
    WagptError::Config(message.into()).into()
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Overwrite `target` with the parsed value of `key`, warning on bad input
fn parse_env<T>(key: &str, target: &mut T, parse: impl Fn(&str) -> Option<T>) {
    if let Ok(raw) = std::env::var(key) {
        match parse(raw.trim()) {
            Some(value) => *target = value,
            None => tracing::warn!("Invalid {}: {}", key, raw),
        }
    }
}
