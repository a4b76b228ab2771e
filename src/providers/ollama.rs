//! Ollama provider implementation for wagpt
//!
//! Sends a single non-streamed `/api/chat` request to a local or remote
//! Ollama server and returns the assistant message content.

use crate::config::{ModelConfig, OllamaConfig};
use crate::error::{Result, WagptError};
use crate::providers::{build_messages, Message, Provider};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Port used when the configured host names neither a scheme nor a port
pub const DEFAULT_OLLAMA_PORT: u16 = 11434;

/// Ollama API provider
///
/// # Examples
///
/// ```
/// use wagpt::config::{ModelConfig, OllamaConfig};
/// use wagpt::providers::OllamaProvider;
///
/// let config = OllamaConfig {
///     host: "localhost".to_string(),
///     host_path: "/".to_string(),
/// };
/// let provider = OllamaProvider::new(config, ModelConfig::default()).unwrap();
/// assert_eq!(provider.endpoint(), "http://localhost:11434/api/chat");
/// ```
pub struct OllamaProvider {
    client: Client,
    endpoint: String,
    model: ModelConfig,
}

/// Request structure for Ollama API
#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    stream: bool,
    options: OllamaOptions,
}

/// Sampling options for Ollama API
#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    presence_penalty: f32,
    frequency_penalty: f32,
    num_predict: u32,
}

/// Response structure from Ollama API
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: Message,
    #[serde(default)]
    done: bool,
}

impl OllamaProvider {
    /// Create a new Ollama provider instance
    ///
    /// # Errors
    ///
    /// Returns [`WagptError::Config`] if the host cannot be parsed, or
    /// [`WagptError::Backend`] if HTTP client initialization fails
    pub fn new(config: OllamaConfig, model: ModelConfig) -> Result<Self> {
        let base = resolve_base_url(&config.host)?;
        let endpoint = format!(
            "{}{}api/chat",
            base.as_str().trim_end_matches('/'),
            normalize_path(&config.host_path)
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent(concat!("wagpt/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WagptError::Backend(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            "Initialized Ollama provider: endpoint={}, model={}",
            endpoint,
            model.name
        );

        Ok(Self {
            client,
            endpoint,
            model,
        })
    }

    /// Full URL of the chat endpoint
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Resolve the configured host into a base URL
///
/// A host without a scheme is treated as plain HTTP; if it also lacks a port
/// the default Ollama port is used. Hosts with a scheme keep their own port
/// or the scheme default.
///
/// # Examples
///
/// ```
/// use wagpt::providers::ollama::resolve_base_url;
///
/// assert_eq!(resolve_base_url("gpu-box").unwrap().as_str(), "http://gpu-box:11434/");
/// assert_eq!(resolve_base_url("https://llm.example.com").unwrap().as_str(), "https://llm.example.com/");
/// ```
pub fn resolve_base_url(host: &str) -> Result<Url> {
    let host = host.trim();
    if host.is_empty() {
        return Err(WagptError::Config("Ollama host cannot be empty".to_string()).into());
    }

    if host.contains("://") {
        return Url::parse(host)
            .map_err(|e| WagptError::Config(format!("Invalid Ollama host {}: {}", host, e)).into());
    }

    let authority = host.split('/').next().unwrap_or(host);
    let mut url = Url::parse(&format!("http://{}", host))
        .map_err(|e| WagptError::Config(format!("Invalid Ollama host {}: {}", host, e)))?;

    if !has_explicit_port(authority) {
        url.set_port(Some(DEFAULT_OLLAMA_PORT))
            .map_err(|_| WagptError::Config(format!("Invalid Ollama host {}", host)))?;
    }

    Ok(url)
}

fn has_explicit_port(authority: &str) -> bool {
    match authority.rsplit_once(':') {
        Some((host, port)) => {
            !port.is_empty()
                && port.chars().all(|c| c.is_ascii_digit())
                && (!host.contains(':') || host.ends_with(']'))
        }
        None => false,
    }
}

/// `/`-delimited path prefix, always starting and ending with a slash
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, question: &str) -> Result<String> {
        let request = OllamaRequest {
            model: &self.model.name,
            messages: build_messages(&self.model.system_prompt, question),
            stream: false,
            options: OllamaOptions {
                temperature: self.model.temperature,
                top_p: self.model.top_p,
                presence_penalty: self.model.presence_penalty,
                frequency_penalty: self.model.frequency_penalty,
                num_predict: self.model.max_tokens,
            },
        };

        tracing::debug!("Sending Ollama request to {}", self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| WagptError::Backend(format!("Ollama request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Ollama returned error {}: {}", status, error_text);
            return Err(WagptError::Backend(format!(
                "Ollama returned error {}: {}",
                status, error_text
            ))
            .into());
        }

        let body: OllamaResponse = response
            .json()
            .await
            .map_err(|e| WagptError::Backend(format!("Failed to parse Ollama response: {}", e)))?;

        if !body.done {
            tracing::debug!("Ollama response marked incomplete");
        }

        Ok(body.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(host: &str, path: &str) -> OllamaProvider {
        OllamaProvider::new(
            OllamaConfig {
                host: host.to_string(),
                host_path: path.to_string(),
            },
            ModelConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_bare_host_gets_default_port() {
        assert_eq!(
            resolve_base_url("localhost").unwrap().as_str(),
            "http://localhost:11434/"
        );
    }

    #[test]
    fn test_bare_host_keeps_explicit_port() {
        assert_eq!(
            resolve_base_url("localhost:8080").unwrap().as_str(),
            "http://localhost:8080/"
        );
        assert_eq!(
            resolve_base_url("10.0.0.2:80").unwrap().as_str(),
            "http://10.0.0.2/"
        );
    }

    #[test]
    fn test_scheme_host_uses_scheme_default() {
        assert_eq!(
            resolve_base_url("http://ollama.internal").unwrap().port_or_known_default(),
            Some(80)
        );
        assert_eq!(
            resolve_base_url("https://ollama.internal").unwrap().port_or_known_default(),
            Some(443)
        );
    }

    #[test]
    fn test_empty_host_rejected() {
        assert!(resolve_base_url(" ").is_err());
    }

    #[test]
    fn test_endpoint_with_host_path() {
        assert_eq!(
            provider("localhost", "/").endpoint(),
            "http://localhost:11434/api/chat"
        );
        assert_eq!(
            provider("https://gpu.example.com", "ollama").endpoint(),
            "https://gpu.example.com/ollama/api/chat"
        );
        assert_eq!(
            provider("gpu:9000", "/proxy/ollama/").endpoint(),
            "http://gpu:9000/proxy/ollama/api/chat"
        );
    }

    #[test]
    fn test_request_serialization() {
        let request = OllamaRequest {
            model: "llama3",
            messages: build_messages("", "hi"),
            stream: false,
            options: OllamaOptions {
                temperature: 0.0,
                top_p: 1.0,
                presence_penalty: 0.0,
                frequency_penalty: 0.0,
                num_predict: 128,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_predict"], 128);
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
