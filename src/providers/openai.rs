//! Hosted OpenAI-compatible provider implementation for wagpt
//!
//! Supports the chat completions API and the legacy single-prompt
//! completions API, each in buffered or SSE-streamed mode.

use crate::config::{ModelConfig, OpenAiConfig};
use crate::error::{Result, WagptError};
use crate::gateway::FALLBACK_RESPONSE;
use crate::providers::{build_messages, Message, Provider, StreamAccumulator};
use crate::sse;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which API shape a request uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStyle {
    /// `/chat/completions` with system and user messages
    Chat,
    /// `/completions` with a single prompt string
    Completion,
}

/// Hosted API provider
///
/// # Examples
///
/// ```
/// use wagpt::config::{ModelConfig, OpenAiConfig};
/// use wagpt::providers::openai::{OpenAiProvider, RequestStyle};
///
/// let config = OpenAiConfig {
///     api_key: Some("sk-test".to_string()),
///     ..Default::default()
/// };
/// let provider = OpenAiProvider::new(config, ModelConfig::default()).unwrap();
/// assert_eq!(provider.request_style(), RequestStyle::Chat);
/// assert_eq!(
///     provider.endpoint("chat/completions"),
///     "https://api.openai.com/v1/chat/completions"
/// );
/// ```
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
    model: ModelConfig,
}

#[derive(Debug, Serialize)]
struct Sampling {
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    presence_penalty: f32,
    frequency_penalty: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    #[serde(flatten)]
    sampling: Sampling,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: String,
    #[serde(flatten)]
    sampling: Sampling,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    text: String,
}

/// One streamed chunk; chat chunks carry `delta.content`, completion chunks
/// carry `text`
#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

impl StreamChunk {
    fn token(&self) -> Option<&str> {
        let choice = self.choices.first()?;
        choice
            .delta
            .as_ref()
            .and_then(|delta| delta.content.as_deref())
            .or(choice.text.as_deref())
    }
}

/// Returns true for models served by the chat completions API
///
/// Instruct and base completion models (`*-instruct`, `davinci*`,
/// `babbage*`, `text-*`, `code-*`) only accept the legacy API.
pub fn is_chat_model(model: &str) -> bool {
    let model = model.to_lowercase();
    !(model.contains("instruct")
        || model.starts_with("davinci")
        || model.starts_with("babbage")
        || model.starts_with("text-")
        || model.starts_with("code-"))
}

impl OpenAiProvider {
    /// Create a new hosted provider instance
    ///
    /// # Errors
    ///
    /// Returns [`WagptError::Config`] if no API key is configured, or
    /// [`WagptError::Backend`] if HTTP client initialization fails
    pub fn new(config: OpenAiConfig, model: ModelConfig) -> Result<Self> {
        if config.api_key.as_deref().unwrap_or("").is_empty() {
            return Err(WagptError::Config("OPENAI_API_KEY is required".to_string()).into());
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent(concat!("wagpt/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WagptError::Backend(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            "Initialized OpenAI provider: host={}, model={}, stream={}",
            config.host,
            model.name,
            model.stream
        );

        Ok(Self {
            client,
            config,
            model,
        })
    }

    /// Chat when a system prompt is configured or the model is chat-capable
    pub fn request_style(&self) -> RequestStyle {
        if !self.model.system_prompt.trim().is_empty() || is_chat_model(&self.model.name) {
            RequestStyle::Chat
        } else {
            RequestStyle::Completion
        }
    }

    /// Build `{host}{host_path}/{suffix}`
    pub fn endpoint(&self, suffix: &str) -> String {
        let host = self.config.host.trim_end_matches('/');
        let path = self.config.host_path.trim_matches('/');
        if path.is_empty() {
            format!("{}/{}", host, suffix)
        } else {
            format!("{}/{}/{}", host, path, suffix)
        }
    }

    fn sampling(&self) -> Sampling {
        Sampling {
            max_tokens: self.model.max_tokens,
            temperature: self.model.temperature,
            top_p: self.model.top_p,
            presence_penalty: self.model.presence_penalty,
            frequency_penalty: self.model.frequency_penalty,
            stream: self.model.stream,
        }
    }

    fn prompt(&self, question: &str) -> String {
        let system = self.model.system_prompt.trim();
        if system.is_empty() {
            question.to_string()
        } else {
            format!("{}\n\n{}", system, question)
        }
    }

    async fn post(&self, url: &str, body: &impl Serialize) -> Result<reqwest::Response> {
        let api_key = self.config.api_key.as_deref().unwrap_or_default();

        tracing::debug!("Sending OpenAI request to {}", url);

        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| WagptError::Backend(format!("OpenAI request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("OpenAI returned error {}: {}", status, error_text);
            return Err(WagptError::Backend(format!(
                "OpenAI returned error {}: {}",
                status, error_text
            ))
            .into());
        }

        Ok(response)
    }

    async fn read_buffered(&self, style: RequestStyle, response: reqwest::Response) -> Result<String> {
        let parse_error =
            |e: reqwest::Error| WagptError::Backend(format!("Failed to parse OpenAI response: {}", e));

        let content = match style {
            RequestStyle::Chat => response
                .json::<ChatResponse>()
                .await
                .map_err(parse_error)?
                .choices
                .into_iter()
                .next()
                .map(|choice| choice.message.content),
            RequestStyle::Completion => response
                .json::<CompletionResponse>()
                .await
                .map_err(parse_error)?
                .choices
                .into_iter()
                .next()
                .map(|choice| choice.text),
        };

        content.ok_or_else(|| WagptError::Backend("OpenAI returned no choices".to_string()).into())
    }

    async fn read_streamed(&self, response: reqwest::Response) -> Result<String> {
        let mut accumulator = StreamAccumulator::new();

        sse::for_each_event(response.bytes_stream(), |event| {
            if event.data == "[DONE]" {
                return false;
            }
            match serde_json::from_str::<StreamChunk>(&event.data) {
                Ok(chunk) => {
                    if let Some(token) = chunk.token() {
                        accumulator.push(token);
                    }
                }
                Err(e) => tracing::warn!("Skipping malformed stream chunk: {}", e),
            }
            true
        })
        .await
        .map_err(|e| WagptError::Backend(format!("OpenAI stream failed: {}", e)))?;

        match accumulator.finish() {
            Some(text) => Ok(text),
            None => {
                tracing::warn!("OpenAI stream ended without content");
                Ok(FALLBACK_RESPONSE.to_string())
            }
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, question: &str) -> Result<String> {
        let style = self.request_style();
        let response = match style {
            RequestStyle::Chat => {
                let request = ChatRequest {
                    model: &self.model.name,
                    messages: build_messages(&self.model.system_prompt, question),
                    sampling: self.sampling(),
                };
                self.post(&self.endpoint("chat/completions"), &request)
                    .await?
            }
            RequestStyle::Completion => {
                let request = CompletionRequest {
                    model: &self.model.name,
                    prompt: self.prompt(question),
                    sampling: self.sampling(),
                };
                self.post(&self.endpoint("completions"), &request).await?
            }
        };

        if self.model.stream {
            self.read_streamed(response).await
        } else {
            self.read_buffered(style, response).await
        }
    }
}
