//! Base provider trait and common types for wagpt
//!
//! This module defines the Provider trait that both generative backends
//! implement, along with the chat message type they share and the token
//! accumulator used by streamed completions.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Message structure for chat-style requests
///
/// The hosted chat API and the local backend's `/api/chat` endpoint accept
/// the same `{role, content}` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (system, user, assistant)
    pub role: String,
    /// Content of the message
    #[serde(default)]
    pub content: String,
}

impl Message {
    /// Creates a new system message
    ///
    /// # Examples
    ///
    /// ```
    /// use wagpt::providers::Message;
    ///
    /// let msg = Message::system("You are terse.");
    /// assert_eq!(msg.role, "system");
    /// ```
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Creates a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Build the single-turn conversation sent to chat endpoints
///
/// A system message is included only when `system_prompt` is non-blank.
pub fn build_messages(system_prompt: &str, question: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(2);
    if !system_prompt.trim().is_empty() {
        messages.push(Message::system(system_prompt));
    }
    messages.push(Message::user(question));
    messages
}

/// Accumulates streamed tokens into one response
///
/// Whitespace-only tokens are dropped until the first token with visible
/// content arrives; after that every token is kept verbatim.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    buffer: String,
    started: bool,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one streamed token
    pub fn push(&mut self, token: &str) {
        if !self.started {
            if token.trim().is_empty() {
                return;
            }
            self.started = true;
        }
        self.buffer.push_str(token);
    }

    /// Consume the accumulator, yielding `None` if no content ever arrived
    pub fn finish(self) -> Option<String> {
        if self.started {
            Some(self.buffer)
        } else {
            None
        }
    }
}

/// Generative backend
///
/// Implementations perform one question/answer exchange and return the raw
/// generated text. Moderation and normalization are applied by
/// [`crate::gateway::GptGateway`], never by the provider itself.
///
/// # Examples
///
/// ```
/// use wagpt::providers::Provider;
/// use wagpt::error::Result;
/// use async_trait::async_trait;
///
/// struct Echo;
///
/// #[async_trait]
/// impl Provider for Echo {
///     fn name(&self) -> &str {
///         "echo"
///     }
///
///     async fn generate(&self, question: &str) -> Result<String> {
///         Ok(question.to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short backend name used in logs
    fn name(&self) -> &str;

    /// Generate an answer for `question`
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::WagptError::Backend`] if the exchange fails
    async fn generate(&self, question: &str) -> Result<String>;
}
