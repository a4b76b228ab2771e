//! Inbound message routing
//!
//! [`MessageRouter`] is the event subscriber the supervisor installs on the
//! active client. For each tagged text message it extracts the question,
//! shows a typing indicator, asks the [`GptGateway`] and sends the answer
//! back through the [`Responder`].

use crate::error::{Result, WagptError};
use crate::gateway::{GptGateway, FALLBACK_RESPONSE};
use crate::messaging::{
    ChatPresence, ChatPresenceMedia, Event, EventHandler, MessageEvent, Presence,
};
use crate::responder::{clear_composing, QuotedMessage, Responder};
use crate::session::SessionHandle;

use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;

/// Configured marker that turns a message into a question
///
/// The tag must open the (trimmed) body, in any letter case, and be
/// followed by at least one whitespace character.
///
/// # Examples
///
/// ```
/// use wagpt::router::TriggerTag;
///
/// let tag = TriggerTag::new("ask").unwrap();
/// assert_eq!(tag.extract_question("ASK   what is 2+2 ").as_deref(), Some("what is 2+2"));
/// assert_eq!(tag.extract_question("asking 2+2"), None);
/// ```
#[derive(Debug, Clone)]
pub struct TriggerTag {
    tag: String,
    pattern: Regex,
}

impl TriggerTag {
    /// # Errors
    ///
    /// Returns [`WagptError::Config`] for an empty tag
    pub fn new(tag: &str) -> Result<Self> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(WagptError::Config("trigger tag must not be empty".to_string()).into());
        }

        let pattern = Regex::new(&format!(r"^(?i:{})\s+", regex::escape(tag)))
            .map_err(|e| WagptError::Config(format!("invalid trigger tag: {}", e)))?;

        Ok(Self {
            tag: tag.to_string(),
            pattern,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.tag
    }

    /// The trimmed text following the tag, or `None` if the body is not a
    /// question
    pub fn extract_question(&self, body: &str) -> Option<String> {
        let body = body.trim();
        let found = self.pattern.find(body)?;
        let question = body[found.end()..].trim();
        if question.is_empty() {
            None
        } else {
            Some(question.to_string())
        }
    }
}

/// Subscriber answering tagged questions
pub struct MessageRouter {
    session: SessionHandle,
    gateway: Arc<GptGateway>,
    tag: TriggerTag,
    responder: Responder,
}

impl MessageRouter {
    pub fn new(session: SessionHandle, gateway: Arc<GptGateway>, tag: TriggerTag) -> Self {
        let responder = Responder::new(session.clone());
        Self {
            session,
            gateway,
            tag,
            responder,
        }
    }

    /// Answer `message` if it is a tagged question from someone else
    pub async fn route(&self, message: &MessageEvent) {
        if message.is_media() {
            return;
        }

        let Some(client) = self.session.client() else {
            tracing::debug!("Message received without an active client");
            return;
        };

        let info = &message.info;
        let from_self = info.is_from_me
            || client
                .own_id()
                .map_or(false, |own| own.same_user(&info.sender));
        if from_self {
            return;
        }

        let Some(question) = self.tag.extract_question(message.body()) else {
            return;
        };

        let chat = info.chat.masked();
        tracing::info!(chat = %chat, "Incoming question");
        tracing::debug!(chat = %chat, question = %question, "Question text");

        if let Err(e) = client.send_presence(Presence::Available).await {
            tracing::debug!(error = %e, "Failed to send available presence");
        }
        if let Err(e) = client
            .send_chat_presence(&info.chat, ChatPresence::Composing, ChatPresenceMedia::Text)
            .await
        {
            tracing::debug!(chat = %chat, error = %e, "Failed to set typing indicator");
        }

        self.answer(message, &question).await;

        clear_composing(client.as_ref(), &info.chat).await;
        if let Err(e) = client.send_presence(Presence::Unavailable).await {
            tracing::debug!(error = %e, "Failed to send unavailable presence");
        }
    }

    async fn answer(&self, message: &MessageEvent, question: &str) {
        let info = &message.info;
        let text = match self.gateway.respond(question).await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => FALLBACK_RESPONSE.to_string(),
            Err(e) => {
                tracing::error!(
                    chat = %info.chat.masked(),
                    provider = self.gateway.provider_name(),
                    error = %e,
                    "Backend failed to answer"
                );
                FALLBACK_RESPONSE.to_string()
            }
        };

        let quoted = QuotedMessage {
            id: info.id.clone(),
            sender: info.sender.clone(),
        };
        if let Err(e) = self.responder.reply(&info.chat, &text, Some(&quoted)).await {
            tracing::error!(chat = %info.chat.masked(), error = %e, "Failed to send response");
        }
    }
}

#[async_trait]
impl EventHandler for MessageRouter {
    async fn handle(&self, event: Event) {
        if let Event::Message(message) = event {
            self.route(&message).await;
        }
    }
}
