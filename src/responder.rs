//! Outbound replies
//!
//! The [`Responder`] sends one text back into a conversation through the
//! active client. Preconditions (client bound, connected, authenticated) are
//! checked first and reported as typed errors. The chat's typing indicator
//! is cleared on every path, successful or not.

use crate::error::{Result, WagptError};
use crate::messaging::{ChatPresence, ChatPresenceMedia, Jid, MessagingClient, OutgoingMessage};
use crate::session::SessionHandle;

/// Message being answered, quoted in one-to-one chats
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotedMessage {
    pub id: String,
    pub sender: Jid,
}

/// Sends replies through the active session
#[derive(Debug, Clone)]
pub struct Responder {
    session: SessionHandle,
}

impl Responder {
    pub fn new(session: SessionHandle) -> Self {
        Self { session }
    }

    /// Send `text` to `chat`, returning the id of the sent message
    ///
    /// In one-to-one chats `quoted` is attached as the replied-to message;
    /// group replies are plain text.
    ///
    /// # Errors
    ///
    /// Returns [`WagptError::ClientUnavailable`], [`WagptError::NotConnected`]
    /// or [`WagptError::NotLoggedIn`] when the client cannot send, or the
    /// client's send error.
    pub async fn reply(
        &self,
        chat: &Jid,
        text: &str,
        quoted: Option<&QuotedMessage>,
    ) -> Result<String> {
        let client = self
            .session
            .client()
            .ok_or(WagptError::ClientUnavailable)?;

        let result = send(client.as_ref(), chat, text, quoted).await;
        clear_composing(client.as_ref(), chat).await;
        result
    }
}

async fn send(
    client: &dyn MessagingClient,
    chat: &Jid,
    text: &str,
    quoted: Option<&QuotedMessage>,
) -> Result<String> {
    if !client.is_connected() {
        return Err(WagptError::NotConnected.into());
    }
    if !client.is_logged_in() {
        return Err(WagptError::NotLoggedIn.into());
    }

    let id = client.generate_message_id();
    let message = match quoted {
        Some(quoted) if !chat.is_group() => OutgoingMessage::Reply {
            body: text.to_string(),
            quoted_id: quoted.id.clone(),
            quoted_sender: quoted.sender.clone(),
        },
        _ => OutgoingMessage::Text {
            body: text.to_string(),
        },
    };

    client.send_message(chat, &id, message).await?;
    tracing::debug!(chat = %chat.masked(), id = %id, "Reply sent");
    Ok(id)
}

/// Best-effort reset of the typing indicator
pub(crate) async fn clear_composing(client: &dyn MessagingClient, chat: &Jid) {
    if let Err(e) = client
        .send_chat_presence(chat, ChatPresence::Paused, ChatPresenceMedia::Text)
        .await
    {
        tracing::debug!(chat = %chat.masked(), error = %e, "Failed to clear typing indicator");
    }
}
