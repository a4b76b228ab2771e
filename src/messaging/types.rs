//! Events, outbound payloads and client properties

use crate::config::WhatsAppConfig;
use crate::messaging::Jid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata of an inbound message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageInfo {
    pub id: String,
    /// Conversation the message belongs to (user or group)
    pub chat: Jid,
    /// Author of the message
    pub sender: Jid,
    #[serde(default)]
    pub is_from_me: bool,
    #[serde(default)]
    pub push_name: String,
    /// Non-empty for image, audio, video, document and sticker messages
    #[serde(default)]
    pub media_type: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// Inbound message event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub info: MessageInfo,
    /// Plain conversation text, if the message carries any
    #[serde(default)]
    pub conversation: Option<String>,
}

impl MessageEvent {
    /// Message text, empty for messages without a conversation body
    pub fn body(&self) -> &str {
        self.conversation.as_deref().unwrap_or("")
    }

    /// True for media messages
    pub fn is_media(&self) -> bool {
        !self.info.media_type.is_empty()
    }
}

/// Identity material delivered when a new device finishes linking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairedDevice {
    pub jid: Jid,
    #[serde(default)]
    pub push_name: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub credentials: serde_json::Value,
}

/// Events delivered by a messaging client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Message(MessageEvent),
    Connected,
    Disconnected,
    LoggedOut {
        #[serde(default)]
        reason: String,
    },
    PairSuccess(PairedDevice),
}

/// Outbound text payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutgoingMessage {
    /// Plain conversation text
    Text { body: String },
    /// Text quoting an earlier message
    Reply {
        body: String,
        quoted_id: String,
        quoted_sender: Jid,
    },
}

impl OutgoingMessage {
    pub fn body(&self) -> &str {
        match self {
            OutgoingMessage::Text { body } | OutgoingMessage::Reply { body, .. } => body,
        }
    }
}

/// Server acknowledgement of a sent message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub id: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// Account-wide presence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Available,
    Unavailable,
}

/// Per-chat typing state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatPresence {
    Composing,
    Paused,
}

/// What the typing indicator shows; the bot only ever types text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatPresenceMedia {
    Text,
}

/// Phone-number linking code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingCode {
    pub code: String,
    /// Seconds until the code expires
    #[serde(default = "default_pairing_expiry")]
    pub expires_in: u64,
}

/// Pairing codes are valid for 160 seconds
pub fn default_pairing_expiry() -> u64 {
    160
}

/// One QR linking code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrCode {
    pub code: String,
    /// Seconds until the next code replaces this one
    pub timeout: u64,
}

/// Properties announced to the messaging service when connecting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientProps {
    /// Operating system shown in the linked devices list
    pub os: String,
    /// Platform type shown in the linked devices list
    pub platform: String,
    /// Client version override
    #[serde(default)]
    pub version: Option<(u32, u32, u32)>,
    /// Proxy for the messaging connection
    #[serde(default)]
    pub proxy_url: Option<String>,
}

impl ClientProps {
    pub fn from_config(config: &WhatsAppConfig) -> Self {
        Self {
            os: host_os_name().to_string(),
            platform: crate::store::DEFAULT_PLATFORM.to_string(),
            version: config.version.triple(),
            proxy_url: config.proxy_url.clone(),
        }
    }
}

impl Default for ClientProps {
    fn default() -> Self {
        Self {
            os: host_os_name().to_string(),
            platform: crate::store::DEFAULT_PLATFORM.to_string(),
            version: None,
            proxy_url: None,
        }
    }
}

/// Display name of the host operating system
pub fn host_os_name() -> &'static str {
    match std::env::consts::OS {
        "windows" => "Windows",
        "macos" => "macOS",
        _ => "Linux",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_event_deserializes() {
        let event: Event = serde_json::from_value(json!({
            "type": "message",
            "info": {
                "id": "ABC",
                "chat": "628111@s.whatsapp.net",
                "sender": "628111@s.whatsapp.net",
                "media_type": ""
            },
            "conversation": "ask hi"
        }))
        .unwrap();

        match event {
            Event::Message(message) => {
                assert_eq!(message.body(), "ask hi");
                assert!(!message.is_media());
                assert!(!message.info.is_from_me);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_unit_events_deserialize() {
        let event: Event = serde_json::from_value(json!({"type": "disconnected"})).unwrap();
        assert_eq!(event, Event::Disconnected);

        let event: Event = serde_json::from_value(json!({"type": "logged_out"})).unwrap();
        assert_eq!(
            event,
            Event::LoggedOut {
                reason: String::new()
            }
        );
    }

    #[test]
    fn test_outgoing_reply_serializes() {
        let message = OutgoingMessage::Reply {
            body: "4".to_string(),
            quoted_id: "ABC".to_string(),
            quoted_sender: "628111@s.whatsapp.net".parse().unwrap(),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["kind"], "reply");
        assert_eq!(json["quoted_sender"], "628111@s.whatsapp.net");
        assert_eq!(message.body(), "4");
    }

    #[test]
    fn test_pairing_code_default_expiry() {
        let code: PairingCode = serde_json::from_value(json!({"code": "ABCD-EFGH"})).unwrap();
        assert_eq!(code.expires_in, 160);
    }

    #[test]
    fn test_host_os_name_is_known() {
        assert!(["Windows", "macOS", "Linux"].contains(&host_os_name()));
    }
}
