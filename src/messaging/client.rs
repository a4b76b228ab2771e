//! Messaging client contracts
//!
//! The protocol itself (transport framing, encryption, pairing handshakes)
//! lives behind [`MessagingClient`]; the rest of the crate only talks to
//! these traits.

use crate::error::Result;
use crate::messaging::{
    ChatPresence, ChatPresenceMedia, ClientProps, Event, Jid, OutgoingMessage, PairingCode,
    Presence, QrCode, SendReceipt,
};
use crate::store::DeviceIdentity;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Subscriber for client events
///
/// Clients invoke `handle` on their own tasks, possibly for several events
/// at once.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Event);
}

/// One live binding to a linked device
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Address of the linked account, once paired
    fn own_id(&self) -> Option<Jid>;

    /// True while the connection is open
    fn is_connected(&self) -> bool;

    /// True once the device is authenticated
    fn is_logged_in(&self) -> bool;

    /// Open the connection
    async fn connect(&self) -> Result<()>;

    /// Close the connection; never fails
    async fn disconnect(&self);

    /// Subscribe `handler` to every future event
    fn add_event_handler(&self, handler: Arc<dyn EventHandler>);

    /// Drop every subscriber
    fn remove_event_handlers(&self);

    /// A fresh id for an outgoing message
    fn generate_message_id(&self) -> String;

    /// Send `message` to `to` under id `id`
    async fn send_message(&self, to: &Jid, id: &str, message: OutgoingMessage)
        -> Result<SendReceipt>;

    async fn send_presence(&self, presence: Presence) -> Result<()>;

    async fn send_chat_presence(
        &self,
        chat: &Jid,
        state: ChatPresence,
        media: ChatPresenceMedia,
    ) -> Result<()>;

    /// Request a phone-number linking code
    async fn pair_phone(
        &self,
        phone: &str,
        show_push_notification: bool,
        client_display_name: &str,
    ) -> Result<PairingCode>;

    /// Stream of QR linking codes; the channel closes when linking ends
    async fn qr_codes(&self) -> Result<mpsc::Receiver<QrCode>>;

    /// Unlink this device from the account
    async fn logout(&self) -> Result<()>;
}

/// Builds clients for stored identities
pub trait ClientFactory: Send + Sync {
    fn build(&self, identity: DeviceIdentity, props: &ClientProps)
        -> Result<Arc<dyn MessagingClient>>;
}
