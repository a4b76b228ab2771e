//! Messaging client abstraction
//!
//! Addresses, events and the [`MessagingClient`] contract, plus the bridge
//! binding used in production and an in-memory fake for tests.

pub mod bridge;
pub mod client;
pub mod fake;
pub mod jid;
pub mod types;

pub use bridge::{BridgeClient, BridgeClientFactory};
pub use client::{ClientFactory, EventHandler, MessagingClient};
pub use jid::{mask_identifier, Jid, GROUP_SERVER, USER_SERVER};
pub use types::{
    default_pairing_expiry, host_os_name, ChatPresence, ChatPresenceMedia, ClientProps, Event,
    MessageEvent, MessageInfo, OutgoingMessage, PairedDevice, PairingCode, Presence, QrCode,
    SendReceipt,
};
