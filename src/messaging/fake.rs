//! In-process fake messaging client for unit and integration tests
//!
//! [`FakeClient`] implements [`MessagingClient`] entirely in memory and
//! records every call so tests can assert on presence updates, sent
//! messages and connection attempts. [`FakeClientFactory`] hands out fake
//! clients and keeps a reference to each so the test can drive them after
//! the code under test has taken ownership.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use wagpt::messaging::fake::FakeClient;
//! use wagpt::messaging::{Jid, MessagingClient, OutgoingMessage};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let client = Arc::new(FakeClient::logged_in("628111@s.whatsapp.net".parse().unwrap()));
//! client.connect().await.unwrap();
//!
//! let to: Jid = "628222@s.whatsapp.net".parse().unwrap();
//! let id = client.generate_message_id();
//! client
//!     .send_message(&to, &id, OutgoingMessage::Text { body: "hi".into() })
//!     .await
//!     .unwrap();
//!
//! assert_eq!(client.sent_messages()[0].message.body(), "hi");
//! # }
//! ```

use crate::error::{Result, WagptError};
use crate::messaging::{
    ChatPresence, ChatPresenceMedia, ClientFactory, ClientProps, Event, EventHandler,
    Jid, MessagingClient, OutgoingMessage, PairingCode, Presence, QrCode, SendReceipt,
};
use crate::store::DeviceIdentity;

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// A message recorded by [`FakeClient::send_message`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: Jid,
    pub id: String,
    pub message: OutgoingMessage,
}

/// Recording in-memory messaging client
#[derive(Default)]
pub struct FakeClient {
    own_id: Mutex<Option<Jid>>,
    connected: AtomicBool,
    logged_in: AtomicBool,
    fail_connect: AtomicBool,
    fail_send: AtomicBool,
    fail_logout: AtomicBool,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    next_id: AtomicU32,
    handlers: Mutex<Vec<Arc<dyn EventHandler>>>,
    sent: Mutex<Vec<SentMessage>>,
    presences: Mutex<Vec<Presence>>,
    chat_presences: Mutex<Vec<(Jid, ChatPresence)>>,
    paired_phones: Mutex<Vec<String>>,
}

fn snapshot<T: Clone>(slot: &Mutex<Vec<T>>) -> Vec<T> {
    slot.lock().map(|items| items.clone()).unwrap_or_default()
}

fn record<T>(slot: &Mutex<Vec<T>>, item: T) {
    if let Ok(mut items) = slot.lock() {
        items.push(item);
    }
}

impl FakeClient {
    /// An unpaired client
    pub fn new() -> Self {
        Self::default()
    }

    /// A paired, authenticated (but not yet connected) client
    pub fn logged_in(own_id: Jid) -> Self {
        let client = Self::default();
        client.set_own_id(Some(own_id));
        client.set_logged_in(true);
        client
    }

    pub fn set_own_id(&self, jid: Option<Jid>) {
        if let Ok(mut own) = self.own_id.lock() {
            *own = jid;
        }
    }

    /// Simulate the transport going up or down
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn set_logged_in(&self, logged_in: bool) {
        self.logged_in.store(logged_in, Ordering::SeqCst);
    }

    /// Make `connect` fail until reset
    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make `send_message` fail until reset
    pub fn fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    /// Make `logout` fail until reset
    pub fn fail_logout(&self, fail: bool) {
        self.fail_logout.store(fail, Ordering::SeqCst);
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.lock().map(|h| h.len()).unwrap_or(0)
    }

    pub fn sent_messages(&self) -> Vec<SentMessage> {
        snapshot(&self.sent)
    }

    pub fn presences(&self) -> Vec<Presence> {
        snapshot(&self.presences)
    }

    pub fn chat_presences(&self) -> Vec<(Jid, ChatPresence)> {
        snapshot(&self.chat_presences)
    }

    pub fn paired_phones(&self) -> Vec<String> {
        snapshot(&self.paired_phones)
    }

    /// Deliver `event` to every handler and wait for all of them
    pub async fn emit(&self, event: Event) {
        let handlers: Vec<Arc<dyn EventHandler>> = snapshot(&self.handlers);
        for handler in handlers {
            handler.handle(event.clone()).await;
        }
    }
}

#[async_trait]
impl MessagingClient for FakeClient {
    fn own_id(&self) -> Option<Jid> {
        self.own_id.lock().ok().and_then(|own| own.clone())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> Result<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(WagptError::Connection("fake connect failure".to_string()).into());
        }
        self.set_connected(true);
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.set_connected(false);
    }

    fn add_event_handler(&self, handler: Arc<dyn EventHandler>) {
        record(&self.handlers, handler);
    }

    fn remove_event_handlers(&self) {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.clear();
        }
    }

    fn generate_message_id(&self) -> String {
        format!("FAKE{:04}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn send_message(
        &self,
        to: &Jid,
        id: &str,
        message: OutgoingMessage,
    ) -> Result<SendReceipt> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(WagptError::Connection("fake send failure".to_string()).into());
        }
        record(
            &self.sent,
            SentMessage {
                to: to.clone(),
                id: id.to_string(),
                message,
            },
        );
        Ok(SendReceipt {
            id: id.to_string(),
            timestamp: Utc::now(),
        })
    }

    async fn send_presence(&self, presence: Presence) -> Result<()> {
        record(&self.presences, presence);
        Ok(())
    }

    async fn send_chat_presence(
        &self,
        chat: &Jid,
        state: ChatPresence,
        _media: ChatPresenceMedia,
    ) -> Result<()> {
        record(&self.chat_presences, (chat.clone(), state));
        Ok(())
    }

    async fn pair_phone(
        &self,
        phone: &str,
        _show_push_notification: bool,
        _client_display_name: &str,
    ) -> Result<PairingCode> {
        record(&self.paired_phones, phone.to_string());
        Ok(PairingCode {
            code: "ABCD-EFGH".to_string(),
            expires_in: crate::messaging::default_pairing_expiry(),
        })
    }

    async fn qr_codes(&self) -> Result<mpsc::Receiver<QrCode>> {
        let (tx, rx) = mpsc::channel(1);
        let _ = tx
            .send(QrCode {
                code: "2@fake-qr".to_string(),
                timeout: 60,
            })
            .await;
        Ok(rx)
    }

    async fn logout(&self) -> Result<()> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_logout.load(Ordering::SeqCst) {
            return Err(WagptError::Connection("fake logout failure".to_string()).into());
        }
        self.set_logged_in(false);
        self.set_connected(false);
        Ok(())
    }
}

/// Factory producing [`FakeClient`]s
///
/// Clients built for paired identities start logged in. When
/// `connect_fails` is set, every new client refuses to connect.
#[derive(Default)]
pub struct FakeClientFactory {
    built: Mutex<Vec<Arc<FakeClient>>>,
    connect_fails: AtomicBool,
}

impl FakeClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make clients built from now on fail to connect
    pub fn connect_fails(&self, fail: bool) {
        self.connect_fails.store(fail, Ordering::SeqCst);
    }

    /// Every client built so far, oldest first
    pub fn clients(&self) -> Vec<Arc<FakeClient>> {
        snapshot(&self.built)
    }

    /// The most recently built client
    pub fn last_client(&self) -> Option<Arc<FakeClient>> {
        self.clients().pop()
    }
}

impl ClientFactory for FakeClientFactory {
    fn build(
        &self,
        identity: DeviceIdentity,
        _props: &ClientProps,
    ) -> Result<Arc<dyn MessagingClient>> {
        let client = Arc::new(FakeClient::new());
        client.set_logged_in(identity.is_paired());
        client.set_own_id(identity.jid);
        client.fail_connect(self.connect_fails.load(Ordering::SeqCst));
        record(&self.built, Arc::clone(&client));
        Ok(client)
    }
}
