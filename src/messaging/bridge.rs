//! HTTP binding to a multi-device bridge service
//!
//! The bridge owns the messaging protocol (noise handshake, signal
//! sessions, media) and exposes a small JSON API. Commands are plain POSTs;
//! events arrive as Server-Sent Events on `GET /events`, one JSON-encoded
//! [`Event`] per `data:` payload.
//!
//! | Operation | Request |
//! |---|---|
//! | connect | `POST /session/connect` |
//! | disconnect | `POST /session/disconnect` |
//! | logout | `POST /session/logout` |
//! | events | `GET /events` (SSE) |
//! | send message | `POST /messages` |
//! | presence | `POST /presence` |
//! | chat presence | `POST /chat-presence` |
//! | phone pairing | `POST /pair/phone` |
//! | QR pairing | `GET /pair/qr` (SSE) |
//!
//! After connect, every request carries the `X-Session-Id` header returned
//! by the bridge.

use crate::error::{Result, WagptError};
use crate::messaging::{
    ChatPresence, ChatPresenceMedia, ClientFactory, ClientProps, Event, EventHandler,
    Jid, MessagingClient, OutgoingMessage, PairingCode, Presence, QrCode, SendReceipt,
};
use crate::sse;
use crate::store::DeviceIdentity;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

const SESSION_HEADER: &str = "X-Session-Id";

/// Client for one device identity on the bridge
pub struct BridgeClient {
    http: Client,
    stream_http: Client,
    base: Url,
    identity: DeviceIdentity,
    props: ClientProps,
    shared: Arc<Shared>,
    events_task: Mutex<Option<JoinHandle<()>>>,
}

/// State touched by both the client and its event task
#[derive(Default)]
struct Shared {
    connected: AtomicBool,
    logged_in: AtomicBool,
    own_id: RwLock<Option<Jid>>,
    session_id: RwLock<Option<String>>,
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

#[derive(Debug, Serialize)]
struct ConnectRequest<'a> {
    jid: Option<&'a Jid>,
    credentials: &'a serde_json::Value,
    props: &'a ClientProps,
}

#[derive(Debug, Deserialize)]
struct ConnectResponse {
    session_id: String,
    #[serde(default)]
    jid: Option<Jid>,
    #[serde(default)]
    logged_in: bool,
}

impl Shared {
    fn session_id(&self) -> Option<String> {
        self.session_id.read().ok().and_then(|sid| sid.clone())
    }

    fn set_own_id(&self, jid: Option<Jid>) {
        if let Ok(mut own) = self.own_id.write() {
            *own = jid;
        }
    }

    fn handlers(&self) -> Vec<Arc<dyn EventHandler>> {
        self.handlers
            .read()
            .map(|handlers| handlers.to_vec())
            .unwrap_or_default()
    }

    /// Update connection state from `event`, then fan it out
    fn dispatch(&self, event: Event) {
        match &event {
            Event::Connected => self.connected.store(true, Ordering::SeqCst),
            Event::Disconnected => self.connected.store(false, Ordering::SeqCst),
            Event::LoggedOut { reason } => {
                tracing::warn!(reason = %reason, "Device was logged out");
                self.logged_in.store(false, Ordering::SeqCst);
                self.connected.store(false, Ordering::SeqCst);
            }
            Event::PairSuccess(device) => {
                self.set_own_id(Some(device.jid.clone()));
                self.logged_in.store(true, Ordering::SeqCst);
            }
            Event::Message(_) => {}
        }

        for handler in self.handlers() {
            let event = event.clone();
            tokio::spawn(async move {
                handler.handle(event).await;
            });
        }
    }
}

impl BridgeClient {
    /// Create a client for `identity`
    ///
    /// # Errors
    ///
    /// Returns [`WagptError::Connection`] if HTTP client initialization fails
    pub fn new(base: Url, identity: DeviceIdentity, props: ClientProps) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("wagpt/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WagptError::Connection(format!("Failed to create HTTP client: {}", e)))?;
        let stream_http = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("wagpt/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WagptError::Connection(format!("Failed to create HTTP client: {}", e)))?;

        let shared = Shared::default();
        shared.set_own_id(identity.jid.clone());
        shared
            .logged_in
            .store(identity.is_paired(), Ordering::SeqCst);

        Ok(Self {
            http,
            stream_http,
            base,
            identity,
            props,
            shared: Arc::new(shared),
            events_task: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| WagptError::Connection(format!("Invalid bridge path {}: {}", path, e)).into())
    }

    fn request(&self, client: &Client, method: Method, path: &str) -> Result<RequestBuilder> {
        let mut req = client.request(method, self.url(path)?);
        if let Some(sid) = self.shared.session_id() {
            req = req.header(SESSION_HEADER, sid);
        }
        Ok(req)
    }

    async fn send(&self, req: RequestBuilder, what: &str) -> Result<reqwest::Response> {
        let response = req
            .send()
            .await
            .map_err(|e| WagptError::Connection(format!("{} failed: {}", what, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(WagptError::Connection(format!(
                "{} returned {}: {}",
                what, status, error_text
            ))
            .into());
        }
        Ok(response)
    }

    async fn post_json(&self, path: &str, body: serde_json::Value, what: &str) -> Result<reqwest::Response> {
        let req = self.request(&self.http, Method::POST, path)?.json(&body);
        self.send(req, what).await
    }

    fn stop_events(&self) {
        if let Ok(mut task) = self.events_task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }

    async fn open_events(&self) -> Result<()> {
        let req = self
            .request(&self.stream_http, Method::GET, "events")?
            .header("Accept", "text/event-stream");
        let response = self.send(req, "Event stream").await?;

        self.shared.connected.store(true, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            let result = sse::for_each_event(response.bytes_stream(), |frame| {
                match serde_json::from_str::<Event>(&frame.data) {
                    Ok(event) => shared.dispatch(event),
                    Err(e) => tracing::debug!("Ignoring unknown bridge event: {}", e),
                }
                true
            })
            .await;

            if let Err(e) = result {
                tracing::warn!("Bridge event stream failed: {}", e);
            }
            shared.connected.store(false, Ordering::SeqCst);
        });

        self.stop_events();
        if let Ok(mut task) = self.events_task.lock() {
            *task = Some(handle);
        }
        Ok(())
    }
}

impl Drop for BridgeClient {
    fn drop(&mut self) {
        self.stop_events();
    }
}

#[async_trait]
impl MessagingClient for BridgeClient {
    fn own_id(&self) -> Option<Jid> {
        self.shared.own_id.read().ok().and_then(|own| own.clone())
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn is_logged_in(&self) -> bool {
        self.shared.logged_in.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> Result<()> {
        let body = ConnectRequest {
            jid: self.identity.jid.as_ref(),
            credentials: &self.identity.credentials,
            props: &self.props,
        };
        let req = self
            .request(&self.http, Method::POST, "session/connect")?
            .json(&body);
        let session: ConnectResponse = self
            .send(req, "Connect")
            .await?
            .json()
            .await
            .map_err(|e| WagptError::Connection(format!("Invalid connect response: {}", e)))?;

        if let Ok(mut sid) = self.shared.session_id.write() {
            *sid = Some(session.session_id);
        }
        if session.jid.is_some() {
            self.shared.set_own_id(session.jid);
        }
        self.shared
            .logged_in
            .store(session.logged_in, Ordering::SeqCst);

        self.open_events().await
    }

    async fn disconnect(&self) {
        self.stop_events();
        self.shared.connected.store(false, Ordering::SeqCst);

        if self.shared.session_id().is_some() {
            if let Err(e) = self
                .post_json("session/disconnect", json!({}), "Disconnect")
                .await
            {
                tracing::debug!("Bridge disconnect failed: {}", e);
            }
        }
    }

    fn add_event_handler(&self, handler: Arc<dyn EventHandler>) {
        if let Ok(mut handlers) = self.shared.handlers.write() {
            handlers.push(handler);
        }
    }

    fn remove_event_handlers(&self) {
        if let Ok(mut handlers) = self.shared.handlers.write() {
            handlers.clear();
        }
    }

    fn generate_message_id(&self) -> String {
        let hex = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
        format!("3EB0{}", &hex[..16])
    }

    async fn send_message(
        &self,
        to: &Jid,
        id: &str,
        message: OutgoingMessage,
    ) -> Result<SendReceipt> {
        let body = json!({ "id": id, "to": to, "message": message });
        self.post_json("messages", body, "Send message")
            .await?
            .json()
            .await
            .map_err(|e| WagptError::Connection(format!("Invalid send response: {}", e)).into())
    }

    async fn send_presence(&self, presence: Presence) -> Result<()> {
        self.post_json("presence", json!({ "presence": presence }), "Presence")
            .await?;
        Ok(())
    }

    async fn send_chat_presence(
        &self,
        chat: &Jid,
        state: ChatPresence,
        media: ChatPresenceMedia,
    ) -> Result<()> {
        let body = json!({ "chat": chat, "state": state, "media": media });
        self.post_json("chat-presence", body, "Chat presence").await?;
        Ok(())
    }

    async fn pair_phone(
        &self,
        phone: &str,
        show_push_notification: bool,
        client_display_name: &str,
    ) -> Result<PairingCode> {
        let body = json!({
            "phone": phone,
            "show_push_notification": show_push_notification,
            "client_display_name": client_display_name,
        });
        self.post_json("pair/phone", body, "Phone pairing")
            .await
            .map_err(|e| WagptError::Pairing(e.to_string()))?
            .json()
            .await
            .map_err(|e| WagptError::Pairing(format!("Invalid pairing response: {}", e)).into())
    }

    async fn qr_codes(&self) -> Result<mpsc::Receiver<QrCode>> {
        let req = self
            .request(&self.stream_http, Method::GET, "pair/qr")?
            .header("Accept", "text/event-stream");
        let response = self
            .send(req, "QR pairing")
            .await
            .map_err(|e| WagptError::Pairing(e.to_string()))?;

        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            let result = sse::for_each_event(response.bytes_stream(), |frame| {
                match serde_json::from_str::<QrCode>(&frame.data) {
                    Ok(code) => tx.try_send(code).is_ok(),
                    Err(_) => frame.event.as_deref() != Some("done"),
                }
            })
            .await;
            if let Err(e) = result {
                tracing::warn!("QR code stream failed: {}", e);
            }
        });
        Ok(rx)
    }

    async fn logout(&self) -> Result<()> {
        self.post_json("session/logout", json!({}), "Logout").await?;
        self.stop_events();
        self.shared.logged_in.store(false, Ordering::SeqCst);
        self.shared.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Builds [`BridgeClient`]s against one bridge URL
pub struct BridgeClientFactory {
    base: Url,
}

impl BridgeClientFactory {
    /// # Errors
    ///
    /// Returns [`WagptError::Config`] if `base_url` is not a valid URL
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|e| WagptError::Config(format!("Invalid bridge URL {}: {}", base_url, e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { base })
    }
}

impl ClientFactory for BridgeClientFactory {
    fn build(
        &self,
        identity: DeviceIdentity,
        props: &ClientProps,
    ) -> Result<Arc<dyn MessagingClient>> {
        Ok(Arc::new(BridgeClient::new(
            self.base.clone(),
            identity,
            props.clone(),
        )?))
    }
}
