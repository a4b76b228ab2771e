//! Identity reload, login and logout over the active session

use crate::error::{Result, WagptError};
use crate::messaging::{
    host_os_name, ClientFactory, ClientProps, Event, EventHandler, MessagingClient, PairedDevice,
    PairingCode, Presence, QrCode,
};
use crate::session::{ActiveSession, SessionHandle};
use crate::store::{DeviceIdentity, DeviceStore};

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Result of a login attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Enter this code on the phone to link the device
    PairCode(PairingCode),
    /// Scan this code with the phone to link the device
    QrCode(QrCode),
    /// The stored identity was reconnected; nothing to link
    AlreadyLoggedIn,
}

/// Owner of the active session
///
/// Everything that binds, replaces or drops the active client goes through
/// here. Collaborators that only need to send get a [`SessionHandle`].
pub struct SessionManager {
    store: Arc<dyn DeviceStore>,
    factory: Arc<dyn ClientFactory>,
    props: ClientProps,
    active: ActiveSession,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn DeviceStore>,
        factory: Arc<dyn ClientFactory>,
        props: ClientProps,
    ) -> Self {
        Self {
            store,
            factory,
            props,
            active: ActiveSession::new(),
        }
    }

    /// Read-only view of the active session
    pub fn handle(&self) -> SessionHandle {
        self.active.handle()
    }

    /// The active client, if any
    pub fn client(&self) -> Option<Arc<dyn MessagingClient>> {
        self.active.client()
    }

    /// Drop the active client and restore the first stored identity
    ///
    /// Store failures are logged and treated as an empty store. Connect
    /// failures are logged; the client stays bound so the supervisor can
    /// retry on its next poll.
    pub async fn reload(&self) -> Option<Arc<dyn MessagingClient>> {
        self.active.clear();

        let devices = match self.store.all_devices() {
            Ok(devices) => devices,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load devices from store");
                Vec::new()
            }
        };

        if devices.len() > 1 {
            tracing::debug!(count = devices.len(), "Several devices stored, using the first");
        }

        let device = devices.into_iter().next()?;
        let masked = device
            .jid
            .as_ref()
            .map(|jid| jid.masked())
            .unwrap_or_default();
        tracing::info!(device = %masked, "Restoring client connection");

        let client = match self.init_client(Some(device)) {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(device = %masked, error = %e, "Failed to build client");
                return None;
            }
        };

        if let Err(e) = self.reconnect().await {
            tracing::error!(device = %masked, error = %e, "Failed to connect client");
        }

        Some(client)
    }

    /// Bind a client for `identity`, or a new unpaired one
    ///
    /// Does nothing if a client is already active and returns that client.
    pub fn init_client(
        &self,
        identity: Option<DeviceIdentity>,
    ) -> Result<Arc<dyn MessagingClient>> {
        if let Some(existing) = self.active.client() {
            return Ok(existing);
        }

        let identity = identity.unwrap_or_else(|| self.store.new_device());
        let client = self.factory.build(identity, &self.props)?;
        self.active.replace(Arc::clone(&client));
        Ok(client)
    }

    /// Close and reopen the active client's connection
    pub async fn reconnect(&self) -> Result<()> {
        let client = self.active.client().ok_or(WagptError::ClientUnavailable)?;
        client.disconnect().await;
        client.connect().await
    }

    /// Link by phone number
    ///
    /// An already linked client is reconnected instead. `phone` is digits
    /// only, country code first.
    pub async fn login(&self, phone: &str) -> Result<LoginOutcome> {
        let client = self.init_client(None)?;
        client.disconnect().await;

        if client.own_id().is_some() {
            self.reconnect().await?;
            return Ok(LoginOutcome::AlreadyLoggedIn);
        }

        client.connect().await?;
        let display_name = format!("Chrome ({})", host_os_name());
        let code = client.pair_phone(phone, true, &display_name).await?;
        tracing::info!(expires_in = code.expires_in, "Pairing code issued");
        Ok(LoginOutcome::PairCode(code))
    }

    /// Link by QR code; returns the first code issued
    pub async fn login_qr(&self) -> Result<LoginOutcome> {
        let client = self.init_client(None)?;
        client.disconnect().await;

        if client.own_id().is_some() {
            self.reconnect().await?;
            return Ok(LoginOutcome::AlreadyLoggedIn);
        }

        // The channel has to exist before connecting or the first code is lost
        let mut codes = client.qr_codes().await?;
        client.connect().await?;

        match codes.recv().await {
            Some(code) => Ok(LoginOutcome::QrCode(code)),
            None => Err(WagptError::Pairing("QR channel closed before a code arrived".into()).into()),
        }
    }

    /// Wait for the phone to confirm linking, then persist the identity
    pub async fn await_pairing(&self, timeout: Duration) -> Result<DeviceIdentity> {
        let client = self.active.client().ok_or(WagptError::ClientUnavailable)?;

        let (tx, mut rx) = mpsc::channel(1);
        client.add_event_handler(Arc::new(PairingWatcher { tx }));

        let paired = tokio::time::timeout(timeout, rx.recv()).await;
        client.remove_event_handlers();

        let device = match paired {
            Ok(Some(device)) => device,
            Ok(None) => {
                return Err(WagptError::Pairing("client stopped before pairing".into()).into())
            }
            Err(_) => {
                return Err(WagptError::Pairing(format!(
                    "no pairing confirmation within {}s",
                    timeout.as_secs()
                ))
                .into())
            }
        };

        let now = Utc::now();
        let identity = DeviceIdentity {
            jid: Some(device.jid),
            push_name: device.push_name,
            platform: if device.platform.is_empty() {
                self.props.platform.clone()
            } else {
                device.platform
            },
            credentials: device.credentials,
            created_at: now,
            updated_at: now,
        };
        self.store.save_device(&identity)?;

        tracing::info!(
            device = %identity.jid.as_ref().map(|j| j.masked()).unwrap_or_default(),
            "Device linked"
        );
        Ok(identity)
    }

    /// Unlink the active device
    ///
    /// If the logout request fails the client is force-disconnected and the
    /// identity is deleted from the store directly. Only when that also
    /// fails is an error returned.
    pub async fn logout(&self) -> Result<()> {
        let client = self.active.client().ok_or(WagptError::ClientUnavailable)?;
        let jid = client
            .own_id()
            .ok_or_else(|| WagptError::Logout("device is not linked".to_string()))?;

        if let Err(e) = client.send_presence(Presence::Unavailable).await {
            tracing::debug!(error = %e, "Failed to send unavailable presence");
        }

        match client.logout().await {
            Ok(()) => {
                self.store.delete_device(&jid)?;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Logout request failed, removing device locally");
                client.disconnect().await;
                self.store
                    .delete_device(&jid)
                    .map_err(|store_err| WagptError::Logout(store_err.to_string()))?;
            }
        }

        self.active.clear();
        tracing::info!(device = %jid.masked(), "Device logged out");
        Ok(())
    }

    /// Unsubscribe everything and close the connection
    pub async fn shutdown(&self) {
        if let Some(client) = self.active.client() {
            client.remove_event_handlers();
            client.disconnect().await;
        }
    }
}

struct PairingWatcher {
    tx: mpsc::Sender<PairedDevice>,
}

#[async_trait]
impl EventHandler for PairingWatcher {
    async fn handle(&self, event: Event) {
        if let Event::PairSuccess(device) = event {
            let _ = self.tx.send(device).await;
        }
    }
}
