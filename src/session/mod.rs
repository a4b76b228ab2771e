//! Session ownership and lifecycle
//!
//! Exactly one messaging client is active per process. [`ActiveSession`]
//! is the single owner of that slot; everything else gets a
//! [`SessionHandle`], which can read the current client but never replace
//! it. [`SessionManager`] performs identity reload, login and logout on top
//! of the owner, and [`SessionSupervisor`] drives the reconnect loop.

pub mod manager;
pub mod supervisor;

pub use manager::{LoginOutcome, SessionManager};
pub use supervisor::{SessionSupervisor, SupervisorTiming};

use crate::messaging::MessagingClient;
use std::fmt;
use std::sync::{Arc, RwLock};

type ClientSlot = Arc<RwLock<Option<Arc<dyn MessagingClient>>>>;

/// Observable state of the active session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No identity loaded, no client
    Absent,
    /// A client exists but is not connected
    Disconnected,
    /// Connected, router not yet subscribed
    ConnectedNoHandler,
    /// Connected with the router subscribed
    Connected,
}

impl SessionState {
    /// Derive the state from the current client and subscription flag
    pub fn of(client: Option<&Arc<dyn MessagingClient>>, handler_installed: bool) -> Self {
        match client {
            None => SessionState::Absent,
            Some(client) if !client.is_connected() => SessionState::Disconnected,
            Some(_) if handler_installed => SessionState::Connected,
            Some(_) => SessionState::ConnectedNoHandler,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Absent => "absent",
            SessionState::Disconnected => "disconnected",
            SessionState::ConnectedNoHandler => "connected (no handler)",
            SessionState::Connected => "connected",
        };
        write!(f, "{}", name)
    }
}

/// Exclusive owner of the active client slot
///
/// Not `Clone`: whoever holds this value is the only code that can bind or
/// drop the active client.
#[derive(Default)]
pub struct ActiveSession {
    slot: ClientSlot,
}

impl ActiveSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only view for collaborators
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            slot: Arc::clone(&self.slot),
        }
    }

    /// The active client, if any
    pub fn client(&self) -> Option<Arc<dyn MessagingClient>> {
        read_slot(&self.slot)
    }

    /// Bind `client`, returning whatever was bound before
    pub fn replace(&self, client: Arc<dyn MessagingClient>) -> Option<Arc<dyn MessagingClient>> {
        match self.slot.write() {
            Ok(mut guard) => guard.replace(client),
            Err(poisoned) => poisoned.into_inner().replace(client),
        }
    }

    /// Drop the active client
    pub fn clear(&self) -> Option<Arc<dyn MessagingClient>> {
        match self.slot.write() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.client().is_none()
    }
}

/// Shared read-only access to the active client
#[derive(Clone, Default)]
pub struct SessionHandle {
    slot: ClientSlot,
}

impl SessionHandle {
    /// The active client, if any
    pub fn client(&self) -> Option<Arc<dyn MessagingClient>> {
        read_slot(&self.slot)
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("active", &self.client().is_some())
            .finish()
    }
}

fn read_slot(slot: &ClientSlot) -> Option<Arc<dyn MessagingClient>> {
    match slot.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::fake::FakeClient;

    #[test]
    fn test_handle_sees_owner_updates() {
        let session = ActiveSession::new();
        let handle = session.handle();
        assert!(handle.client().is_none());

        session.replace(Arc::new(FakeClient::new()));
        assert!(handle.client().is_some());

        session.clear();
        assert!(handle.client().is_none());
        assert!(session.is_empty());
    }

    #[test]
    fn test_replace_returns_previous() {
        let session = ActiveSession::new();
        assert!(session.replace(Arc::new(FakeClient::new())).is_none());
        assert!(session.replace(Arc::new(FakeClient::new())).is_some());
    }

    #[test]
    fn test_state_derivation() {
        assert_eq!(SessionState::of(None, false), SessionState::Absent);
        assert_eq!(SessionState::of(None, true), SessionState::Absent);

        let fake = Arc::new(FakeClient::new());
        let client: Arc<dyn MessagingClient> = fake.clone();
        assert_eq!(
            SessionState::of(Some(&client), true),
            SessionState::Disconnected
        );

        fake.set_connected(true);
        assert_eq!(
            SessionState::of(Some(&client), false),
            SessionState::ConnectedNoHandler
        );
        assert_eq!(
            SessionState::of(Some(&client), true),
            SessionState::Connected
        );
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::Absent.to_string(), "absent");
        assert_eq!(SessionState::Connected.to_string(), "connected");
    }
}
