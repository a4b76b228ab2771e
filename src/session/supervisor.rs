//! Reconnect loop for the active session
//!
//! The supervisor polls the active client on a fixed cadence. It restores
//! the stored identity while none is bound, subscribes the router once the
//! client is connected, and tears down and reloads when connectivity drops.
//! Every wait races a [`CancellationToken`], so shutdown is observed within
//! one timer tick rather than one full poll interval.

use crate::messaging::EventHandler;
use crate::session::{SessionManager, SessionState};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Waits used by [`SessionSupervisor::run`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorTiming {
    /// Delay before the first poll
    pub settle: Duration,
    /// Delay between polls
    pub poll: Duration,
    /// Extra wait after a lost connection has been torn down
    pub cool_down: Duration,
}

impl Default for SupervisorTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(1),
            poll: Duration::from_secs(5),
            cool_down: Duration::from_secs(3),
        }
    }
}

/// Single supervisor for the process's active session
pub struct SessionSupervisor {
    manager: Arc<SessionManager>,
    router: Arc<dyn EventHandler>,
    timing: SupervisorTiming,
    handler_installed: AtomicBool,
}

impl SessionSupervisor {
    pub fn new(manager: Arc<SessionManager>, router: Arc<dyn EventHandler>) -> Self {
        Self::with_timing(manager, router, SupervisorTiming::default())
    }

    pub fn with_timing(
        manager: Arc<SessionManager>,
        router: Arc<dyn EventHandler>,
        timing: SupervisorTiming,
    ) -> Self {
        Self {
            manager,
            router,
            timing,
            handler_installed: AtomicBool::new(false),
        }
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        SessionState::of(
            self.manager.client().as_ref(),
            self.handler_installed.load(Ordering::SeqCst),
        )
    }

    /// Poll until `shutdown` is cancelled, then unsubscribe and disconnect
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(
            poll_secs = self.timing.poll.as_secs_f32(),
            "Session supervisor started"
        );

        if !wait_or_cancelled(&shutdown, self.timing.settle).await {
            loop {
                let cool_down = self.tick().await;

                if !cool_down.is_zero() && wait_or_cancelled(&shutdown, cool_down).await {
                    break;
                }
                if wait_or_cancelled(&shutdown, self.timing.poll).await {
                    break;
                }
            }
        }

        self.manager.shutdown().await;
        self.handler_installed.store(false, Ordering::SeqCst);
        tracing::info!("Session supervisor stopped");
    }

    /// Run one poll step
    ///
    /// Returns the cool-down to observe before the next poll, which is
    /// non-zero only after a lost connection was torn down.
    pub async fn tick(&self) -> Duration {
        let Some(client) = self.manager.client() else {
            if self.manager.reload().await.is_none() {
                tracing::warn!("No linked device, waiting for login");
            }
            self.handler_installed.store(false, Ordering::SeqCst);
            return Duration::ZERO;
        };

        if client.is_connected() {
            if !self.handler_installed.swap(true, Ordering::SeqCst) {
                tracing::info!("Client connected, subscribing message router");
                client.add_event_handler(Arc::clone(&self.router));
            }
            return Duration::ZERO;
        }

        tracing::warn!(
            cool_down_secs = self.timing.cool_down.as_secs_f32(),
            "Client connection interrupted, reloading"
        );
        client.remove_event_handlers();
        client.disconnect().await;
        self.manager.reload().await;
        self.handler_installed.store(false, Ordering::SeqCst);
        self.timing.cool_down
    }
}

/// Sleep for `duration`; true if `token` was cancelled first
async fn wait_or_cancelled(token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::fake::FakeClientFactory;
    use crate::messaging::{ClientProps, Event, Jid};
    use crate::store::{DeviceIdentity, MemoryDeviceStore};
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl EventHandler for Noop {
        async fn handle(&self, _event: Event) {}
    }

    fn supervisor(store: Arc<MemoryDeviceStore>) -> (SessionSupervisor, Arc<FakeClientFactory>) {
        let factory = Arc::new(FakeClientFactory::new());
        let manager = Arc::new(SessionManager::new(
            store,
            factory.clone(),
            ClientProps::default(),
        ));
        let supervisor = SessionSupervisor::with_timing(
            manager,
            Arc::new(Noop),
            SupervisorTiming {
                settle: Duration::from_millis(1),
                poll: Duration::from_millis(5),
                cool_down: Duration::from_millis(5),
            },
        );
        (supervisor, factory)
    }

    fn linked() -> DeviceIdentity {
        DeviceIdentity {
            jid: Some(Jid::new("628111222333", crate::messaging::USER_SERVER)),
            ..DeviceIdentity::unpaired()
        }
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLog {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    async fn tick_with_log(supervisor: &SessionSupervisor) -> String {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);
        supervisor.tick().await;
        log.contents()
    }

    #[tokio::test]
    async fn test_waiting_for_login_logged_only_when_store_is_empty() {
        let (restored, _) = supervisor(Arc::new(MemoryDeviceStore::with_devices(vec![linked()])));
        let output = tick_with_log(&restored).await;
        assert!(!output.contains("waiting for login"), "{}", output);
        assert_eq!(restored.state(), SessionState::ConnectedNoHandler);

        let (empty, _) = supervisor(Arc::new(MemoryDeviceStore::new()));
        let output = tick_with_log(&empty).await;
        assert!(output.contains("No linked device, waiting for login"), "{}", output);
    }

    #[test]
    fn test_default_timing() {
        let timing = SupervisorTiming::default();
        assert_eq!(timing.settle, Duration::from_secs(1));
        assert_eq!(timing.poll, Duration::from_secs(5));
        assert_eq!(timing.cool_down, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_tick_walks_states() {
        let store = Arc::new(MemoryDeviceStore::with_devices(vec![linked()]));
        let (supervisor, factory) = supervisor(store);
        assert_eq!(supervisor.state(), SessionState::Absent);

        // Reload binds and connects the stored identity
        assert_eq!(supervisor.tick().await, Duration::ZERO);
        assert_eq!(supervisor.state(), SessionState::ConnectedNoHandler);

        supervisor.tick().await;
        assert_eq!(supervisor.state(), SessionState::Connected);
        assert_eq!(factory.last_client().unwrap().handler_count(), 1);

        supervisor.tick().await;
        assert_eq!(factory.last_client().unwrap().handler_count(), 1);
    }

    #[tokio::test]
    async fn test_tick_on_lost_connection() {
        let store = Arc::new(MemoryDeviceStore::with_devices(vec![linked()]));
        let (supervisor, factory) = supervisor(store);
        supervisor.tick().await;
        supervisor.tick().await;

        let lost = factory.last_client().unwrap();
        lost.set_connected(false);
        assert_eq!(supervisor.state(), SessionState::Disconnected);

        assert_eq!(supervisor.tick().await, Duration::from_millis(5));
        assert_eq!(lost.handler_count(), 0);
        assert_eq!(factory.clients().len(), 2);
        assert_eq!(supervisor.state(), SessionState::ConnectedNoHandler);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let store = Arc::new(MemoryDeviceStore::with_devices(vec![linked()]));
        let (supervisor, factory) = supervisor(store);
        let token = CancellationToken::new();
        token.cancel();

        supervisor.run(token).await;
        assert!(factory.clients().is_empty());
        assert_eq!(supervisor.state(), SessionState::Absent);
    }

    #[tokio::test]
    async fn test_wait_or_cancelled() {
        let token = CancellationToken::new();
        assert!(!wait_or_cancelled(&token, Duration::from_millis(1)).await);
        token.cancel();
        assert!(wait_or_cancelled(&token, Duration::from_secs(60)).await);
    }
}
