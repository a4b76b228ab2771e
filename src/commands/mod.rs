/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

- `daemon`: Run the session supervisor until a shutdown signal
- `login`: Link a device by pairing code or QR code
- `logout`: Unlink the stored device
- `version`: Print version information

Every handler that touches the messaging account restores the stored
identity first, the same way the supervisor does on each poll.
*/

use crate::config::Config;
use crate::error::Result;
use crate::messaging::{BridgeClientFactory, ClientProps};
use crate::session::SessionManager;
use crate::store::{open_store, DeviceStore};
use std::sync::Arc;

/// Build the session manager described by `config`
///
/// # Errors
///
/// Returns error if the device store cannot be opened or the bridge URL is
/// invalid
pub fn build_manager(config: &Config) -> Result<Arc<SessionManager>> {
    let store: Arc<dyn DeviceStore> = Arc::from(open_store(
        &config.whatsapp.datastore_type,
        &config.whatsapp.datastore_uri,
    )?);
    let factory = Arc::new(BridgeClientFactory::new(&config.whatsapp.bridge_url)?);
    let props = ClientProps::from_config(&config.whatsapp);

    Ok(Arc::new(SessionManager::new(store, factory, props)))
}

pub mod daemon {
    //! Long-running bot service.
    //!
    //! Builds the gateway and router from configuration, installs signal
    //! handling and hands control to the session supervisor.

    use super::*;
    use crate::gateway::GptGateway;
    use crate::messaging::EventHandler;
    use crate::router::{MessageRouter, TriggerTag};
    use crate::session::{SessionSupervisor, SupervisorTiming};
    use tokio_util::sync::CancellationToken;

    /// Run the bot until SIGINT or SIGTERM
    pub async fn run_daemon(config: Config) -> Result<()> {
        let manager = build_manager(&config)?;
        let token = CancellationToken::new();

        let signal_token = token.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received");
            signal_token.cancel();
        });

        serve(&config, manager, SupervisorTiming::default(), token).await
    }

    /// Supervise `manager` until `shutdown` is cancelled
    pub async fn serve(
        config: &Config,
        manager: Arc<SessionManager>,
        timing: SupervisorTiming,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let gateway = Arc::new(GptGateway::from_config(&config.gpt)?);
        let tag = TriggerTag::new(&config.whatsapp.tag)?;

        tracing::info!(
            provider = gateway.provider_name(),
            tag = tag.as_str(),
            "Starting message listener"
        );

        let router: Arc<dyn EventHandler> =
            Arc::new(MessageRouter::new(manager.handle(), gateway, tag));
        let supervisor = SessionSupervisor::with_timing(manager, router, timing);
        supervisor.run(shutdown).await;

        tracing::info!("Terminating process");
        Ok(())
    }

    async fn shutdown_signal() {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate => {}
        }
    }

}

pub mod login {
    //! Device linking.

    use super::*;
    use crate::error::WagptError;
    use crate::session::LoginOutcome;
    use colored::Colorize;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader};

    /// Link the bot by pairing code (default) or QR code
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `phone` - Phone number; prompted on stdin when `None`
    /// * `qr` - Use QR linking instead of a pairing code
    /// * `wait` - Seconds to wait for the phone to confirm
    pub async fn run_login(config: Config, phone: Option<String>, qr: bool, wait: u64) -> Result<()> {
        let manager = build_manager(&config)?;
        manager.reload().await;

        if manager
            .client()
            .and_then(|client| client.own_id())
            .is_some()
        {
            println!("{}", "Device already linked".yellow());
            manager.shutdown().await;
            return Ok(());
        }

        let outcome = if qr {
            manager.login_qr().await?
        } else {
            let phone = match phone {
                Some(phone) => phone,
                None => prompt_phone().await?,
            };
            let phone = normalize_phone(&phone);
            if phone.is_empty() {
                return Err(WagptError::Pairing("a phone number is required".to_string()).into());
            }
            manager.login(&phone).await?
        };

        match outcome {
            LoginOutcome::AlreadyLoggedIn => {
                println!("{}", "Device already linked, reconnected".yellow());
                manager.shutdown().await;
                return Ok(());
            }
            LoginOutcome::PairCode(code) => {
                println!();
                println!("{} {}", "Pairing code:".bold(), code.code.green().bold());
                println!("Expires in {}s", code.expires_in);
                println!("Open Linked devices on your phone and choose to link with a phone number.");
            }
            LoginOutcome::QrCode(code) => {
                println!();
                println!("{}", "QR code payload:".bold());
                println!("{}", code.code);
                println!("Expires in {}s", code.timeout);
            }
        }

        let result = manager.await_pairing(Duration::from_secs(wait)).await;
        manager.shutdown().await;

        let identity = result?;
        let masked = identity
            .jid
            .as_ref()
            .map(|jid| jid.masked())
            .unwrap_or_default();
        println!("{} {}", "Linked as".green(), masked);
        Ok(())
    }

    /// Keep only the digits of a phone number
    pub fn normalize_phone(input: &str) -> String {
        input.chars().filter(|c| c.is_ascii_digit()).collect()
    }

    async fn prompt_phone() -> Result<String> {
        println!();
        println!("Please enter your phone number (country code first) to get a pairing code:");

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await?;
        Ok(line)
    }

}

pub mod logout {
    //! Device unlinking.

    use super::*;
    use colored::Colorize;

    /// Unlink the stored device
    ///
    /// Does nothing when no device is stored.
    pub async fn run_logout(config: Config) -> Result<()> {
        let manager = build_manager(&config)?;
        manager.reload().await;

        let Some(client) = manager.client() else {
            println!("{}", "No linked device".yellow());
            return Ok(());
        };

        client.remove_event_handlers();
        manager.logout().await?;
        println!("{}", "Successfully logged out".green());
        Ok(())
    }
}

pub mod version {
    //! Version information.

    /// `wagpt <version>`
    pub fn version_string() -> String {
        format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }

    pub fn print_version() {
        println!("{}", version_string());
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_version_string() {
            assert!(version_string().starts_with("wagpt "));
        }
    }
}
