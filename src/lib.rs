//! wagpt - multi-device messaging bot library
//!
//! This library links a multi-device messaging account to a generative
//! text backend: messages starting with a configured tag are moderated,
//! answered by the backend and replied to in the same conversation.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `session`: Active session ownership, identity reload, login/logout and the reconnect supervisor
//! - `router`: Trigger tag matching and per-message dispatch
//! - `responder`: Outbound replies with send precondition checks
//! - `gateway`: Moderated, normalized `respond(question)` over one provider
//! - `providers`: Hosted (OpenAI-compatible) and local (Ollama) backends
//! - `moderation`: Whole-word blocklist filter
//! - `messaging`: Client contracts, addresses, events and the bridge binding
//! - `store`: Persisted device identities (SQLite, in-memory)
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use wagpt::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml")?;
//!     config.validate()?;
//!
//!     let manager = wagpt::commands::build_manager(&config)?;
//!     manager.reload().await;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod messaging;
pub mod moderation;
pub mod providers;
pub mod responder;
pub mod router;
pub mod session;
pub mod sse;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, WagptError};
pub use gateway::GptGateway;
pub use router::{MessageRouter, TriggerTag};
pub use session::{SessionManager, SessionState, SessionSupervisor};
