//! Error types for wagpt
//!
//! This module defines all error types used throughout the bot,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for wagpt operations
///
/// Variants follow the failure classes of the bot: fatal configuration
/// problems, recoverable store/connectivity problems, backend failures
/// that are turned into apologies at the router, and typed send
/// precondition failures returned by the responder.
#[derive(Error, Debug)]
pub enum WagptError {
    /// Missing or invalid setting; fatal at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Device store errors (open, query, malformed records)
    #[error("Store error: {0}")]
    Store(String),

    /// Messaging connection errors (connect, bridge transport)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Generative backend errors (network, non-success status, bad payload)
    #[error("Backend error: {0}")]
    Backend(String),

    /// No client is bound to the active session
    #[error("No active messaging client")]
    ClientUnavailable,

    /// Client exists but its socket is not open
    #[error("Messaging client is not connected")]
    NotConnected,

    /// Client is connected but the device is not authenticated
    #[error("Messaging client is not logged in")]
    NotLoggedIn,

    /// Device linking failures
    #[error("Pairing error: {0}")]
    Pairing(String),

    /// Logout and identity removal both failed
    #[error("Logout error: {0}")]
    Logout(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// SQLite errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Result type alias for wagpt operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
