//! Command-line interface definition for wagpt
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for running the bot and managing the linked device.

use clap::{Parser, Subcommand};

/// wagpt - multi-device messaging bot answering with generative backends
///
/// Messages that start with the configured tag are forwarded to the
/// configured backend and the answer is sent back into the same chat.
#[derive(Parser, Debug, Clone)]
#[command(name = "wagpt")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for wagpt
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the bot until interrupted
    Daemon,

    /// Link this bot to a messaging account
    Login {
        /// Phone number to request a pairing code for (read from stdin if omitted)
        #[arg(short, long, conflicts_with = "qr")]
        phone: Option<String>,

        /// Link by scanning a QR code instead of entering a pairing code
        #[arg(long)]
        qr: bool,

        /// Seconds to wait for the phone to confirm linking
        #[arg(long, default_value_t = 160)]
        wait: u64,
    },

    /// Unlink this bot from its messaging account
    Logout,

    /// Print version information
    Version,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_daemon() {
        let cli = Cli::try_parse_from(["wagpt", "daemon"]).unwrap();
        assert!(matches!(cli.command, Commands::Daemon));
        assert_eq!(cli.config.as_deref(), Some("config/config.yaml"));
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_parse_login_with_phone() {
        let cli = Cli::try_parse_from(["wagpt", "login", "--phone", "628111222333"]).unwrap();
        match cli.command {
            Commands::Login { phone, qr, wait } => {
                assert_eq!(phone.as_deref(), Some("628111222333"));
                assert!(!qr);
                assert_eq!(wait, 160);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_login_qr() {
        let cli = Cli::try_parse_from(["wagpt", "login", "--qr"]).unwrap();
        assert!(matches!(cli.command, Commands::Login { qr: true, .. }));
    }

    #[test]
    fn test_cli_phone_conflicts_with_qr() {
        assert!(Cli::try_parse_from(["wagpt", "login", "--qr", "--phone", "1"]).is_err());
    }

    #[test]
    fn test_cli_parse_with_config_and_verbose() {
        let cli =
            Cli::try_parse_from(["wagpt", "-v", "--config", "custom.yaml", "logout"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config.as_deref(), Some("custom.yaml"));
        assert!(matches!(cli.command, Commands::Logout));
    }

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["wagpt"]).is_err());
    }
}
