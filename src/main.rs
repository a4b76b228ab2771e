//! wagpt - multi-device messaging bot for generative backends
//!
#![doc = "wagpt - multi-device messaging bot for generative backends"]
#![doc = "Main entry point for the wagpt service and its device management commands."]

use anyhow::Result;

use wagpt::cli::{Cli, Commands};
use wagpt::commands;
use wagpt::config::{Config, LoggingConfig};
use wagpt::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    if let Commands::Version = cli.command {
        commands::version::print_version();
        return Ok(());
    }

    // Logging settings come from the environment so they apply to config loading too
    init_logging(&LoggingConfig::from_env(), cli.verbose)?;

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Daemon => {
            tracing::info!(engine = %config.gpt.engine, "Starting daemon");
            commands::daemon::run_daemon(config).await?;
            Ok(())
        }
        Commands::Login { phone, qr, wait } => {
            tracing::info!("Starting device login");
            commands::login::run_login(config, phone, qr, wait).await?;
            Ok(())
        }
        Commands::Logout => {
            tracing::info!("Starting device logout");
            commands::logout::run_logout(config).await?;
            Ok(())
        }
        Commands::Version => {
            commands::version::print_version();
            Ok(())
        }
    }
}
