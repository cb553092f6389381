//! SearchBot - Main binary

use clap::{Parser, Subcommand};
use searchbot_core::Config;
use searchbot_modules::Bot;
use std::path::PathBuf;
use tracing::{error, info};

/// SearchBot - private metasearch for IRC
#[derive(Parser)]
#[command(name = "searchbot")]
#[command(about = "An IRC bot that answers !search privately with per-user rate limits")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Test configuration and exit
    #[arg(long)]
    test_config: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a default configuration file
    Config {
        /// Output file path
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli.log_level)?;

    // Handle subcommands
    if let Some(command) = cli.command {
        match command {
            Commands::Config { output } => {
                generate_config(&output)?;
                return Ok(());
            }
            Commands::Version => {
                show_version();
                return Ok(());
            }
        }
    }

    // Load configuration
    let config = if cli.config.exists() {
        info!("Loading configuration from {:?}", cli.config);
        Config::from_file(&cli.config)?
    } else {
        info!("Configuration file not found, using defaults");
        Config::default()
    };

    // Test configuration if requested
    if cli.test_config {
        config.validate()?;
        info!("Configuration is valid");
        return Ok(());
    }

    config.validate()?;

    let mut bot = Bot::new(config)?;

    let shutdown = bot.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                shutdown.cancel();
            }
            Err(e) => error!("Failed to listen for interrupt: {}", e),
        }
    });

    info!("Starting SearchBot...");
    bot.run().await?;

    Ok(())
}

/// Initialize logging
fn init_logging(level: &str) -> anyhow::Result<()> {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    Ok(())
}

/// Generate default configuration file
fn generate_config(output: &PathBuf) -> anyhow::Result<()> {
    let config = Config::default();
    config.to_file(output)?;
    println!("Generated default configuration file: {:?}", output);
    Ok(())
}

/// Show version information
fn show_version() {
    println!("searchbot {}", env!("CARGO_PKG_VERSION"));
}
