//! Home Assistant Rust Server
//!
//! Main entry point for the Home Assistant Rust implementation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ha_config::ServerConfig;
use ha_server::HomeAssistant;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "homeassistant", version)]
#[command(about = "Run Home Assistant integrations from a config directory", long_about = None)]
struct Cli {
    /// Config directory holding configuration.yaml and .storage/
    #[arg(short, long, default_value = ".")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Set up every config entry and run until interrupted (default)
    Run,
    /// List stored config entries
    Entries,
    /// Set up one entry and print its diagnostics as JSON
    Diagnostics {
        entry_id: String,
    },
}

fn init_logging(config: &ServerConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logger.filter_directive()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

async fn load(config_dir: &Path) -> Result<HomeAssistant> {
    let hass = HomeAssistant::load(config_dir)
        .await
        .with_context(|| format!("Failed to load config dir {}", config_dir.display()))?;
    hass.register_all(ha_components::builtin_integrations());
    let added = hass.import_config_entries().await?;
    if added > 0 {
        info!(added, "Imported config entries from configuration.yaml");
    }
    Ok(hass)
}

async fn run(hass: HomeAssistant) -> Result<()> {
    hass.start().await;
    info!("Home Assistant is running");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    hass.stop().await?;
    Ok(())
}

fn print_entries(hass: &HomeAssistant) {
    for entry in hass.config_entries.entries() {
        println!(
            "{}  {:<18} {:<24} {:?}",
            entry.entry_id, entry.domain, entry.title, entry.state
        );
    }
}

async fn print_diagnostics(hass: HomeAssistant, entry_id: &str) -> Result<()> {
    let state = hass.config_entries.setup(entry_id).await?;
    info!(entry_id, ?state, "Entry set up");

    let result = hass.diagnostics(entry_id);
    hass.stop().await?;

    let payload = result.with_context(|| format!("No diagnostics for {entry_id}"))?;
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ServerConfig::load(&cli.config)?;
    init_logging(&config)?;
    info!("Starting Home Assistant (Rust)");

    let hass = load(&cli.config).await?;
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(hass).await,
        Command::Entries => {
            print_entries(&hass);
            Ok(())
        }
        Command::Diagnostics { entry_id } => print_diagnostics(hass, &entry_id).await,
    }
}
