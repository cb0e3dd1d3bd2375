//! # FrontDesk — Clinic Queue & Notification Coordinator
//!
//! Runs the token queue, staff task dispatch and notification polling API.
//!
//! Usage:
//!   frontdesk                        # Start server (default 127.0.0.1:3000)
//!   frontdesk --port 8080            # Custom port
//!   frontdesk --db-path :memory:     # Throwaway store
//!   frontdesk --init-config          # Write default config and exit

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use frontdesk_core::config::FrontDeskConfig;

#[derive(Parser)]
#[command(
    name = "frontdesk",
    version,
    about = "🏥 FrontDesk — Clinic Queue & Notification Coordinator"
)]
struct Cli {
    /// Listen port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Listen address (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Config file path (default: $FRONTDESK_CONFIG or ~/.frontdesk/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Database path (overrides config)
    #[arg(long)]
    db_path: Option<String>,

    /// Write the default config file and exit
    #[arg(long)]
    init_config: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "frontdesk=debug,frontdesk_queue=debug,frontdesk_gateway=debug,tower_http=debug"
    } else {
        "frontdesk=info,frontdesk_queue=info,frontdesk_gateway=info,frontdesk_channels=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config_path = cli
        .config
        .or_else(|| std::env::var("FRONTDESK_CONFIG").ok())
        .map(|p| PathBuf::from(expand_path(&p)))
        .unwrap_or_else(FrontDeskConfig::default_path);

    // --init-config: write defaults and exit
    if cli.init_config {
        if config_path.exists() {
            println!("⚠️  Config already exists: {}", config_path.display());
        } else {
            FrontDeskConfig::default().save_to(&config_path)?;
            println!("✅ Default config written to {}", config_path.display());
        }
        return Ok(());
    }

    let mut config = if config_path.exists() {
        FrontDeskConfig::load_from(&config_path)?
    } else {
        tracing::info!("No config at {}; using defaults", config_path.display());
        FrontDeskConfig::default()
    };
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }
    if let Some(host) = cli.host {
        config.gateway.host = host;
    }

    let db_path = match cli.db_path {
        Some(p) => expand_path(&p),
        None => expand_path(&config.store.path),
    };
    if db_path != ":memory:"
        && let Some(parent) = Path::new(&db_path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    println!("🏥 FrontDesk v{}", env!("CARGO_PKG_VERSION"));
    println!("   🌐 API:       http://{}:{}", config.gateway.host, config.gateway.port);
    println!("   🗄️  Database:  {db_path}");
    println!(
        "   💬 WhatsApp:  {}",
        if config.whatsapp.is_configured() { "configured" } else { "simulated" }
    );
    println!(
        "   🔔 Poller:    every {}ms, cool-down {}ms",
        config.poller.interval().as_millis(),
        config.poller.cooldown().as_millis()
    );
    println!();

    frontdesk_gateway::start(config, Path::new(&db_path)).await
}
