use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use proctor_server::{ProctorServer, ServerState, VisionSelection};
use proctoring::ProctorConfig;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:7070")]
    bind: String,

    /// TOML config file (PROCTOR_* environment variables still apply on top)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Vision strategy
    #[arg(long, value_enum, default_value_t = VisionSelection::Auto)]
    vision: VisionSelection,
}

fn load_config(path: Option<&PathBuf>) -> Result<ProctorConfig> {
    let config = match path {
        Some(path) => ProctorConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ProctorConfig::default(),
    }
    .with_env();
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;
    info!(
        audio_threshold = config.audio.threshold,
        cooldown_secs = config.cooldown.min_gap_secs,
        max_warnings = config.escalation.max_warnings,
        vision = ?args.vision,
        "Proctor server starting"
    );

    let state = ServerState::from_config(config, args.vision).shared();
    let server = ProctorServer::bind(args.bind.as_str(), state)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                trigger.cancel();
            }
            Err(e) => warn!("Cannot listen for interrupt: {}", e),
        }
    });

    server.run(shutdown).await.context("Server failed")?;
    Ok(())
}
