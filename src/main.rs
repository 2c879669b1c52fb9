//! YVR Sidewalk Service
//!
//! Main service binary that runs the sidewalk services concurrently:
//! - API server: prices donations and builds donation transactions
//! - Display dispatcher: shows one queued message per interval
//! - Transaction detector: started on demand by each issued donation transaction
//!
//! ## Usage
//!
//! ```bash
//! SERVER_SECRET=... cargo run -- --config config/sidewalk.toml
//! ```
//!
//! Or set the config path via environment variable:
//!
//! ```bash
//! SIDEWALK_CONFIG_PATH=config/sidewalk.toml cargo run
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signer;
use std::str::FromStr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use yvr_sidewalk::{
    api::ApiServer, crypto::load_server_authority, DisplayDispatcher, DonationService,
    MessageQueue, PriceOracle, PubsubLogSubscriber, SidewalkConfig, SvmClient, TokenRegistry,
    TransactionDetector,
};

#[derive(Parser, Debug)]
#[command(name = "yvr-sidewalk")]
#[command(about = "Donation service that puts messages on the YVR sidewalk display")]
struct Args {
    /// Path to configuration file (default: config/sidewalk.toml or SIDEWALK_CONFIG_PATH env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments first (before initializing logging)
    let args = Args::parse();

    tracing_subscriber::fmt::init();

    info!("Starting YVR Sidewalk Service");

    let config = if let Some(path) = args.config {
        info!("Loading configuration from: {}", path);
        SidewalkConfig::load_from_path(Some(&path))?
    } else {
        if let Ok(path) = std::env::var("SIDEWALK_CONFIG_PATH") {
            info!("Loading configuration from SIDEWALK_CONFIG_PATH: {}", path);
        } else {
            info!("Loading configuration from default location");
        }
        SidewalkConfig::load()?
    };

    let ws_url = config.ws_url()?;
    info!("Configuration loaded successfully");
    info!("Solana RPC: {} (websocket {})", config.solana.rpc_url, ws_url);
    info!("Treasury: {}", config.solana.treasury_address);
    info!("Display: {}", config.service.display_url);

    let authority = Arc::new(load_server_authority(&config.solana.server_secret_env)?);
    info!("Server authority: {}", authority.pubkey());

    let treasury = Pubkey::from_str(&config.solana.treasury_address)
        .context("Invalid treasury address")?;
    let registry = TokenRegistry::from_config(&config.tokens)?;
    let rpc = Arc::new(SvmClient::new(&config.solana.rpc_url)?);
    let oracle = Arc::new(PriceOracle::new(
        rpc.clone(),
        &registry,
        config.price_staleness(),
    ));

    let queue = MessageQueue::new();
    let detector = TransactionDetector::new(
        rpc.clone(),
        Arc::new(PubsubLogSubscriber::new(&ws_url)),
        authority.pubkey(),
        queue.clone(),
        config.detector_poll_interval(),
    );

    let donation_service = Arc::new(DonationService::new(
        rpc,
        oracle,
        registry,
        treasury,
        authority,
        detector,
    ));

    let dispatcher = DisplayDispatcher::new(
        &config.service.display_url,
        queue.clone(),
        config.dispatch_interval(),
    )?;
    let api_server = ApiServer::new(config.service.clone(), donation_service, queue);

    tokio::select! {
        result = api_server.run() => {
            if let Err(e) = result {
                error!("API server error: {}", e);
            }
        }

        result = dispatcher.run() => {
            if let Err(e) = result {
                error!("Display dispatcher error: {}", e);
            }
        }

        // Graceful shutdown on Ctrl+C
        _ = signal::ctrl_c() => {
            info!("Received shutdown signal, stopping services...");
        }
    }

    info!("YVR Sidewalk Service stopped");
    Ok(())
}
