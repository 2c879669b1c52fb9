//! Configuration Management Module
//!
//! This module handles loading and managing configuration for the sidewalk service.
//! Configuration includes the API server, display endpoint, Solana RPC endpoints,
//! the treasury address and per-token oracle/mint addresses.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::time::Duration;

use crate::token::Token;

// ============================================================================
// CONFIGURATION STRUCTURES
// ============================================================================

/// Main configuration structure containing all service settings.
///
/// This structure holds configuration for:
/// - Service settings (API bind address, display endpoint, timers)
/// - Solana connection details (RPC/websocket endpoints, treasury, server secret)
/// - Token addresses (price oracles and mints)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidewalkConfig {
    /// Service configuration (API server, display, timing)
    pub service: ServiceConfig,
    /// Solana chain configuration
    pub solana: SolanaConfig,
    /// Per-token oracle and mint addresses
    #[serde(default)]
    pub tokens: TokensConfig,
}

/// Service-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Host address to bind the API server to
    #[serde(default = "default_api_host")]
    pub api_host: String,
    /// Port number to bind the API server to
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Allowed CORS origins for cross-origin requests ("*" allows any)
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    /// Base URL of the sidewalk display (e.g., "http://192.168.1.51:3456")
    pub display_url: String,
    /// Interval between display updates in milliseconds
    #[serde(default = "default_dispatch_interval_ms")]
    pub dispatch_interval_ms: u64,
    /// Interval between block height polls while the detector runs, in milliseconds
    #[serde(default = "default_detector_poll_interval_ms")]
    pub detector_poll_interval_ms: u64,
    /// Maximum age of a cached price before it is refetched, in milliseconds
    #[serde(default = "default_price_staleness_ms")]
    pub price_staleness_ms: u64,
}

/// Configuration for the Solana chain connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolanaConfig {
    /// JSON-RPC endpoint URL
    pub rpc_url: String,
    /// PubSub websocket URL (derived from rpc_url when omitted)
    #[serde(default)]
    pub ws_url: Option<String>,
    /// Treasury (multisig) address receiving donations, base58
    pub treasury_address: String,
    /// Environment variable name containing the server secret
    #[serde(default = "default_server_secret_env")]
    pub server_secret_env: String,
}

/// Oracle and mint addresses for every supported token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokensConfig {
    #[serde(default)]
    pub sol: TokenAddressConfig,
    #[serde(default)]
    pub bonk: TokenAddressConfig,
    #[serde(default)]
    pub usdc: TokenAddressConfig,
}

/// Addresses for a single token. Which ones are required depends on the token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenAddressConfig {
    /// Pyth price account (required unless the token is pegged to USD)
    #[serde(default)]
    pub oracle_address: Option<String>,
    /// SPL token mint (required unless the token is the native asset)
    #[serde(default)]
    pub mint_address: Option<String>,
}

impl TokensConfig {
    /// Returns the address configuration for a token.
    pub fn get(&self, token: Token) -> &TokenAddressConfig {
        match token {
            Token::Sol => &self.sol,
            Token::Bonk => &self.bonk,
            Token::Usdc => &self.usdc,
        }
    }
}

fn default_api_host() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    4000
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_dispatch_interval_ms() -> u64 {
    60_000
}

fn default_detector_poll_interval_ms() -> u64 {
    5_000
}

fn default_price_staleness_ms() -> u64 {
    crate::oracle::PRICE_STALENESS.as_millis() as u64
}

fn default_server_secret_env() -> String {
    "SERVER_SECRET".to_string()
}

// ============================================================================
// CONFIGURATION LOADING AND MANAGEMENT
// ============================================================================

impl SidewalkConfig {
    /// Loads configuration from a TOML file.
    ///
    /// This function:
    /// 1. Resolves the path (argument, then SIDEWALK_CONFIG_PATH, then config/sidewalk.toml)
    /// 2. If the file exists, loads and parses the configuration
    /// 3. Validates the configuration
    /// 4. If it doesn't exist, returns an error asking user to copy template
    ///
    /// # Arguments
    ///
    /// * `path` - Optional path to config file
    ///
    /// # Returns
    ///
    /// * `Ok(SidewalkConfig)` - Successfully loaded and validated configuration
    /// * `Err(anyhow::Error)` - Missing file, parse failure or validation failure
    pub fn load_from_path(path: Option<&str>) -> anyhow::Result<Self> {
        let config_path = path
            .map(|p| p.to_string())
            .or_else(|| std::env::var("SIDEWALK_CONFIG_PATH").ok())
            .unwrap_or_else(|| "config/sidewalk.toml".to_string());

        if std::path::Path::new(&config_path).exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: SidewalkConfig = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Err(anyhow::anyhow!(
                "Configuration file '{}' not found. Please copy the template:\n\
                cp config/sidewalk.template.toml config/sidewalk.toml\n\
                Then edit config/sidewalk.toml with your actual values.",
                config_path
            ))
        }
    }

    /// Loads configuration from the default location.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from_path(None)
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// Checks:
    /// - Treasury and every configured token address are valid base58 pubkeys
    /// - Tokens priced by an oracle have an oracle address
    /// - Non-native tokens have a mint address
    /// - Timer intervals are non-zero
    /// - The RPC URL is http(s)
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Configuration is valid
    /// * `Err(anyhow::Error)` - Validation failed with error message
    pub fn validate(&self) -> anyhow::Result<()> {
        parse_pubkey(&self.solana.treasury_address, "treasury_address")?;

        if !self.solana.rpc_url.starts_with("http://") && !self.solana.rpc_url.starts_with("https://") {
            anyhow::bail!(
                "Configuration error: rpc_url must be an http(s) URL, got {}",
                self.solana.rpc_url
            );
        }

        for token in Token::ALL {
            let addresses = self.tokens.get(token);

            if !token.is_usd_pegged() {
                let oracle = addresses.oracle_address.as_deref().ok_or_else(|| {
                    anyhow::anyhow!("Configuration error: tokens.{}.oracle_address is required", token)
                })?;
                parse_pubkey(oracle, &format!("tokens.{}.oracle_address", token))?;
            }

            if !token.is_native() {
                let mint = addresses.mint_address.as_deref().ok_or_else(|| {
                    anyhow::anyhow!("Configuration error: tokens.{}.mint_address is required", token)
                })?;
                parse_pubkey(mint, &format!("tokens.{}.mint_address", token))?;
            }
        }

        if self.service.dispatch_interval_ms == 0
            || self.service.detector_poll_interval_ms == 0
        {
            anyhow::bail!("Configuration error: timer intervals must be greater than zero");
        }

        Ok(())
    }

    /// Returns the PubSub websocket URL, deriving it from the RPC URL when not configured.
    pub fn ws_url(&self) -> anyhow::Result<String> {
        if let Some(ws_url) = &self.solana.ws_url {
            return Ok(ws_url.clone());
        }
        derive_ws_url(&self.solana.rpc_url)
    }

    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.service.dispatch_interval_ms)
    }

    pub fn detector_poll_interval(&self) -> Duration {
        Duration::from_millis(self.service.detector_poll_interval_ms)
    }

    pub fn price_staleness(&self) -> Duration {
        Duration::from_millis(self.service.price_staleness_ms)
    }
}

/// Maps an http(s) RPC URL onto the matching ws(s) URL.
///
/// # Arguments
///
/// * `rpc_url` - JSON-RPC endpoint URL
///
/// # Returns
///
/// * `Ok(String)` - Websocket URL on the same host and path
/// * `Err(anyhow::Error)` - URL is unparseable or not http(s)
pub fn derive_ws_url(rpc_url: &str) -> anyhow::Result<String> {
    let mut url = url::Url::parse(rpc_url)
        .map_err(|e| anyhow::anyhow!("Invalid rpc_url {}: {}", rpc_url, e))?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => anyhow::bail!("Cannot derive websocket URL from {} scheme", other),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow::anyhow!("Failed to set websocket scheme on {}", rpc_url))?;
    Ok(url.to_string())
}

/// Parses a base58 pubkey with a field name for error reporting.
fn parse_pubkey(value: &str, field: &str) -> anyhow::Result<Pubkey> {
    Pubkey::from_str(value)
        .map_err(|_| anyhow::anyhow!("Configuration error: {} is not a valid base58 address", field))
}
