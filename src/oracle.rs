//! Price Oracle Cache
//!
//! Reads USD prices from Pyth price accounts and caches one quote per token for
//! a staleness window. Pegged tokens never touch the network.

use anyhow::Context;
use borsh::BorshDeserialize;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::DonationError;
use crate::svm_client::SvmClient;
use crate::token::{Token, TokenRegistry};

/// Default maximum age of a cached price.
pub const PRICE_STALENESS: Duration = Duration::from_millis(10_000);

const PYTH_MAGIC: u32 = 0xa1b2_c3d4;
const PYTH_ACCOUNT_TYPE_PRICE: u32 = 3;
const PYTH_STATUS_TRADING: u32 = 1;

// ============================================================================
// PYTH PRICE ACCOUNT
// ============================================================================

/// Leading fields of a Pyth v2 price account, up to and including the aggregate price.
///
/// The layout is little-endian and unpadded, so Borsh decodes it field by field.
/// Publisher components that follow the aggregate are not read.
#[derive(BorshDeserialize, Debug, Clone)]
pub struct PythPriceAccount {
    pub magic: u32,
    pub version: u32,
    pub account_type: u32,
    pub size: u32,
    pub price_type: u32,
    pub exponent: i32,
    pub num_components: u32,
    pub num_quoters: u32,
    pub last_slot: u64,
    pub valid_slot: u64,
    pub ema_price: [i64; 3],
    pub ema_confidence: [i64; 3],
    pub timestamp: i64,
    pub min_publishers: u8,
    pub reserved: [u8; 7],
    pub product: [u8; 32],
    pub next: [u8; 32],
    pub prev_slot: u64,
    pub prev_price: i64,
    pub prev_confidence: u64,
    pub prev_timestamp: i64,
    pub aggregate: PythPriceInfo,
}

#[derive(BorshDeserialize, Debug, Clone)]
pub struct PythPriceInfo {
    pub price: i64,
    pub confidence: u64,
    pub status: u32,
    pub corporate_action: u32,
    pub publish_slot: u64,
}

/// Decodes a Pyth price account into a USD price per whole token.
///
/// # Arguments
///
/// * `data` - Raw account data
///
/// # Returns
///
/// * `Ok(f64)` - Aggregate price scaled by the account's exponent
/// * `Err(anyhow::Error)` - Not a price account, or the price is not currently trading
pub fn parse_pyth_price(data: &[u8]) -> anyhow::Result<f64> {
    let account = PythPriceAccount::deserialize(&mut &data[..])
        .context("Price account data too short")?;

    if account.magic != PYTH_MAGIC {
        anyhow::bail!("Not a Pyth account (magic {:#x})", account.magic);
    }
    if account.account_type != PYTH_ACCOUNT_TYPE_PRICE {
        anyhow::bail!("Not a Pyth price account (type {})", account.account_type);
    }
    if account.aggregate.status != PYTH_STATUS_TRADING {
        anyhow::bail!("Price is not trading (status {})", account.aggregate.status);
    }

    Ok(account.aggregate.price as f64 * 10f64.powi(account.exponent))
}

// ============================================================================
// CACHE
// ============================================================================

/// A cached price for one token.
#[derive(Debug, Clone, Copy)]
pub struct PriceQuote {
    pub token: Token,
    pub price_usd: f64,
    pub fetched_at: Instant,
}

impl PriceQuote {
    /// Whether the quote can still be served at `now`.
    pub fn is_fresh(&self, now: Instant, staleness: Duration) -> bool {
        now.saturating_duration_since(self.fetched_at) < staleness
    }
}

/// Per-token USD price cache over Pyth oracle accounts.
///
/// Each token's slot is guarded by its own async mutex held across the refresh,
/// so concurrent callers on a cold or stale slot share a single fetch.
pub struct PriceOracle {
    rpc: Arc<SvmClient>,
    oracles: HashMap<Token, Pubkey>,
    staleness: Duration,
    quotes: HashMap<Token, Mutex<Option<PriceQuote>>>,
}

impl PriceOracle {
    pub fn new(rpc: Arc<SvmClient>, registry: &TokenRegistry, staleness: Duration) -> Self {
        let mut oracles = HashMap::new();
        let mut quotes = HashMap::new();
        for token in Token::ALL {
            if let Some(oracle) = registry.oracle_address(token) {
                oracles.insert(token, oracle);
                quotes.insert(token, Mutex::new(None));
            }
        }

        Self {
            rpc,
            oracles,
            staleness,
            quotes,
        }
    }

    /// Returns the USD price of one whole token.
    ///
    /// # Arguments
    ///
    /// * `token` - Token to price
    ///
    /// # Returns
    ///
    /// * `Ok(f64)` - 1.0 for pegged tokens, otherwise a quote no older than the staleness window
    /// * `Err(DonationError::UnsupportedToken)` - Token has no oracle configured
    /// * `Err(DonationError::OracleFetch)` - Refresh failed
    pub async fn get_price(&self, token: Token) -> Result<f64, DonationError> {
        if token.is_usd_pegged() {
            return Ok(1.0);
        }

        let (oracle, slot) = match (self.oracles.get(&token), self.quotes.get(&token)) {
            (Some(oracle), Some(slot)) => (oracle, slot),
            _ => return Err(DonationError::UnsupportedToken(token.to_string())),
        };

        let mut cached = slot.lock().await;
        if let Some(quote) = cached.as_ref() {
            if quote.is_fresh(Instant::now(), self.staleness) {
                return Ok(quote.price_usd);
            }
        }

        let price_usd = self.fetch_price(oracle).await?;
        debug!("Fetched {} price: ${}", token, price_usd);

        *cached = Some(PriceQuote {
            token,
            price_usd,
            fetched_at: Instant::now(),
        });
        Ok(price_usd)
    }

    async fn fetch_price(&self, oracle: &Pubkey) -> Result<f64, DonationError> {
        let data = self
            .rpc
            .get_account_data(oracle)
            .await
            .with_context(|| format!("Failed to read price oracle {}", oracle))
            .map_err(DonationError::OracleFetch)?;
        parse_pyth_price(&data).map_err(DonationError::OracleFetch)
    }
}
