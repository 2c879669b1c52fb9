//! Supported donation tokens
//!
//! The allow-list is a closed enum. Static properties (decimals, native/pegged)
//! live on the enum; deployment-specific addresses live in [`TokenRegistry`].

use anyhow::Context;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::config::TokensConfig;
use crate::error::DonationError;

/// A token accepted for donations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Token {
    /// Native SOL, paid with a System Program transfer
    Sol,
    /// BONK SPL token
    Bonk,
    /// USDC SPL token, pegged 1:1 to USD
    Usdc,
}

impl Token {
    pub const ALL: [Token; 3] = [Token::Sol, Token::Bonk, Token::Usdc];

    /// Number of decimal places of the token's smallest unit.
    pub fn decimals(self) -> u8 {
        match self {
            Token::Sol => 9,
            Token::Bonk => 5,
            Token::Usdc => 6,
        }
    }

    /// Whether the token is the chain's native asset (no mint).
    pub fn is_native(self) -> bool {
        matches!(self, Token::Sol)
    }

    /// Whether the token is valued at exactly 1 USD without an oracle.
    pub fn is_usd_pegged(self) -> bool {
        matches!(self, Token::Usdc)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Token::Sol => "sol",
            Token::Bonk => "bonk",
            Token::Usdc => "usdc",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Token {
    type Err = DonationError;

    /// Parses a token symbol case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sol" => Ok(Token::Sol),
            "bonk" => Ok(Token::Bonk),
            "usdc" => Ok(Token::Usdc),
            _ => Err(DonationError::UnsupportedToken(s.to_string())),
        }
    }
}

/// Resolved oracle and mint addresses for the supported tokens.
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    oracles: HashMap<Token, Pubkey>,
    mints: HashMap<Token, Pubkey>,
}

impl TokenRegistry {
    /// Builds the registry from validated token configuration.
    ///
    /// Oracle addresses configured for pegged tokens are ignored, as are mints
    /// configured for the native token.
    pub fn from_config(config: &TokensConfig) -> anyhow::Result<Self> {
        let mut registry = Self::default();
        for token in Token::ALL {
            let addresses = config.get(token);
            if !token.is_usd_pegged() {
                if let Some(oracle) = &addresses.oracle_address {
                    let oracle = Pubkey::from_str(oracle)
                        .with_context(|| format!("Invalid oracle address for {}", token))?;
                    registry.oracles.insert(token, oracle);
                }
            }
            if !token.is_native() {
                if let Some(mint) = &addresses.mint_address {
                    let mint = Pubkey::from_str(mint)
                        .with_context(|| format!("Invalid mint address for {}", token))?;
                    registry.mints.insert(token, mint);
                }
            }
        }
        Ok(registry)
    }

    /// Price oracle account for a token, if it is priced by one.
    pub fn oracle_address(&self, token: Token) -> Option<Pubkey> {
        self.oracles.get(&token).copied()
    }

    /// SPL mint for a non-native token.
    pub fn mint_address(&self, token: Token) -> Result<Pubkey, DonationError> {
        self.mints
            .get(&token)
            .copied()
            .ok_or_else(|| DonationError::UnsupportedToken(token.to_string()))
    }
}
