//! Server authority key derivation
//!
//! The server authority co-signs every donation transaction so that memos seen
//! on-chain can be attributed to this server. The keypair is derived from the
//! server secret and never stored.

use anyhow::{Context, Result};
use ed25519_dalek::SigningKey;
use sha2::{Digest, Sha256};
use solana_sdk::signature::Keypair;

/// Derives the 32-byte ed25519 seed for the server authority.
///
/// The seed is SHA-256 of the UTF-8 server secret.
pub fn server_authority_seed(server_secret: &str) -> [u8; 32] {
    let digest = Sha256::digest(server_secret.as_bytes());
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&digest);
    seed
}

/// Derives the server authority keypair from the server secret.
///
/// The same secret always yields the same keypair, so the authority address is
/// stable across restarts.
///
/// # Arguments
///
/// * `server_secret` - Secret loaded from the environment at startup
///
/// # Returns
///
/// * `Ok(Keypair)` - Derived keypair
/// * `Err(anyhow::Error)` - Secret is empty or key bytes were rejected
pub fn derive_server_authority(server_secret: &str) -> Result<Keypair> {
    if server_secret.is_empty() {
        anyhow::bail!("Server secret must not be empty");
    }

    let seed = server_authority_seed(server_secret);
    let signing_key = SigningKey::from_bytes(&seed);

    // Solana keypair bytes are seed || public key
    let mut keypair_bytes = [0u8; 64];
    keypair_bytes[..32].copy_from_slice(&seed);
    keypair_bytes[32..].copy_from_slice(signing_key.verifying_key().as_bytes());

    Keypair::try_from(keypair_bytes.as_slice())
        .map_err(|e| anyhow::anyhow!("Invalid keypair bytes: {}", e))
        .context("Failed to derive server authority keypair")
}

/// Loads the server secret from the named environment variable and derives the authority.
pub fn load_server_authority(secret_env: &str) -> Result<Keypair> {
    let secret = std::env::var(secret_env)
        .with_context(|| format!("Missing server secret env var: {}", secret_env))?;
    derive_server_authority(&secret)
}
