//! Donation Error Taxonomy
//!
//! Errors surfaced by the donation pipeline. Request-scoped variants map to
//! client errors at the API layer; upstream variants (oracle, chain RPC) map to
//! gateway errors. Display dispatch errors never leave the dispatcher.

use thiserror::Error;

/// Errors produced while pricing, building or delivering a donation.
#[derive(Debug, Error)]
pub enum DonationError {
    /// Message is longer than 64 characters or contains anything but letters and spaces
    #[error("Invalid message `{0}`. Max 64 characters, alphabets and spaces only.")]
    InvalidMessage(String),

    /// Fee payer account is absent from the request or is not a valid address
    #[error("Missing fee payer account address: {0}")]
    MissingPayer(String),

    /// Token is not on the allow-list (or has no configured address)
    #[error("Unsupported token ${0}")]
    UnsupportedToken(String),

    /// Price feed account could not be read or decoded
    #[error("Failed to fetch price: {0:#}")]
    OracleFetch(anyhow::Error),

    /// Any other chain RPC call failed
    #[error("Chain RPC error: {0:#}")]
    ChainRpc(anyhow::Error),

    /// Display endpoint was unreachable or rejected the message
    #[error("Failed to dispatch message to display: {0}")]
    DisplayDispatch(String),
}

impl DonationError {
    /// Whether the error was caused by the request itself rather than an upstream service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            DonationError::InvalidMessage(_)
                | DonationError::MissingPayer(_)
                | DonationError::UnsupportedToken(_)
        )
    }
}
