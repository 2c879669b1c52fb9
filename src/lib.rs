//! YVR Sidewalk library
//!
//! Prices and builds donation transactions that carry a sidewalk message, detects
//! them on-chain, and dispatches detected messages to the sidewalk display.

pub mod api;
pub mod config;
pub mod crypto;
pub mod error;
pub mod oracle;
pub mod pricing;
pub mod service;
pub mod svm_client;
pub mod svm_pubsub;
pub mod token;
pub mod transaction;

// Re-export public types for convenience
pub use config::SidewalkConfig;
pub use error::DonationError;
pub use oracle::PriceOracle;
pub use service::{
    DisplayDispatcher, DonationService, DonationTransaction, MessageQueue, TransactionDetector,
};
pub use svm_client::SvmClient;
pub use svm_pubsub::{LogSubscriber, PubsubLogSubscriber};
pub use token::{Token, TokenRegistry};
