//! Sidewalk service modules
//!
//! This module contains the donation pipeline services: building donation
//! transactions, detecting confirmed donations, and dispatching messages to the display.

pub mod detector;
pub mod donation;
pub mod queue;

// Re-export for convenience
pub use detector::{extract_sidewalk_message, TransactionDetector};
pub use donation::{DonationService, DonationTransaction};
pub use queue::{DisplayDispatcher, MessageQueue};
