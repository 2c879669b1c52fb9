//! Donation pricing
//!
//! Converts the fixed USD donation into an amount of the token's smallest unit.

use crate::error::DonationError;
use crate::oracle::PriceOracle;
use crate::token::Token;

/// USD value of a single donation.
pub const DONATION_USD: f64 = 1.0;

/// Computes the donation amount in smallest units for a given price.
///
/// Always floors, so the donor is never charged more than the USD target.
///
/// # Arguments
///
/// * `price_usd` - USD per whole token
/// * `decimals` - Token decimal places
///
/// # Returns
///
/// * `Ok(u64)` - floor((DONATION_USD / price_usd) * 10^decimals)
/// * `Err(DonationError::OracleFetch)` - Price is not a positive finite number or the amount overflows
pub fn donation_amount(price_usd: f64, decimals: u8) -> Result<u64, DonationError> {
    if !price_usd.is_finite() || price_usd <= 0.0 {
        return Err(DonationError::OracleFetch(anyhow::anyhow!(
            "Unusable price {}",
            price_usd
        )));
    }

    let amount = ((DONATION_USD / price_usd) * 10f64.powi(i32::from(decimals))).floor();
    if !amount.is_finite() || amount >= u64::MAX as f64 {
        return Err(DonationError::OracleFetch(anyhow::anyhow!(
            "Donation amount out of range for price {}",
            price_usd
        )));
    }

    Ok(amount as u64)
}

/// Computes the donation amount for a token at its current oracle price.
pub async fn compute_donation_amount(oracle: &PriceOracle, token: Token) -> Result<u64, DonationError> {
    let price = oracle.get_price(token).await?;
    donation_amount(price, token.decimals())
}
