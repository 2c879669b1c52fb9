//! Donation Service
//!
//! Turns a donation request into a partially signed transaction: validates the
//! request, prices the donation, assembles and co-signs the transaction, then
//! arms the detector for the transaction's lifetime.

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::error::DonationError;
use crate::oracle::PriceOracle;
use crate::pricing::compute_donation_amount;
use crate::service::detector::TransactionDetector;
use crate::svm_client::SvmClient;
use crate::token::{Token, TokenRegistry};
use crate::transaction::{
    assemble_donation_transaction, donation_instruction, donation_label, encode_transaction,
    validate_message,
};

/// A donation transaction ready for the donor's wallet.
#[derive(Debug, Clone)]
pub struct DonationTransaction {
    /// Label shown by the wallet
    pub label: String,
    /// Base64 wire encoding, signed by the server authority only
    pub transaction: String,
    pub token: Token,
    /// Donation amount in the token's smallest unit
    pub amount: u64,
    /// Block height after which the transaction can no longer land
    pub last_valid_block_height: u64,
}

/// Builds donation transactions and arms the detector for them.
pub struct DonationService {
    rpc: Arc<SvmClient>,
    oracle: Arc<PriceOracle>,
    registry: TokenRegistry,
    treasury: Pubkey,
    authority: Arc<Keypair>,
    detector: TransactionDetector,
}

impl DonationService {
    pub fn new(
        rpc: Arc<SvmClient>,
        oracle: Arc<PriceOracle>,
        registry: TokenRegistry,
        treasury: Pubkey,
        authority: Arc<Keypair>,
        detector: TransactionDetector,
    ) -> Self {
        Self {
            rpc,
            oracle,
            registry,
            treasury,
            authority,
            detector,
        }
    }

    /// USD price of one whole token.
    pub async fn get_price(&self, token: &str) -> Result<f64, DonationError> {
        let token = Token::from_str(token)?;
        self.oracle.get_price(token).await
    }

    /// Wallet label for a message, after validating it.
    pub fn label(&self, message: &str) -> Result<String, DonationError> {
        validate_message(message).map(donation_label)
    }

    /// Builds a donation transaction for a payer, token and message.
    ///
    /// The request is fully validated before any chain call. The blockhash fetch
    /// and the pricing run concurrently. On success the detector is armed with the
    /// transaction's last valid block height.
    ///
    /// # Arguments
    ///
    /// * `payer` - Donor address (base58); fee payer and payment source
    /// * `token` - Token symbol
    /// * `message` - Sidewalk message
    ///
    /// # Returns
    ///
    /// * `Ok(DonationTransaction)` - Partially signed transaction and label
    /// * `Err(DonationError)` - Validation, pricing or chain RPC failure
    pub async fn build_donation_transaction(
        &self,
        payer: Option<&str>,
        token: &str,
        message: &str,
    ) -> Result<DonationTransaction, DonationError> {
        let message = validate_message(message)?;
        let payer = parse_payer(payer)?;
        let token = Token::from_str(token)?;
        let mint = if token.is_native() {
            None
        } else {
            Some(self.registry.mint_address(token)?)
        };

        let (latest, amount) = tokio::try_join!(
            async {
                self.rpc
                    .get_latest_blockhash()
                    .await
                    .map_err(DonationError::ChainRpc)
            },
            compute_donation_amount(&self.oracle, token),
        )?;

        let payment = donation_instruction(&payer, &self.treasury, token, mint.as_ref(), amount)?;
        let transaction = assemble_donation_transaction(
            &payer,
            latest.blockhash,
            payment,
            message,
            &self.authority,
        )
        .map_err(DonationError::ChainRpc)?;
        let encoded = encode_transaction(&transaction).map_err(DonationError::ChainRpc)?;

        info!(
            "Built donation of {} {} (smallest units) from {} for \"{}\", valid until block height {}",
            amount,
            token,
            payer,
            message,
            latest.last_valid_block_height
        );
        self.detector.arm(latest.last_valid_block_height);

        Ok(DonationTransaction {
            label: donation_label(message),
            transaction: encoded,
            token,
            amount,
            last_valid_block_height: latest.last_valid_block_height,
        })
    }
}

fn parse_payer(payer: Option<&str>) -> Result<Pubkey, DonationError> {
    let payer = payer
        .map(str::trim)
        .filter(|payer| !payer.is_empty())
        .ok_or_else(|| DonationError::MissingPayer("no account provided".to_string()))?;
    Pubkey::from_str(payer).map_err(|_| DonationError::MissingPayer(payer.to_string()))
}
