//! Donation transaction assembly
//!
//! Builds the two-instruction donation transaction: a payment to the treasury
//! followed by a memo carrying the sidewalk message, co-signed by the server
//! authority. Also holds the memo codec shared with the detector.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use solana_sdk::{
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    message::Message,
    pubkey::Pubkey,
    signature::Keypair,
    transaction::Transaction,
};
use std::str::FromStr;

use crate::error::DonationError;
use crate::token::Token;

// Well-known program IDs from Solana mainnet/devnet docs.
pub const MEMO_PROGRAM_ID: &str = "MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr";
pub const ASSOCIATED_TOKEN_PROGRAM_ID: &str = "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL";

/// Prefix marking a memo as a sidewalk message.
pub const SIDEWALK_MEMO_PREFIX: &str = "yvrsidewalk:";

/// Maximum message length in characters.
pub const MAX_MESSAGE_LEN: usize = 64;

// ============================================================================
// MESSAGE VALIDATION AND MEMO CODEC
// ============================================================================

/// Validates a sidewalk message: at most 64 characters, ASCII letters and spaces only.
pub fn validate_message(message: &str) -> Result<&str, DonationError> {
    let valid = message.len() <= MAX_MESSAGE_LEN
        && message.chars().all(|c| c.is_ascii_alphabetic() || c == ' ');
    if valid {
        Ok(message)
    } else {
        Err(DonationError::InvalidMessage(message.to_string()))
    }
}

/// Human-readable label shown by the donor's wallet.
pub fn donation_label(message: &str) -> String {
    format!("Set the YVR Sidewalk message to \u{201C}{}\u{201D}", message)
}

/// Encodes a message as sidewalk memo bytes.
pub fn sidewalk_memo_data(message: &str) -> Vec<u8> {
    format!("{}{}", SIDEWALK_MEMO_PREFIX, message).into_bytes()
}

/// Extracts the message from sidewalk memo bytes.
///
/// Returns `None` when the bytes are not UTF-8 or lack the sidewalk prefix.
pub fn parse_sidewalk_memo(data: &[u8]) -> Option<String> {
    let memo = std::str::from_utf8(data).ok()?;
    memo.strip_prefix(SIDEWALK_MEMO_PREFIX).map(str::to_string)
}

// ============================================================================
// PROGRAM IDS AND ADDRESS DERIVATION
// ============================================================================

pub fn memo_program_id() -> Result<Pubkey> {
    Pubkey::from_str(MEMO_PROGRAM_ID).context("Invalid memo program id")
}

fn associated_token_program_id() -> Result<Pubkey> {
    Pubkey::from_str(ASSOCIATED_TOKEN_PROGRAM_ID)
        .context("Invalid associated token program id")
}

/// Derives the associated token account (ATA) for an owner and mint.
///
/// # Arguments
///
/// * `owner` - Token account owner
/// * `mint` - SPL token mint
///
/// # Returns
///
/// * `Ok(Pubkey)` - Derived ATA address
/// * `Err(anyhow::Error)` - Invalid program id constant
pub fn get_associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Result<Pubkey> {
    let program_id = associated_token_program_id()?;
    Ok(Pubkey::find_program_address(
        &[owner.as_ref(), spl_token::id().as_ref(), mint.as_ref()],
        &program_id,
    )
    .0)
}

// ============================================================================
// INSTRUCTIONS
// ============================================================================

/// System Program transfer of `lamports` from payer to treasury.
pub fn native_transfer_instruction(payer: &Pubkey, treasury: &Pubkey, lamports: u64) -> Instruction {
    solana_system_interface::instruction::transfer(payer, treasury, lamports)
}

/// SPL Token transfer of `amount` between the payer's and treasury's ATAs for `mint`.
pub fn token_transfer_instruction(
    payer: &Pubkey,
    treasury: &Pubkey,
    mint: &Pubkey,
    amount: u64,
) -> Result<Instruction> {
    let source = get_associated_token_address(payer, mint)?;
    let destination = get_associated_token_address(treasury, mint)?;

    spl_token::instruction::transfer(&spl_token::id(), &source, &destination, payer, &[], amount)
        .map_err(|e| anyhow::anyhow!("Failed to build token transfer: {}", e))
}

/// Memo instruction carrying the sidewalk message, signed by the server authority.
pub fn sidewalk_memo_instruction(message: &str, authority: &Pubkey) -> Result<Instruction> {
    Ok(Instruction {
        program_id: memo_program_id()?,
        accounts: vec![AccountMeta::new_readonly(*authority, true)],
        data: sidewalk_memo_data(message),
    })
}

/// Payment instruction for the chosen token.
///
/// # Arguments
///
/// * `payer` - Donor paying the fee and the donation
/// * `treasury` - Treasury owner address
/// * `token` - Donation token
/// * `mint` - Mint for SPL tokens (ignored for the native token)
/// * `amount` - Amount in the token's smallest unit
pub fn donation_instruction(
    payer: &Pubkey,
    treasury: &Pubkey,
    token: Token,
    mint: Option<&Pubkey>,
    amount: u64,
) -> Result<Instruction, DonationError> {
    if token.is_native() {
        return Ok(native_transfer_instruction(payer, treasury, amount));
    }
    let mint = mint.ok_or_else(|| DonationError::UnsupportedToken(token.to_string()))?;
    token_transfer_instruction(payer, treasury, mint, amount).map_err(DonationError::ChainRpc)
}

// ============================================================================
// TRANSACTION
// ============================================================================

/// Assembles the donation transaction and signs it with the server authority.
///
/// Instruction order is always [payment, memo]. The payer's signature slot is
/// left empty for the donor's wallet.
///
/// # Arguments
///
/// * `payer` - Fee payer and donor
/// * `blockhash` - Recent blockhash setting the transaction lifetime
/// * `payment` - Payment instruction from [`donation_instruction`]
/// * `message` - Validated sidewalk message
/// * `authority` - Server authority keypair
///
/// # Returns
///
/// * `Ok(Transaction)` - Partially signed transaction
/// * `Err(anyhow::Error)` - Signing failed
pub fn assemble_donation_transaction(
    payer: &Pubkey,
    blockhash: Hash,
    payment: Instruction,
    message: &str,
    authority: &Keypair,
) -> Result<Transaction> {
    use solana_sdk::signature::Signer;

    let memo = sidewalk_memo_instruction(message, &authority.pubkey())?;
    let message = Message::new_with_blockhash(&[payment, memo], Some(payer), &blockhash);
    let mut transaction = Transaction::new_unsigned(message);
    transaction
        .try_partial_sign(&[authority], blockhash)
        .map_err(|e| anyhow::anyhow!("Server authority failed to sign: {}", e))?;
    Ok(transaction)
}

/// Serializes a transaction to base64 wire format.
pub fn encode_transaction(transaction: &Transaction) -> Result<String> {
    let bytes = bincode::serialize(transaction).context("Failed to serialize transaction")?;
    Ok(STANDARD.encode(bytes))
}

/// Parses a base64 wire transaction.
pub fn decode_transaction(encoded: &str) -> Result<Transaction> {
    let bytes = STANDARD
        .decode(encoded)
        .context("Invalid base64 transaction")?;
    bincode::deserialize(&bytes).context("Failed to deserialize transaction")
}
