//! Solana SVM RPC Client Module
//!
//! This module provides a minimal client for the Solana JSON-RPC calls the
//! donation pipeline needs: reading price oracle accounts, fetching the latest
//! blockhash and block height, and fetching confirmed transactions.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// JSON-RPC TYPES
// ============================================================================

#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: serde_json::Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcContextual<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct RpcAccount {
    data: (String, String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlockhash {
    blockhash: String,
    last_valid_block_height: u64,
}

// ============================================================================
// RESULT STRUCTURES
// ============================================================================

/// A recent blockhash and the last block height at which it is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatestBlockhash {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

/// A confirmed transaction as returned by `getTransaction` with `json` encoding.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmedTransaction {
    pub slot: u64,
    #[serde(default)]
    pub meta: Option<TransactionStatusMeta>,
    pub transaction: EncodedTransaction,
}

impl ConfirmedTransaction {
    /// Whether the transaction executed without error.
    pub fn succeeded(&self) -> bool {
        self.meta.as_ref().map_or(true, |meta| meta.err.is_none())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionStatusMeta {
    #[serde(default)]
    pub err: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncodedTransaction {
    pub signatures: Vec<String>,
    pub message: EncodedMessage,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedMessage {
    pub account_keys: Vec<String>,
    pub instructions: Vec<EncodedInstruction>,
}

/// A compiled instruction; account and program fields index into `account_keys`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedInstruction {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    /// Base58-encoded instruction data
    pub data: String,
}

impl EncodedInstruction {
    /// Resolves the program id against the message's account keys.
    pub fn program_id<'a>(&self, message: &'a EncodedMessage) -> Option<&'a str> {
        message
            .account_keys
            .get(self.program_id_index as usize)
            .map(String::as_str)
    }

    /// Resolves the instruction's account addresses against the message's account keys.
    pub fn account_addresses<'a>(&'a self, message: &'a EncodedMessage) -> impl Iterator<Item = &'a str> + 'a {
        self.accounts
            .iter()
            .filter_map(move |index| message.account_keys.get(*index as usize))
            .map(String::as_str)
    }

    /// Decodes the base58 instruction data.
    pub fn decoded_data(&self) -> Result<Vec<u8>> {
        bs58::decode(&self.data)
            .into_vec()
            .context("Invalid base58 instruction data")
    }
}

// ============================================================================
// CLIENT
// ============================================================================

pub struct SvmClient {
    client: Client,
    rpc_url: String,
}

impl SvmClient {
    pub fn new(rpc_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .no_proxy()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            rpc_url: rpc_url.to_string(),
        })
    }

    /// Sends a JSON-RPC request and returns the `result` field.
    ///
    /// # Arguments
    ///
    /// * `method` - RPC method name
    /// * `params` - Positional parameters
    ///
    /// # Returns
    ///
    /// * `Ok(Option<T>)` - Parsed result (None when the node returned null)
    /// * `Err(anyhow::Error)` - Transport, RPC or parse failure
    async fn call<T: DeserializeOwned>(&self, method: &str, params: serde_json::Value) -> Result<Option<T>> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: 1,
        };

        let response: JsonRpcResponse<T> = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to call {}", method))?
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", method))?;

        if let Some(error) = response.error {
            return Err(anyhow::anyhow!("SVM RPC error: {}", error.message));
        }

        Ok(response.result)
    }

    /// Fetches raw account data (base64 encoding, confirmed commitment).
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<u8>)` - Decoded account data
    /// * `Err(anyhow::Error)` - RPC failure, missing account or bad encoding
    pub async fn get_account_data(&self, pubkey: &Pubkey) -> Result<Vec<u8>> {
        let params = serde_json::json!([
            pubkey.to_string(),
            { "encoding": "base64", "commitment": "confirmed" }
        ]);

        let result: RpcContextual<Option<RpcAccount>> = self
            .call("getAccountInfo", params)
            .await?
            .context("Empty getAccountInfo response")?;

        let account = result
            .value
            .ok_or_else(|| anyhow::anyhow!("Account {} not found", pubkey))?;

        STANDARD
            .decode(&account.data.0)
            .context("Failed to decode account data from base64")
    }

    /// Fetches the latest blockhash and its last valid block height.
    pub async fn get_latest_blockhash(&self) -> Result<LatestBlockhash> {
        let params = serde_json::json!([{ "commitment": "confirmed" }]);

        let result: RpcContextual<RpcBlockhash> = self
            .call("getLatestBlockhash", params)
            .await?
            .context("Empty getLatestBlockhash response")?;

        let blockhash = Hash::from_str(&result.value.blockhash)
            .map_err(|e| anyhow::anyhow!("Invalid blockhash {}: {}", result.value.blockhash, e))?;

        Ok(LatestBlockhash {
            blockhash,
            last_valid_block_height: result.value.last_valid_block_height,
        })
    }

    /// Fetches the current confirmed block height.
    pub async fn get_block_height(&self) -> Result<u64> {
        let params = serde_json::json!([{ "commitment": "confirmed" }]);
        self.call("getBlockHeight", params)
            .await?
            .context("Empty getBlockHeight response")
    }

    /// Fetches a confirmed transaction by signature.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(ConfirmedTransaction))` - Transaction found
    /// * `Ok(None)` - Node does not (yet) know the transaction
    /// * `Err(anyhow::Error)` - RPC or parse failure
    pub async fn get_transaction(&self, signature: &str) -> Result<Option<ConfirmedTransaction>> {
        let params = serde_json::json!([
            signature,
            {
                "encoding": "json",
                "commitment": "confirmed",
                "maxSupportedTransactionVersion": 0
            }
        ]);

        self.call("getTransaction", params).await
    }
}
