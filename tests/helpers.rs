//! Shared test helpers for sidewalk tests
//!
//! This module provides constants, config builders, mock RPC responders and a
//! channel-backed log subscriber used across the integration tests.

#![allow(dead_code)]

use anyhow::Result;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use serde_json::json;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};
use yvr_sidewalk::config::{
    ServiceConfig, SidewalkConfig, SolanaConfig, TokenAddressConfig, TokensConfig,
};
use yvr_sidewalk::crypto::derive_server_authority;
use yvr_sidewalk::svm_pubsub::SignatureStream;
use yvr_sidewalk::transaction::MEMO_PROGRAM_ID;
use yvr_sidewalk::{
    DonationService, LogSubscriber, MessageQueue, PriceOracle, SvmClient, TokenRegistry,
    TransactionDetector,
};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Server secret used to derive the test server authority
pub const DUMMY_SERVER_SECRET: &str = "sidewalk-test-secret";

/// Last valid block height returned by the mocked getLatestBlockhash
pub const DUMMY_LAST_VALID_BLOCK_HEIGHT: u64 = 150;

/// Dummy transaction signature (base58)
pub const DUMMY_SIGNATURE: &str =
    "5VERv8NMvzbJMEkV8xnrLkEaWRtSz9CosKDYjCJjBRnbJLgp8uirBgmQpjKhoR4tjF3ZpRzrFmBV6UjKdiSZkQUW";

/// Short durations so tests do not wait on production timers
pub const TEST_POLL_INTERVAL: Duration = Duration::from_millis(20);
pub const TEST_PRICE_STALENESS: Duration = Duration::from_millis(200);

/// Dummy address derived from a single repeated byte.
pub fn dummy_pubkey(byte: u8) -> Pubkey {
    Pubkey::new_from_array([byte; 32])
}

pub fn dummy_treasury() -> Pubkey {
    dummy_pubkey(1)
}

pub fn dummy_payer() -> Pubkey {
    dummy_pubkey(2)
}

pub fn dummy_sol_oracle() -> Pubkey {
    dummy_pubkey(3)
}

pub fn dummy_bonk_oracle() -> Pubkey {
    dummy_pubkey(4)
}

pub fn dummy_bonk_mint() -> Pubkey {
    dummy_pubkey(5)
}

pub fn dummy_usdc_mint() -> Pubkey {
    dummy_pubkey(6)
}

pub fn dummy_blockhash() -> Hash {
    Hash::new_from_array([7u8; 32])
}

pub fn test_authority() -> Keypair {
    derive_server_authority(DUMMY_SERVER_SECRET).unwrap()
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Create a valid SidewalkConfig pointing at the given RPC and display URLs
pub fn build_test_config(rpc_url: &str, display_url: &str) -> SidewalkConfig {
    SidewalkConfig {
        service: ServiceConfig {
            api_host: "127.0.0.1".to_string(),
            api_port: 4000,
            cors_origins: vec!["*".to_string()],
            display_url: display_url.to_string(),
            dispatch_interval_ms: 60_000,
            detector_poll_interval_ms: TEST_POLL_INTERVAL.as_millis() as u64,
            price_staleness_ms: TEST_PRICE_STALENESS.as_millis() as u64,
        },
        solana: SolanaConfig {
            rpc_url: rpc_url.to_string(),
            ws_url: None,
            treasury_address: dummy_treasury().to_string(),
            server_secret_env: "SERVER_SECRET".to_string(),
        },
        tokens: TokensConfig {
            sol: TokenAddressConfig {
                oracle_address: Some(dummy_sol_oracle().to_string()),
                mint_address: None,
            },
            bonk: TokenAddressConfig {
                oracle_address: Some(dummy_bonk_oracle().to_string()),
                mint_address: Some(dummy_bonk_mint().to_string()),
            },
            usdc: TokenAddressConfig {
                oracle_address: None,
                mint_address: Some(dummy_usdc_mint().to_string()),
            },
        },
    }
}

pub fn build_test_registry() -> TokenRegistry {
    TokenRegistry::from_config(&build_test_config("http://127.0.0.1:8899", "http://127.0.0.1:3456").tokens)
        .unwrap()
}

/// Everything wired together against a mock RPC server
pub struct TestHarness {
    pub service: Arc<DonationService>,
    pub detector: TransactionDetector,
    pub queue: MessageQueue,
    pub subscriber: Arc<TestLogSubscriber>,
    pub authority: Pubkey,
}

/// Build a donation service, detector and queue against `rpc_url`
pub fn build_test_harness(rpc_url: &str) -> TestHarness {
    let registry = build_test_registry();
    let rpc = Arc::new(SvmClient::new(rpc_url).unwrap());
    let oracle = Arc::new(PriceOracle::new(rpc.clone(), &registry, TEST_PRICE_STALENESS));
    let authority = Arc::new(test_authority());
    let queue = MessageQueue::new();
    let subscriber = Arc::new(TestLogSubscriber::new());
    let detector = TransactionDetector::new(
        rpc.clone(),
        subscriber.clone(),
        authority.pubkey(),
        queue.clone(),
        TEST_POLL_INTERVAL,
    );
    let service = Arc::new(DonationService::new(
        rpc,
        oracle,
        registry,
        dummy_treasury(),
        authority.clone(),
        detector.clone(),
    ));

    TestHarness {
        service,
        detector,
        queue,
        subscriber,
        authority: authority.pubkey(),
    }
}

// ============================================================================
// PYTH ACCOUNT DATA
// ============================================================================

/// Build Pyth v2 price account bytes with the given aggregate price
///
/// Layout: header and exponent at offset 20, aggregate price at 208, status at 224.
pub fn pyth_price_account(price: i64, exponent: i32, status: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity(240);
    data.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes()); // magic
    data.extend_from_slice(&2u32.to_le_bytes()); // version
    data.extend_from_slice(&3u32.to_le_bytes()); // account type: price
    data.extend_from_slice(&3312u32.to_le_bytes()); // size
    data.extend_from_slice(&1u32.to_le_bytes()); // price type
    data.extend_from_slice(&exponent.to_le_bytes());
    data.resize(208, 0);
    data.extend_from_slice(&price.to_le_bytes());
    data.extend_from_slice(&0u64.to_le_bytes()); // confidence
    data.extend_from_slice(&status.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes()); // corporate action
    data.extend_from_slice(&0u64.to_le_bytes()); // publish slot
    data
}

// ============================================================================
// MOCK JSON-RPC RESPONDERS
// ============================================================================

fn rpc_result(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": result
    }))
}

/// Mock getAccountInfo to return `data` for any account
pub async fn mock_account_info(server: &MockServer, data: &[u8]) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "getAccountInfo" })))
        .respond_with(rpc_result(json!({
            "context": { "slot": 1 },
            "value": {
                "data": [STANDARD.encode(data), "base64"],
                "executable": false,
                "lamports": 1_000_000,
                "owner": "FsJ3A3u2vn5cTVofAjvy6y5kwABJAqYWpe4975bi2epH",
                "rentEpoch": 0
            }
        })))
        .mount(server)
        .await;
}

/// Mock getAccountInfo to return a SOL/USD price of $150 (price 15_000_000_000, expo -8)
pub async fn mock_sol_price(server: &MockServer) {
    mock_account_info(server, &pyth_price_account(15_000_000_000, -8, 1)).await;
}

/// Mock getLatestBlockhash
pub async fn mock_latest_blockhash(server: &MockServer) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "getLatestBlockhash" })))
        .respond_with(rpc_result(json!({
            "context": { "slot": 1 },
            "value": {
                "blockhash": dummy_blockhash().to_string(),
                "lastValidBlockHeight": DUMMY_LAST_VALID_BLOCK_HEIGHT
            }
        })))
        .mount(server)
        .await;
}

/// Mock getBlockHeight
pub async fn mock_block_height(server: &MockServer, height: u64) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "getBlockHeight" })))
        .respond_with(rpc_result(json!(height)))
        .mount(server)
        .await;
}

/// Mock getTransaction to return `transaction` for any signature
pub async fn mock_transaction(server: &MockServer, transaction: serde_json::Value) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "getTransaction" })))
        .respond_with(rpc_result(transaction))
        .mount(server)
        .await;
}

/// Confirmed transaction JSON (`json` encoding) with a payment and a memo instruction
///
/// Account keys: [payer, authority, treasury, system program, memo program].
pub fn memo_transaction_json(memo: &str, memo_signer: &Pubkey, err: Option<serde_json::Value>) -> serde_json::Value {
    let mut transfer_data = 2u32.to_le_bytes().to_vec();
    transfer_data.extend_from_slice(&1_000u64.to_le_bytes());

    json!({
        "slot": 42,
        "blockTime": 1_700_000_000,
        "meta": { "err": err, "fee": 5000 },
        "transaction": {
            "signatures": [DUMMY_SIGNATURE],
            "message": {
                "accountKeys": [
                    dummy_payer().to_string(),
                    memo_signer.to_string(),
                    dummy_treasury().to_string(),
                    "11111111111111111111111111111111",
                    MEMO_PROGRAM_ID
                ],
                "header": {
                    "numRequiredSignatures": 2,
                    "numReadonlySignedAccounts": 1,
                    "numReadonlyUnsignedAccounts": 2
                },
                "recentBlockhash": dummy_blockhash().to_string(),
                "instructions": [
                    {
                        "programIdIndex": 3,
                        "accounts": [0, 2],
                        "data": bs58::encode(&transfer_data).into_string(),
                        "stackHeight": null
                    },
                    {
                        "programIdIndex": 4,
                        "accounts": [1],
                        "data": bs58::encode(memo.as_bytes()).into_string(),
                        "stackHeight": null
                    }
                ]
            }
        }
    })
}

// ============================================================================
// LOG SUBSCRIBER
// ============================================================================

/// Log subscriber fed by the test through [`TestLogSubscriber::notify`]
pub struct TestLogSubscriber {
    senders: Mutex<Vec<mpsc::UnboundedSender<String>>>,
    subscriptions: AtomicUsize,
}

impl TestLogSubscriber {
    pub fn new() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
            subscriptions: AtomicUsize::new(0),
        }
    }

    /// Number of subscriptions opened so far
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    /// Number of subscriptions whose stream is still held by the detector
    pub fn open_subscriptions(&self) -> usize {
        self.senders
            .lock()
            .unwrap()
            .iter()
            .filter(|sender| !sender.is_closed())
            .count()
    }

    /// Deliver a signature to every open subscription
    pub fn notify(&self, signature: &str) {
        for sender in self.senders.lock().unwrap().iter() {
            let _ = sender.send(signature.to_string());
        }
    }
}

impl LogSubscriber for TestLogSubscriber {
    fn subscribe(&self, _mentions: Pubkey) -> BoxFuture<'_, Result<SignatureStream>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.senders.lock().unwrap().push(sender);
        self.subscriptions.fetch_add(1, Ordering::SeqCst);

        let stream = futures::stream::unfold(receiver, |mut rx| async move {
            rx.recv().await.map(|signature| (signature, rx))
        });
        async move { Ok(stream.boxed()) }.boxed()
    }
}

// ============================================================================
// WAITING
// ============================================================================

/// Poll `condition` every 10ms until it holds or `timeout` elapses
pub async fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

pub fn parse_pubkey(value: &str) -> Pubkey {
    Pubkey::from_str(value).unwrap()
}
