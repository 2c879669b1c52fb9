//! Unit tests for the transaction detector
//!
//! The detector runs against a wiremock JSON-RPC server and a channel-backed log
//! subscriber, with a short poll interval.

use serde_json::json;
use std::time::Duration;
use wiremock::MockServer;
use yvr_sidewalk::service::extract_sidewalk_message;
use yvr_sidewalk::svm_client::ConfirmedTransaction;

#[path = "helpers.rs"]
mod helpers;
use helpers::{
    build_test_harness, dummy_pubkey, memo_transaction_json, mock_block_height, mock_transaction,
    wait_until, DUMMY_SIGNATURE,
};

const WAIT: Duration = Duration::from_secs(5);

fn confirmed(value: serde_json::Value) -> ConfirmedTransaction {
    serde_json::from_value(value).unwrap()
}

// ============================================================================
// CEILING TESTS
// ============================================================================

/// What is tested: Re-arming extends the ceiling but never shrinks it
/// Why: Overlapping donation requests must all stay covered until the last expires
#[tokio::test]
async fn test_ceiling_extends_and_never_shrinks() {
    let server = MockServer::start().await;
    mock_block_height(&server, 50).await;
    let harness = build_test_harness(&server.uri());
    let detector = &harness.detector;

    assert!(!detector.is_running());
    assert!(detector.arm(100), "first arm starts a run");
    assert_eq!(detector.ceiling(), Some(100));

    assert!(!detector.arm(80), "re-arm must not start a second run");
    assert_eq!(detector.ceiling(), Some(100));

    assert!(!detector.arm(150));
    assert_eq!(detector.ceiling(), Some(150));

    // Still running after several polls below the ceiling
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(detector.ceiling(), Some(150));
    assert_eq!(harness.subscriber.subscription_count(), 1);
}

/// What is tested: A block height equal to the ceiling keeps the run alive
/// Why: A transaction is still valid at its last valid block height
#[tokio::test]
async fn test_height_at_ceiling_keeps_running() {
    let server = MockServer::start().await;
    mock_block_height(&server, 100).await;
    let harness = build_test_harness(&server.uri());

    assert!(harness.detector.arm(100));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(harness.detector.ceiling(), Some(100));
    assert_eq!(harness.subscriber.open_subscriptions(), 1);
}

/// What is tested: A height past the first ceiling but below the extended one keeps the run alive
/// Why: Expiry is judged against the latest ceiling, not the one that started the run
#[tokio::test]
async fn test_height_between_ceilings_keeps_running() {
    let server = MockServer::start().await;
    mock_block_height(&server, 120).await;
    let harness = build_test_harness(&server.uri());

    assert!(harness.detector.arm(100));
    assert!(!harness.detector.arm(150));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(harness.detector.ceiling(), Some(150));
    assert_eq!(harness.subscriber.open_subscriptions(), 1);
}

// ============================================================================
// TERMINATION TESTS
// ============================================================================

/// What is tested: The run stops once the block height passes the ceiling
/// Why: No issued transaction can land after expiry, so the subscription is released
#[tokio::test]
async fn test_detector_stops_after_ceiling() {
    let server = MockServer::start().await;
    mock_block_height(&server, 200).await;
    let harness = build_test_harness(&server.uri());

    assert!(harness.detector.arm(100));
    assert!(wait_until(WAIT, || harness.subscriber.subscription_count() == 1).await);

    assert!(wait_until(WAIT, || !harness.detector.is_running()).await);
    assert_eq!(harness.detector.ceiling(), None);
    assert!(
        wait_until(WAIT, || harness.subscriber.open_subscriptions() == 0).await,
        "subscription must be aborted"
    );
}

/// What is tested: Arming after a run ended starts a fresh run
/// Why: An idle detector must not be extended, it must subscribe again
#[tokio::test]
async fn test_arm_after_stop_starts_fresh_run() {
    let server = MockServer::start().await;
    mock_block_height(&server, 200).await;
    let harness = build_test_harness(&server.uri());

    assert!(harness.detector.arm(100));
    assert!(wait_until(WAIT, || !harness.detector.is_running()).await);

    assert!(harness.detector.arm(300), "idle detector starts a new run");
    assert_eq!(harness.detector.ceiling(), Some(300));
    assert!(wait_until(WAIT, || harness.subscriber.subscription_count() == 2).await);
    assert!(wait_until(WAIT, || harness.subscriber.open_subscriptions() == 1).await);
}

/// What is tested: Block height failures keep the run alive
/// Why: A flaky RPC must not end detection early or reset the ceiling
#[tokio::test]
async fn test_block_height_errors_do_not_stop_run() {
    // No getBlockHeight mock: every poll fails with a 404
    let server = MockServer::start().await;
    let harness = build_test_harness(&server.uri());

    assert!(harness.detector.arm(100));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.detector.ceiling(), Some(100));
}

// ============================================================================
// MEMO DETECTION TESTS
// ============================================================================

/// What is tested: A notified transaction with a server-signed memo is queued
/// Why: This is how a paid donation reaches the display
#[tokio::test]
async fn test_detected_memo_is_enqueued() {
    let server = MockServer::start().await;
    mock_block_height(&server, 50).await;
    let harness = build_test_harness(&server.uri());
    mock_transaction(
        &server,
        memo_transaction_json("yvrsidewalk:Hello World", &harness.authority, None),
    )
    .await;

    harness.detector.arm(100);
    assert!(wait_until(WAIT, || harness.subscriber.open_subscriptions() == 1).await);
    harness.subscriber.notify(DUMMY_SIGNATURE);

    let deadline = tokio::time::Instant::now() + WAIT;
    while harness.queue.is_empty().await && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(harness.queue.snapshot().await, vec!["Hello World".to_string()]);
}

/// What is tested: process_signature() ignores memos without the sidewalk prefix
/// Why: Unrelated memos mentioning the authority must not reach the display
#[tokio::test]
async fn test_process_signature_ignores_unprefixed_memo() {
    let server = MockServer::start().await;
    let harness = build_test_harness(&server.uri());
    mock_transaction(&server, memo_transaction_json("gm", &harness.authority, None)).await;

    assert_eq!(harness.detector.process_signature(DUMMY_SIGNATURE).await, None);
    assert!(harness.queue.is_empty().await);
}

/// What is tested: process_signature() tolerates unknown signatures
/// Why: getTransaction returns null until the node has the transaction
#[tokio::test]
async fn test_process_signature_transaction_not_found() {
    let server = MockServer::start().await;
    let harness = build_test_harness(&server.uri());
    mock_transaction(&server, serde_json::Value::Null).await;

    assert_eq!(harness.detector.process_signature(DUMMY_SIGNATURE).await, None);
}

/// What is tested: extract_sidewalk_message() requires the authority on the memo
/// Why: Only memos co-signed by this server are attributable to it
#[test]
fn test_extract_requires_authority_signed_memo() {
    let authority = dummy_pubkey(9);
    let other = dummy_pubkey(10);

    let tx = confirmed(memo_transaction_json("yvrsidewalk:Hi", &authority, None));
    assert_eq!(extract_sidewalk_message(&tx, &authority), Some("Hi".to_string()));

    let tx = confirmed(memo_transaction_json("yvrsidewalk:Hi", &other, None));
    assert_eq!(extract_sidewalk_message(&tx, &authority), None);
}

/// What is tested: extract_sidewalk_message() skips failed transactions
/// Why: A failed transaction paid nothing
#[test]
fn test_extract_skips_failed_transaction() {
    let authority = dummy_pubkey(9);
    let err = json!({ "InstructionError": [0, { "Custom": 1 }] });
    let tx = confirmed(memo_transaction_json("yvrsidewalk:Hi", &authority, Some(err)));

    assert_eq!(extract_sidewalk_message(&tx, &authority), None);
}

/// What is tested: An empty message after the prefix is still a message
/// Why: Empty messages pass validation, so they can be paid for
#[test]
fn test_extract_empty_message() {
    let authority = dummy_pubkey(9);
    let tx = confirmed(memo_transaction_json("yvrsidewalk:", &authority, None));

    assert_eq!(extract_sidewalk_message(&tx, &authority), Some(String::new()));
}
