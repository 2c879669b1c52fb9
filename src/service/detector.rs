//! Transaction Detector Service
//!
//! Watches the chain for confirmed donation transactions and queues their messages.
//!
//! Flow:
//! 1. **Arm**: Each issued donation transaction arms the detector with its last valid
//!    block height. The first arm starts a run; later arms only raise the ceiling.
//! 2. **Subscribe**: A subscription task listens for transactions whose logs mention
//!    the server authority, fetches each one and extracts the sidewalk memo.
//! 3. **Expire**: A poll loop checks the block height. Once it passes the ceiling no
//!    issued transaction can still land, so the run stops and the detector goes idle.

use futures::StreamExt;
use solana_sdk::pubkey::Pubkey;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::service::queue::MessageQueue;
use crate::svm_client::{ConfirmedTransaction, SvmClient};
use crate::svm_pubsub::LogSubscriber;
use crate::transaction::{parse_sidewalk_memo, MEMO_PROGRAM_ID};

/// Ceiling shared by the arm path and the poll loop.
#[derive(Debug, Default)]
struct DetectorWindow {
    /// Highest last valid block height of any issued transaction (None while idle)
    ceiling: Option<u64>,
    /// Incremented on every idle -> running transition
    run: u64,
}

struct DetectorInner {
    rpc: Arc<SvmClient>,
    subscriber: Arc<dyn LogSubscriber>,
    authority: Pubkey,
    queue: MessageQueue,
    poll_interval: Duration,
    window: Mutex<DetectorWindow>,
}

impl DetectorInner {
    fn window(&self) -> MutexGuard<'_, DetectorWindow> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Self-terminating watcher for donation transactions. Cloning shares the detector.
#[derive(Clone)]
pub struct TransactionDetector {
    inner: Arc<DetectorInner>,
}

/// Ends a run: aborts the subscription and returns the detector to idle.
///
/// Runs on normal exit and when the run task is aborted or panics. A newer run
/// is never reset.
struct RunGuard {
    inner: Arc<DetectorInner>,
    run: u64,
    subscription: AbortHandle,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.subscription.abort();
        let mut window = self.inner.window();
        if window.run == self.run {
            window.ceiling = None;
        }
    }
}

impl TransactionDetector {
    /// Creates an idle detector.
    ///
    /// # Arguments
    ///
    /// * `rpc` - JSON-RPC client for block heights and transactions
    /// * `subscriber` - Log subscription source
    /// * `authority` - Server authority address that donation memos are signed by
    /// * `queue` - Queue receiving detected messages
    /// * `poll_interval` - Interval between block height polls
    pub fn new(
        rpc: Arc<SvmClient>,
        subscriber: Arc<dyn LogSubscriber>,
        authority: Pubkey,
        queue: MessageQueue,
        poll_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(DetectorInner {
                rpc,
                subscriber,
                authority,
                queue,
                poll_interval,
                window: Mutex::new(DetectorWindow::default()),
            }),
        }
    }

    /// Current ceiling block height, or None while idle.
    pub fn ceiling(&self) -> Option<u64> {
        self.inner.window().ceiling
    }

    pub fn is_running(&self) -> bool {
        self.ceiling().is_some()
    }

    /// Arms the detector for a transaction valid up to `last_valid_block_height`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Returns
    ///
    /// * `true` - Detector was idle and a new run was started
    /// * `false` - A run was active; its ceiling was raised if lower
    pub fn arm(&self, last_valid_block_height: u64) -> bool {
        let run = {
            let mut window = self.inner.window();
            if let Some(ceiling) = window.ceiling {
                let ceiling = ceiling.max(last_valid_block_height);
                window.ceiling = Some(ceiling);
                debug!("Detector extended to block height {}", ceiling);
                return false;
            }
            window.ceiling = Some(last_valid_block_height);
            window.run += 1;
            window.run
        };

        info!(
            "Detector armed for {} until block height {}",
            self.inner.authority, last_valid_block_height
        );
        tokio::spawn(self.clone().run_detection(run));
        true
    }

    async fn run_detection(self, run: u64) {
        let subscription = tokio::spawn(self.clone().subscription_loop());
        let _guard = RunGuard {
            inner: self.inner.clone(),
            run,
            subscription: subscription.abort_handle(),
        };

        self.poll_until_expired().await;
        info!("Detector stopped, no outstanding donation transactions");
    }

    /// Polls the block height until it passes the ceiling.
    async fn poll_until_expired(&self) {
        loop {
            tokio::time::sleep(self.inner.poll_interval).await;

            match self.inner.rpc.get_block_height().await {
                Ok(height) => {
                    if self.expire_if_past(height) {
                        return;
                    }
                }
                Err(e) => warn!("Failed to fetch block height: {:#}", e),
            }
        }
    }

    /// Resets the ceiling when `height` is past it. Returns whether the run is over.
    fn expire_if_past(&self, height: u64) -> bool {
        let mut window = self.inner.window();
        match window.ceiling {
            Some(ceiling) if height > ceiling => {
                debug!("Block height {} passed ceiling {}", height, ceiling);
                window.ceiling = None;
                true
            }
            Some(_) => false,
            None => true,
        }
    }

    /// Consumes log notifications until aborted, resubscribing when the stream fails.
    async fn subscription_loop(self) {
        loop {
            match self.inner.subscriber.subscribe(self.inner.authority).await {
                Ok(mut signatures) => {
                    debug!("Subscribed to logs mentioning {}", self.inner.authority);
                    while let Some(signature) = signatures.next().await {
                        self.process_signature(&signature).await;
                    }
                    warn!("Log subscription ended, resubscribing");
                }
                Err(e) => warn!("Failed to subscribe to logs: {:#}", e),
            }
            tokio::time::sleep(self.inner.poll_interval).await;
        }
    }

    /// Fetches a notified transaction and queues its sidewalk message, if any.
    ///
    /// # Returns
    ///
    /// * `Some(String)` - Message that was queued
    /// * `None` - Transaction missing, failed, unrelated, or the fetch errored
    pub async fn process_signature(&self, signature: &str) -> Option<String> {
        let transaction = match self.inner.rpc.get_transaction(signature).await {
            Ok(Some(transaction)) => transaction,
            Ok(None) => {
                debug!("Transaction {} not found", signature);
                return None;
            }
            Err(e) => {
                warn!("Failed to fetch transaction {}: {:#}", signature, e);
                return None;
            }
        };

        let message = extract_sidewalk_message(&transaction, &self.inner.authority)?;
        info!("Detected sidewalk message \"{}\" in {}", message, signature);
        self.inner.queue.enqueue(message.clone()).await;
        Some(message)
    }
}

/// Extracts the sidewalk message from a confirmed transaction.
///
/// Only successful transactions count, and only memo instructions that list the
/// server authority among their accounts (it must have signed them).
///
/// # Arguments
///
/// * `transaction` - Confirmed transaction from `getTransaction`
/// * `authority` - Server authority address
///
/// # Returns
///
/// * `Some(String)` - Message text with the prefix removed
/// * `None` - No matching memo
pub fn extract_sidewalk_message(
    transaction: &ConfirmedTransaction,
    authority: &Pubkey,
) -> Option<String> {
    if !transaction.succeeded() {
        return None;
    }

    let message = &transaction.transaction.message;
    let authority = authority.to_string();

    message.instructions.iter().find_map(|instruction| {
        if instruction.program_id(message) != Some(MEMO_PROGRAM_ID) {
            return None;
        }
        if !instruction
            .account_addresses(message)
            .any(|address| address == authority)
        {
            return None;
        }
        let data = instruction.decoded_data().ok()?;
        parse_sidewalk_memo(&data)
    })
}
