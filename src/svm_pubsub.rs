//! Solana log subscription
//!
//! The detector consumes a stream of transaction signatures whose logs mention
//! the server authority. [`LogSubscriber`] is the seam; [`PubsubLogSubscriber`]
//! backs it with the PubSub websocket `logsSubscribe` method.

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::rpc_config::{RpcTransactionLogsConfig, RpcTransactionLogsFilter};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Stream of signatures of successful transactions mentioning an address.
pub type SignatureStream = BoxStream<'static, String>;

/// Opens log subscriptions filtered to transactions mentioning an address.
///
/// Dropping the returned stream ends the subscription.
pub trait LogSubscriber: Send + Sync {
    fn subscribe(&self, mentions: Pubkey) -> BoxFuture<'_, Result<SignatureStream>>;
}

/// Log subscriber backed by the Solana PubSub websocket.
pub struct PubsubLogSubscriber {
    ws_url: String,
}

impl PubsubLogSubscriber {
    pub fn new(ws_url: &str) -> Self {
        Self {
            ws_url: ws_url.to_string(),
        }
    }
}

impl LogSubscriber for PubsubLogSubscriber {
    fn subscribe(&self, mentions: Pubkey) -> BoxFuture<'_, Result<SignatureStream>> {
        let ws_url = self.ws_url.clone();
        async move {
            let (ready_tx, ready_rx) = oneshot::channel();
            let (signature_tx, signature_rx) = mpsc::unbounded_channel();

            // The websocket client must outlive the borrowed notification stream,
            // so both live in a forwarding task that owns them.
            tokio::spawn(forward_log_notifications(ws_url, mentions, ready_tx, signature_tx));

            ready_rx
                .await
                .context("Log subscription task exited before subscribing")??;

            let stream = futures::stream::unfold(signature_rx, |mut rx| async move {
                rx.recv().await.map(|signature| (signature, rx))
            });
            Ok(stream.boxed())
        }
        .boxed()
    }
}

/// Connects, subscribes, and forwards signatures until the receiver is dropped
/// or the websocket closes.
async fn forward_log_notifications(
    ws_url: String,
    mentions: Pubkey,
    ready: oneshot::Sender<Result<()>>,
    signatures: mpsc::UnboundedSender<String>,
) {
    let client = match PubsubClient::new(&ws_url).await {
        Ok(client) => client,
        Err(e) => {
            let _ = ready.send(Err(anyhow::anyhow!("Failed to connect to {}: {}", ws_url, e)));
            return;
        }
    };

    let (mut notifications, unsubscribe) = match client
        .logs_subscribe(
            RpcTransactionLogsFilter::Mentions(vec![mentions.to_string()]),
            RpcTransactionLogsConfig {
                commitment: Some(CommitmentConfig::confirmed()),
            },
        )
        .await
    {
        Ok(subscription) => subscription,
        Err(e) => {
            let _ = ready.send(Err(anyhow::anyhow!("logsSubscribe failed: {}", e)));
            return;
        }
    };

    if ready.send(Ok(())).is_err() {
        unsubscribe().await;
        return;
    }

    loop {
        tokio::select! {
            _ = signatures.closed() => {
                debug!("Log subscription for {} released", mentions);
                break;
            }
            notification = notifications.next() => match notification {
                Some(response) => {
                    if response.value.err.is_some() {
                        debug!("Skipping failed transaction {}", response.value.signature);
                        continue;
                    }
                    if signatures.send(response.value.signature).is_err() {
                        break;
                    }
                }
                None => {
                    warn!("Log subscription websocket closed for {}", mentions);
                    break;
                }
            },
        }
    }

    drop(notifications);
    unsubscribe().await;
    if let Err(e) = client.shutdown().await {
        debug!("PubSub client shutdown error: {}", e);
    }
}
