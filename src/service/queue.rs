//! Message Queue and Display Dispatcher
//!
//! Detected messages wait in an in-memory FIFO. The dispatcher pops one message
//! per interval and posts it to the sidewalk display. Delivery is best effort:
//! a message whose dispatch fails is dropped, never requeued.

use anyhow::{Context, Result};
use reqwest::Client;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::error::DonationError;

/// Unbounded FIFO of messages awaiting display. Cloning shares the queue.
#[derive(Debug, Clone, Default)]
pub struct MessageQueue {
    messages: Arc<RwLock<VecDeque<String>>>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message to the tail.
    pub async fn enqueue(&self, message: String) {
        let mut messages = self.messages.write().await;
        messages.push_back(message);
    }

    /// Removes and returns the head, if any.
    pub async fn pop_front(&self) -> Option<String> {
        let mut messages = self.messages.write().await;
        messages.pop_front()
    }

    /// Pending messages in display order.
    pub async fn snapshot(&self) -> Vec<String> {
        let messages = self.messages.read().await;
        messages.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }
}

/// Drains the message queue to the sidewalk display.
pub struct DisplayDispatcher {
    client: Client,
    display_url: String,
    queue: MessageQueue,
    interval: Duration,
}

impl DisplayDispatcher {
    /// Creates a dispatcher posting to `{display_url}/startshow`.
    ///
    /// # Arguments
    ///
    /// * `display_url` - Base URL of the display (e.g., "http://192.168.1.51:3456")
    /// * `queue` - Shared message queue
    /// * `interval` - Time between dispatches
    ///
    /// # Returns
    ///
    /// * `Ok(DisplayDispatcher)` - Successfully created dispatcher
    /// * `Err(anyhow::Error)` - Failed to create HTTP client
    pub fn new(display_url: &str, queue: MessageQueue, interval: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .no_proxy()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            display_url: display_url.trim_end_matches('/').to_string(),
            queue,
            interval,
        })
    }

    /// Shows a message on the display as a banner.
    pub async fn show_banner(&self, text: &str) -> Result<(), DonationError> {
        let url = format!("{}/startshow", self.display_url);
        let response = self
            .client
            .post(&url)
            .form(&[("show", "Banner"), ("banner", text), ("imgShow", "orangeDot")])
            .send()
            .await
            .map_err(|e| DonationError::DisplayDispatch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DonationError::DisplayDispatch(format!(
                "display returned HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Pops the head of the queue and dispatches it.
    ///
    /// # Returns
    ///
    /// * `None` - Queue was empty
    /// * `Some(Ok(()))` - Message displayed
    /// * `Some(Err(DonationError::DisplayDispatch))` - Message dropped after a failed dispatch
    pub async fn dispatch_next(&self) -> Option<Result<(), DonationError>> {
        let message = self.queue.pop_front().await?;
        let result = self.show_banner(&message).await;
        match &result {
            Ok(()) => info!("Sidewalk display changed to \"{}\"", message),
            Err(e) => error!("Dropping message \"{}\": {}", message, e),
        }
        Some(result)
    }

    /// Runs the dispatch loop forever, one message per interval.
    pub async fn run(&self) -> Result<()> {
        info!(
            "Display dispatcher started (interval {:?}, display {})",
            self.interval, self.display_url
        );

        loop {
            tokio::time::sleep(self.interval).await;
            self.dispatch_next().await;
        }
    }
}
