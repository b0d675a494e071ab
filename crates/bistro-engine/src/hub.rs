//! # Realtime Stock Hub
//!
//! In-process fan-out of [`StockChangeEvent`]s to dashboards and tills.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stock Hub                                        │
//! │                                                                         │
//! │  engine (after commit) ──► publish(event)                              │
//! │                                 │                                       │
//! │                  ┌──────────────┼──────────────┐                       │
//! │                  ▼              ▼              ▼     try_send, never    │
//! │           ┌────────────┐ ┌────────────┐ ┌────────────┐  waits         │
//! │           │ dashboard  │ │  till-2    │ │  kiosk     │                 │
//! │           │ [■■■□□□□]  │ │ [■■■■■■■]  │ │ [closed]   │                 │
//! │           └────────────┘ └─────┬──────┘ └─────┬──────┘                 │
//! │                                │              │                         │
//! │                          full: event    receiver gone:                  │
//! │                          dropped for    pruned from                     │
//! │                          till-2 only    the registry                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The registry holds the only sender of each subscription. Removing the
//! entry drops the sender, which ends the subscriber's stream exactly once.

use bistro_core::StockChangeEvent;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

/// Receive-only stream handed to a subscriber.
pub type StockStream = ReceiverStream<StockChangeEvent>;

/// Default per-subscriber buffer.
pub const DEFAULT_HUB_BUFFER: usize = 64;

// =============================================================================
// Subscriber
// =============================================================================

#[derive(Debug)]
struct Subscriber {
    tx: mpsc::Sender<StockChangeEvent>,
    /// Events discarded because the buffer was full.
    dropped: AtomicU64,
}

// =============================================================================
// Stock Hub
// =============================================================================

/// Non-blocking pub/sub registry for stock changes.
#[derive(Debug)]
pub struct StockHub {
    subscribers: RwLock<HashMap<String, Subscriber>>,
    buffer: usize,
}

impl Default for StockHub {
    fn default() -> Self {
        Self::new(DEFAULT_HUB_BUFFER)
    }
}

impl StockHub {
    /// Creates a hub whose subscribers buffer up to `buffer` events.
    pub fn new(buffer: usize) -> Self {
        StockHub {
            subscribers: RwLock::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    /// Registers `subscriber_id` and returns its event stream.
    ///
    /// Subscribing again with the same id replaces the previous
    /// subscription; the old stream ends.
    pub async fn subscribe(&self, subscriber_id: impl Into<String>) -> StockStream {
        let subscriber_id = subscriber_id.into();
        let (tx, rx) = mpsc::channel(self.buffer);

        let previous = self.subscribers.write().await.insert(
            subscriber_id.clone(),
            Subscriber {
                tx,
                dropped: AtomicU64::new(0),
            },
        );

        if previous.is_some() {
            info!(subscriber_id = %subscriber_id, "Stock subscriber replaced");
        } else {
            info!(subscriber_id = %subscriber_id, "Stock subscriber added");
        }

        ReceiverStream::new(rx)
    }

    /// Removes a subscriber and ends its stream.
    ///
    /// ## Returns
    /// `false` if no such subscriber was registered.
    pub async fn unsubscribe(&self, subscriber_id: &str) -> bool {
        let removed = self.subscribers.write().await.remove(subscriber_id);

        match removed {
            Some(subscriber) => {
                info!(
                    subscriber_id = %subscriber_id,
                    dropped = subscriber.dropped.load(Ordering::Relaxed),
                    "Stock subscriber removed"
                );
                true
            }
            None => false,
        }
    }

    /// Offers `event` to every subscriber without waiting.
    pub async fn publish(&self, event: &StockChangeEvent) {
        let mut closed = Vec::new();

        {
            let subscribers = self.subscribers.read().await;
            for (id, subscriber) in subscribers.iter() {
                match subscriber.tx.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        let dropped = subscriber.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        warn!(
                            subscriber_id = %id,
                            product_id = %event.product_id,
                            dropped,
                            "Stock subscriber lagging, event dropped"
                        );
                    }
                    Err(TrySendError::Closed(_)) => closed.push(id.clone()),
                }
            }
        }

        if !closed.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for id in closed {
                // The id may have been re-subscribed in the meantime
                if subscribers.get(&id).is_some_and(|s| s.tx.is_closed()) {
                    subscribers.remove(&id);
                    debug!(subscriber_id = %id, "Pruned closed stock subscriber");
                }
            }
        }
    }

    /// Publishes a batch of events in order.
    pub async fn publish_all(&self, events: &[StockChangeEvent]) {
        for event in events {
            self.publish(event).await;
        }
    }

    /// Number of registered subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Events dropped for a subscriber so far, if it is registered.
    pub async fn dropped_events(&self, subscriber_id: &str) -> Option<u64> {
        self.subscribers
            .read()
            .await
            .get(subscriber_id)
            .map(|s| s.dropped.load(Ordering::Relaxed))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
