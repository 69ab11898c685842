use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use super::{subject, Envelope, StreamEvent, Subscription, Transport};
use crate::error::TransportError;

struct Subscriber {
    pattern: String,
    tx: mpsc::UnboundedSender<Envelope>,
}

/// In-process transport
///
/// Lossless and ordered per subscriber. Clones share the same hub, so a
/// producer, relay and viewers in one process can talk through it.
#[derive(Clone)]
pub struct MemoryTransport {
    open: Arc<AtomicBool>,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            open: Arc::new(AtomicBool::new(false)),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of live subscriptions matching `subject`
    pub async fn subscriber_count(&self, subject: &str) -> usize {
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|s| !s.tx.is_closed());
        subscribers
            .iter()
            .filter(|s| subject::matches(&s.pattern, subject))
            .count()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self) -> Result<(), TransportError> {
        if !self.open.swap(true, Ordering::SeqCst) {
            info!("In-memory transport opened");
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.open.swap(false, Ordering::SeqCst) {
            info!("In-memory transport closed");
            // Dropping the senders ends every subscription
            self.subscribers.lock().await.clear();
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn publish(&self, subject: &str, event: &StreamEvent) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }

        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|s| !s.tx.is_closed());

        for subscriber in subscribers.iter() {
            if subject::matches(&subscriber.pattern, subject) {
                let envelope = Envelope {
                    subject: subject.to_string(),
                    event: event.clone(),
                };
                // A receiver closed since the retain is simply skipped
                let _ = subscriber.tx.send(envelope);
            }
        }

        debug!("Published {} to {}", event.name(), subject);

        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<Subscription, TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().await.push(Subscriber {
            pattern: pattern.to_string(),
            tx,
        });

        debug!("Subscribed to {}", pattern);

        Ok(Subscription::new(pattern, rx, None))
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}
