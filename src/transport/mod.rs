//! Event transport between producer, relay and viewers
//!
//! The transport is an explicitly constructed handle passed into each engine.
//! Delivery is ordered per subject for each subscriber; nothing is replayed
//! across reconnects.

pub mod client;
pub mod memory;
pub mod messages;
pub mod subject;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::TransportError;

pub use client::NatsTransport;
pub use memory::MemoryTransport;
pub use messages::{
    ChatMessage, LiveChunkMessage, OutcomeErrorMessage, RecordingSavedMessage, RoomMessage,
    SessionMarker, StreamEvent, VideoChunkMessage,
};

/// An event together with the concrete subject it was published on
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub subject: String,
    pub event: StreamEvent,
}

/// Named, bidirectional event channel
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect; idempotent
    async fn open(&self) -> Result<(), TransportError>;

    /// Disconnect; idempotent
    async fn close(&self) -> Result<(), TransportError>;

    fn is_open(&self) -> bool;

    async fn publish(&self, subject: &str, event: &StreamEvent) -> Result<(), TransportError>;

    /// Subscribe to a subject pattern (`*` and `>` wildcards allowed)
    async fn subscribe(&self, pattern: &str) -> Result<Subscription, TransportError>;

    /// Get transport name for logging
    fn name(&self) -> &str;
}

/// Live subscription; dropping it unsubscribes
pub struct Subscription {
    pattern: String,
    rx: mpsc::UnboundedReceiver<Envelope>,
    forwarder: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(
        pattern: impl Into<String>,
        rx: mpsc::UnboundedReceiver<Envelope>,
        forwarder: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            rx,
            forwarder,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Next event; `None` once the transport side has gone away
    pub async fn next(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Next event if one is already queued
    pub fn try_next(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }

    pub fn unsubscribe(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.rx.close();
        if let Some(task) = self.forwarder.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shutdown();
    }
}
