use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use futures::stream::StreamExt;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use super::{Envelope, StreamEvent, Subscription, Transport};
use crate::error::TransportError;

/// NATS-backed transport
pub struct NatsTransport {
    url: String,
    client: RwLock<Option<async_nats::Client>>,
    connected: AtomicBool,
}

impl NatsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: RwLock::new(None),
            connected: AtomicBool::new(false),
        }
    }

    async fn client(&self) -> Result<async_nats::Client, TransportError> {
        self.client
            .read()
            .await
            .clone()
            .ok_or(TransportError::Closed)
    }
}

#[async_trait]
impl Transport for NatsTransport {
    async fn open(&self) -> Result<(), TransportError> {
        let mut client = self.client.write().await;
        if client.is_some() {
            return Ok(());
        }

        info!("Connecting to NATS at {}", self.url);

        let nats = async_nats::connect(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        info!("Connected to NATS successfully");

        *client = Some(nats);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        let client = self.client.write().await.take();
        self.connected.store(false, Ordering::SeqCst);

        if let Some(client) = client {
            info!("Closing NATS connection");
            // Push out anything still buffered; the connection closes on drop
            if let Err(e) = client.flush().await {
                warn!("Failed to flush NATS connection on close: {}", e);
            }
        }

        Ok(())
    }

    fn is_open(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish(&self, subject: &str, event: &StreamEvent) -> Result<(), TransportError> {
        let client = self.client().await?;
        let payload = event.encode()?;

        client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| TransportError::Publish {
                subject: subject.to_string(),
                reason: e.to_string(),
            })?;

        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<Subscription, TransportError> {
        let client = self.client().await?;

        info!("Subscribing to {}", pattern);

        let mut subscriber = client
            .subscribe(pattern.to_string())
            .await
            .map_err(|e| TransportError::Subscribe {
                subject: pattern.to_string(),
                reason: e.to_string(),
            })?;

        let (tx, rx) = mpsc::unbounded_channel();

        let forwarder = tokio::spawn(async move {
            while let Some(msg) = subscriber.next().await {
                match StreamEvent::decode(&msg.payload) {
                    Ok(event) => {
                        let envelope = Envelope {
                            subject: msg.subject.to_string(),
                            event,
                        };
                        if tx.send(envelope).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Failed to parse event on {}: {}", msg.subject, e);
                    }
                }
            }
        });

        Ok(Subscription::new(pattern, rx, Some(forwarder)))
    }

    fn name(&self) -> &str {
        "nats"
    }
}
