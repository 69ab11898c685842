use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::config::PlaybackConfig;
use super::engine::{PlaybackEngine, PlaybackState, PlaybackStats};
use super::sink::{MediaSink, SinkEvent};
use crate::error::TransportError;
use crate::transport::{subject, Envelope, RoomMessage, StreamEvent, Subscription, Transport};

/// What woke the viewer loop
enum Wake {
    Transport(Option<Envelope>),
    Sink(Option<SinkEvent>),
    Shutdown,
}

/// A viewer attached to one live stream
///
/// Feeds relayed chunks and sink notifications into a `PlaybackEngine` from a
/// single task, so the engine never sees concurrent callbacks.
pub struct Viewer {
    stream_id: String,
    transport: Arc<dyn Transport>,
    engine: PlaybackEngine,
    sink_events: mpsc::UnboundedReceiver<SinkEvent>,
    subscription: Option<Subscription>,
}

impl Viewer {
    /// `sink_events` must be the receiving end of the channel the sink
    /// reports on
    pub fn new(
        config: PlaybackConfig,
        stream_id: impl Into<String>,
        transport: Arc<dyn Transport>,
        sink: Box<dyn MediaSink>,
        sink_events: mpsc::UnboundedReceiver<SinkEvent>,
    ) -> Self {
        let stream_id = stream_id.into();
        let engine = PlaybackEngine::new(config, &stream_id, sink);

        Self {
            stream_id,
            transport,
            engine,
            sink_events,
            subscription: None,
        }
    }

    pub fn engine(&self) -> &PlaybackEngine {
        &self.engine
    }

    pub fn stats(&self) -> PlaybackStats {
        self.engine.stats()
    }

    /// Open the sink and join the stream's room
    pub async fn attach(&mut self) -> Result<(), TransportError> {
        if self.engine.state() != PlaybackState::Unattached {
            return Ok(());
        }

        subject::validate_stream_id(&self.stream_id)?;
        self.engine.attach();

        let subscription = self
            .transport
            .subscribe(&subject::room(&self.stream_id))
            .await?;
        self.subscription = Some(subscription);

        let join = StreamEvent::JoinRoom(RoomMessage {
            stream_id: self.stream_id.clone(),
        });
        if let Err(e) = self
            .transport
            .publish(&subject::presence(&self.stream_id), &join)
            .await
        {
            warn!("Failed to announce viewer for {}: {}", self.stream_id, e);
        }

        info!("Viewer joined {}", self.stream_id);

        Ok(())
    }

    /// Handle everything already queued without waiting
    pub fn pump(&mut self) {
        while let Ok(event) = self.sink_events.try_recv() {
            self.engine.on_sink_event(event);
        }

        let mut envelopes = Vec::new();
        if let Some(subscription) = self.subscription.as_mut() {
            while let Some(envelope) = subscription.try_next() {
                envelopes.push(envelope);
            }
        }

        for envelope in envelopes {
            self.handle_envelope(envelope);
            while let Ok(event) = self.sink_events.try_recv() {
                self.engine.on_sink_event(event);
            }
        }
    }

    /// Process events until the stream ends, the sink closes, the transport
    /// goes away or `shutdown` resolves; detaches on every exit path
    pub async fn run<F>(&mut self, shutdown: F) -> PlaybackStats
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            if self.engine.state() == PlaybackState::Closed {
                break;
            }

            let wake = tokio::select! {
                envelope = next_envelope(&mut self.subscription) => Wake::Transport(envelope),
                event = self.sink_events.recv() => Wake::Sink(event),
                _ = &mut shutdown => Wake::Shutdown,
            };

            match wake {
                Wake::Transport(Some(envelope)) => {
                    if self.handle_envelope(envelope) {
                        break;
                    }
                }
                Wake::Transport(None) => {
                    self.engine.on_transport_error(TransportError::Closed);
                    break;
                }
                Wake::Sink(Some(event)) => self.engine.on_sink_event(event),
                Wake::Sink(None) => break,
                Wake::Shutdown => break,
            }
        }

        // Let the sink finish what is already in flight before closing
        self.pump();
        self.detach().await;
        self.engine.stats()
    }

    /// Returns true once the producer has ended the stream
    fn handle_envelope(&mut self, envelope: Envelope) -> bool {
        match envelope.event {
            StreamEvent::LiveStreamVideoChunk(message) => match message.to_live_chunk() {
                Ok(live) => self.engine.on_live_chunk(live),
                Err(e) => self.engine.on_transport_error(e),
            },
            StreamEvent::RecordingStopped(_) => {
                info!("Stream {} ended by producer", self.stream_id);
                return true;
            }
            other => debug!("Ignoring {} on {}", other.name(), envelope.subject),
        }
        false
    }

    /// Leave the room and release the sink; idempotent
    pub async fn detach(&mut self) {
        self.engine.detach();

        let Some(subscription) = self.subscription.take() else {
            return;
        };
        subscription.unsubscribe();

        let leave = StreamEvent::LeaveRoom(RoomMessage {
            stream_id: self.stream_id.clone(),
        });
        if let Err(e) = self
            .transport
            .publish(&subject::presence(&self.stream_id), &leave)
            .await
        {
            debug!("Failed to announce viewer leaving {}: {}", self.stream_id, e);
        }

        info!("Viewer left {}", self.stream_id);
    }
}

async fn next_envelope(subscription: &mut Option<Subscription>) -> Option<Envelope> {
    match subscription {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}
