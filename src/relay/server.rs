use anyhow::{bail, Context, Result};
use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::archive::ArchiveStore;
use super::registry::StreamRegistry;
use crate::media::LiveChunk;
use crate::transport::{
    subject, Envelope, LiveChunkMessage, OutcomeErrorMessage, RecordingSavedMessage,
    StreamEvent, Transport,
};

/// Fans producer segments out to viewers and archives every session
pub struct Relay {
    transport: Arc<dyn Transport>,
    registry: StreamRegistry,
    archive: Arc<ArchiveStore>,
}

impl Relay {
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: StreamRegistry,
        archive: Arc<ArchiveStore>,
    ) -> Self {
        Self {
            transport,
            registry,
            archive,
        }
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    /// Serve producers and viewers until `shutdown` resolves
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut ingest = self
            .transport
            .subscribe(subject::INGEST_ALL)
            .await
            .context("Failed to subscribe to producers")?;
        let mut presence = self
            .transport
            .subscribe(subject::PRESENCE_ALL)
            .await
            .context("Failed to subscribe to viewers")?;

        info!("Relay running on {} transport", self.transport.name());

        loop {
            let envelope = tokio::select! {
                envelope = ingest.next() => envelope,
                envelope = presence.next() => envelope,
                _ = &mut shutdown => {
                    info!("Relay shutting down");
                    return Ok(());
                }
            };

            let Some(envelope) = envelope else {
                bail!("Transport subscription closed");
            };

            if let Err(e) = self.handle(envelope).await {
                error!("Failed to relay event: {:#}", e);
            }
        }
    }

    /// Handle one event from a producer or viewer
    pub async fn handle(&self, envelope: Envelope) -> Result<()> {
        let Some(stream_id) = subject::stream_id(&envelope.subject) else {
            bail!("Event on unscoped subject {}", envelope.subject);
        };
        let stream_id = stream_id.to_string();

        match envelope.event {
            StreamEvent::RecordingStart(_) => {
                self.registry.start(&stream_id).await;
                if let Err(e) = self.archive.begin(&stream_id).await {
                    warn!("Stream {} will not be archived: {:#}", stream_id, e);
                }
            }

            StreamEvent::VideoChunk(message) => {
                let chunk = message.to_chunk()?;
                let count = self.registry.append(&stream_id, chunk.data.clone()).await;

                if let Err(e) = self.archive.write(&stream_id, &chunk.data).await {
                    warn!("Failed to archive chunk {} of {}: {:#}", chunk.sequence, stream_id, e);
                }

                // Only the session's first chunk doubles as a bootstrap; viewers
                // joining later get the replay on join
                let complete_chunk = if count == 1 {
                    chunk.data.clone()
                } else {
                    Bytes::new()
                };
                let live = LiveChunk {
                    current_chunk: chunk.data,
                    complete_chunk,
                };
                self.fan_out(&stream_id, &live).await;

                debug!(
                    "Relayed chunk {} of {} ({} bytes)",
                    chunk.sequence,
                    stream_id,
                    live.current_chunk.len()
                );
            }

            StreamEvent::RecordingStopped(marker) => {
                self.registry.finish(&stream_id).await;

                if let Err(e) = self
                    .transport
                    .publish(&subject::room(&stream_id), &StreamEvent::RecordingStopped(marker))
                    .await
                {
                    warn!("Failed to tell viewers {} ended: {}", stream_id, e);
                }

                let outcome = match self.archive.finish(&stream_id).await {
                    Ok(saved) => StreamEvent::RecordingSaved(RecordingSavedMessage {
                        stream_id: stream_id.clone(),
                        filename: saved.filename,
                        size: saved.size,
                    }),
                    Err(e) => {
                        error!("Failed to save recording for {}: {:#}", stream_id, e);
                        StreamEvent::RecordingError(OutcomeErrorMessage {
                            stream_id: stream_id.clone(),
                            message: e.to_string(),
                        })
                    }
                };

                self.transport
                    .publish(&subject::outcome(&stream_id), &outcome)
                    .await
                    .context("Failed to report archival outcome")?;
            }

            StreamEvent::JoinRoom(_) => {
                self.registry.viewer_joined(&stream_id).await;

                if let Some(replay) = self.registry.replay(&stream_id).await {
                    debug!("Replaying {} bytes of {} to new viewer", replay.len(), stream_id);
                    let live = LiveChunk {
                        current_chunk: Bytes::new(),
                        complete_chunk: replay,
                    };
                    self.fan_out(&stream_id, &live).await;
                }
            }

            StreamEvent::LeaveRoom(_) => self.registry.viewer_left(&stream_id).await,

            other => debug!("Ignoring {} on {}", other.name(), envelope.subject),
        }

        Ok(())
    }

    async fn fan_out(&self, stream_id: &str, live: &LiveChunk) {
        let event =
            StreamEvent::LiveStreamVideoChunk(LiveChunkMessage::from_live_chunk(stream_id, live));
        if let Err(e) = self.transport.publish(&subject::room(stream_id), &event).await {
            warn!("Failed to fan out chunk of {}: {}", stream_id, e);
        }
    }
}
