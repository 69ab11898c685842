use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::config::RecorderConfig;
use super::state::{CaptureStatus, RecorderStats, RecordingSession, RecordingState};
use crate::capture::{CaptureDevice, PreviewHandle};
use crate::error::{CaptureError, StreamResult, TransportError};
use crate::media::{negotiate, MediaChunk};
use crate::transport::{
    subject, SessionMarker, StreamEvent, Subscription, Transport, VideoChunkMessage,
};

/// What woke the driver loop
enum Wake {
    Segment(Option<Bytes>),
    Tick,
    Shutdown,
}

/// Producer side of the pipeline
///
/// Owns the capture device for its whole lifetime and publishes every
/// segment the encoder produces, in order, on `ingest.<stream_id>`.
pub struct CaptureEngine {
    config: RecorderConfig,
    stream_id: String,
    device: Box<dyn CaptureDevice>,
    transport: Arc<dyn Transport>,
    state: RecordingState,
    preview: Option<PreviewHandle>,
    session: Option<RecordingSession>,
    last_session: Option<RecordingSession>,
    segments: Option<mpsc::Receiver<Bytes>>,
    outcome: Option<Subscription>,
    failure: Option<CaptureError>,
}

impl CaptureEngine {
    pub fn new(
        config: RecorderConfig,
        stream_id: impl Into<String>,
        device: Box<dyn CaptureDevice>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            stream_id: stream_id.into(),
            device,
            transport,
            state: RecordingState::Idle,
            preview: None,
            session: None,
            last_session: None,
            segments: None,
            outcome: None,
            failure: None,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn preview(&self) -> Option<&PreviewHandle> {
        self.preview.as_ref()
    }

    /// The active session, if recording
    pub fn session(&self) -> Option<&RecordingSession> {
        self.session.as_ref()
    }

    /// Cause of the last transition to `Failed`
    pub fn failure(&self) -> Option<&CaptureError> {
        self.failure.as_ref()
    }

    /// Request the capture device and expose its preview
    pub async fn acquire_source(&mut self) -> Result<PreviewHandle, CaptureError> {
        match self.state {
            RecordingState::Idle | RecordingState::Failed => {}
            RecordingState::Ready => {
                if let Some(preview) = &self.preview {
                    return Ok(preview.clone());
                }
            }
            _ => return Err(CaptureError::DeviceBusy),
        }

        info!("Acquiring capture device: {}", self.device.name());

        self.state = RecordingState::Acquiring;
        self.failure = None;

        match self.device.acquire().await {
            Ok(preview) => {
                info!("Capture device ready: {}", preview.device_name);
                self.preview = Some(preview.clone());
                self.state = RecordingState::Ready;
                Ok(preview)
            }
            Err(e) => {
                error!("Capture device acquisition failed: {}", e);
                self.fail(e.clone()).await;
                Err(e)
            }
        }
    }

    /// Start recording
    pub async fn start(&mut self) -> StreamResult<CaptureStatus> {
        match self.state {
            RecordingState::Recording => {
                warn!("Recording already started");
                return Ok(CaptureStatus::AlreadyRecording);
            }
            RecordingState::Ready => {}
            other => {
                return Err(CaptureError::NotReady(format!("engine is {:?}", other)).into());
            }
        }

        self.config.validate()?;
        subject::validate_stream_id(&self.stream_id)?;

        let device = &self.device;
        let mime = negotiate(&self.config.mime_preferences, |m| device.is_type_supported(m))?;

        // Subscribed before anything is published so the outcome cannot be missed
        match self
            .transport
            .subscribe(&subject::outcome(&self.stream_id))
            .await
        {
            Ok(subscription) => self.outcome = Some(subscription),
            Err(e) => warn!("Archival outcome will not be reported: {}", e),
        }

        let segments = match self
            .device
            .start_encoder(&mime, self.config.timeslice())
            .await
        {
            Ok(segments) => segments,
            Err(e) => {
                error!("Failed to start encoder: {}", e);
                self.fail(e.clone()).await;
                return Err(e.into());
            }
        };

        info!(
            "Starting recording session: {} ({}, {}ms segments, {}s ceiling)",
            self.stream_id, mime, self.config.timeslice_ms, self.config.max_duration_secs
        );

        self.segments = Some(segments);
        self.session = Some(RecordingSession::new(
            &self.stream_id,
            mime.clone(),
            self.config.max_duration_secs,
        ));
        self.state = RecordingState::Recording;

        let marker = StreamEvent::RecordingStart(SessionMarker::now(&self.stream_id));
        if let Err(e) = self
            .transport
            .publish(&subject::ingest(&self.stream_id), &marker)
            .await
        {
            error!("Failed to signal recording start: {}", e);
        }

        Ok(CaptureStatus::Started { mime })
    }

    /// Publish one encoder segment
    ///
    /// The first segment of a session is tagged as the header. Segments that
    /// arrive after the session has ended are ignored.
    pub async fn on_segment(&mut self, data: Bytes) -> Result<(), TransportError> {
        if !matches!(
            self.state,
            RecordingState::Recording | RecordingState::Stopping
        ) {
            debug!("Ignoring segment outside of a recording session");
            return Ok(());
        }

        if data.is_empty() {
            return Ok(());
        }

        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };

        let chunk = MediaChunk::new(data, session.segments_emitted, !session.header_sent);
        session.header_sent = true;
        session.segments_emitted += 1;
        session.bytes_emitted += chunk.len() as u64;

        let event = StreamEvent::VideoChunk(VideoChunkMessage::from_chunk(&self.stream_id, &chunk));
        self.transport
            .publish(&subject::ingest(&self.stream_id), &event)
            .await?;

        debug!(
            "Published segment {} ({} bytes, header={})",
            chunk.sequence,
            chunk.len(),
            chunk.is_header
        );

        Ok(())
    }

    /// Advance the duration timer by one second
    ///
    /// Forces a stop once the ceiling is reached.
    pub async fn on_tick(&mut self) -> Option<CaptureStatus> {
        if self.state != RecordingState::Recording {
            return None;
        }

        let session = self.session.as_mut()?;
        session.elapsed_secs += 1;

        if !session.ceiling_reached() {
            return None;
        }

        let elapsed_secs = session.elapsed_secs;
        info!(
            "Duration ceiling reached for {} after {}s",
            self.stream_id, elapsed_secs
        );

        self.stop().await;
        Some(CaptureStatus::CeilingReached { elapsed_secs })
    }

    /// Stop recording; a no-op outside `Recording`
    pub async fn stop(&mut self) -> CaptureStatus {
        if self.state != RecordingState::Recording {
            debug!("Recording not active");
            return CaptureStatus::NotRecording;
        }

        info!("Stopping recording session: {}", self.stream_id);

        self.state = RecordingState::Stopping;

        let mut pending = Vec::new();
        if let Some(segments) = self.segments.as_mut() {
            while let Ok(segment) = segments.try_recv() {
                pending.push(segment);
            }
        }

        match self.device.flush().await {
            Ok(Some(tail)) => pending.push(tail),
            Ok(None) => {}
            Err(e) => warn!("Failed to flush encoder: {}", e),
        }

        for segment in pending {
            if let Err(e) = self.on_segment(segment).await {
                error!("Failed to publish final segment: {}", e);
            }
        }

        let marker = StreamEvent::RecordingStopped(SessionMarker::now(&self.stream_id));
        if let Err(e) = self
            .transport
            .publish(&subject::ingest(&self.stream_id), &marker)
            .await
        {
            error!("Failed to signal recording stop: {}", e);
        }

        self.release_device().await;
        self.state = RecordingState::Idle;

        info!("Recording session stopped successfully");

        CaptureStatus::Stopped
    }

    /// Release the capture device on any exit path
    ///
    /// Stops an active recording first. Safe to call repeatedly.
    pub async fn teardown(&mut self) {
        if self.state == RecordingState::Recording {
            self.stop().await;
        }

        self.release_device().await;

        if matches!(
            self.state,
            RecordingState::Ready | RecordingState::Acquiring
        ) {
            self.state = RecordingState::Idle;
        }
    }

    /// Drive the session: publish segments and tick the duration timer
    /// until the source ends, the ceiling is reached or `shutdown` resolves
    pub async fn run<F>(&mut self, shutdown: F) -> CaptureStatus
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        let status = loop {
            if self.state != RecordingState::Recording {
                break CaptureStatus::NotRecording;
            }

            let wake = tokio::select! {
                segment = next_segment(&mut self.segments) => Wake::Segment(segment),
                _ = ticker.tick() => Wake::Tick,
                _ = &mut shutdown => Wake::Shutdown,
            };

            match wake {
                Wake::Segment(Some(data)) => {
                    if let Err(e) = self.on_segment(data).await {
                        error!("Failed to publish segment: {}", e);
                    }
                }
                Wake::Segment(None) => {
                    info!("Capture source ended");
                    break self.stop().await;
                }
                Wake::Tick => {
                    if let Some(status) = self.on_tick().await {
                        break status;
                    }
                }
                Wake::Shutdown => break self.stop().await,
            }
        };

        self.teardown().await;
        status
    }

    /// Wait for the relay to report how archival went
    pub async fn await_outcome(&mut self, timeout: Duration) -> Option<CaptureStatus> {
        let mut subscription = self.outcome.take()?;

        let outcome = tokio::time::timeout(timeout, async {
            while let Some(envelope) = subscription.next().await {
                match envelope.event {
                    StreamEvent::RecordingSaved(saved) => {
                        info!("Recording saved on relay: {} ({} bytes)", saved.filename, saved.size);
                        return Some(CaptureStatus::Archived {
                            filename: saved.filename,
                            size: saved.size,
                        });
                    }
                    StreamEvent::RecordingError(failure)
                    | StreamEvent::CloudinaryFailed(failure) => {
                        warn!("Recording archival failed: {}", failure.message);
                        return Some(CaptureStatus::ArchiveFailed {
                            message: failure.message,
                        });
                    }
                    _ => continue,
                }
            }
            None
        })
        .await;

        outcome.ok().flatten()
    }

    pub fn stats(&self) -> RecorderStats {
        let session = self.session.as_ref().or(self.last_session.as_ref());

        RecorderStats {
            state: self.state,
            started_at: session.map(|s| s.started_at),
            elapsed_secs: session.map(|s| s.elapsed_secs).unwrap_or(0),
            segments_emitted: session.map(|s| s.segments_emitted).unwrap_or(0),
            bytes_emitted: session.map(|s| s.bytes_emitted).unwrap_or(0),
            mime: session.map(|s| s.mime.clone()),
        }
    }

    async fn fail(&mut self, err: CaptureError) {
        self.release_device().await;
        self.state = RecordingState::Failed;
        self.failure = Some(err);
    }

    async fn release_device(&mut self) {
        self.segments = None;
        self.preview = None;
        if let Some(session) = self.session.take() {
            self.last_session = Some(session);
        }
        self.device.release().await;
    }
}

async fn next_segment(segments: &mut Option<mpsc::Receiver<Bytes>>) -> Option<Bytes> {
    match segments {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
