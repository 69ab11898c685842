use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, error, info, warn};

use super::config::PlaybackConfig;
use super::sink::{MediaSink, SinkEvent};
use crate::error::{AppendError, NegotiationError, StreamError, TransportError};
use crate::media::{negotiate, LiveChunk, MediaChunk};

/// Lifecycle of a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Unattached,
    /// Waiting for the sink to open
    Opening,
    /// Sink idle, chunks may be appended
    Ready,
    /// One sink operation outstanding
    Draining,
    Closed,
}

/// One consumer's reassembly context
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub stream_id: String,
    pub state: PlaybackState,
    /// Pending chunks in producer emission order
    pub queue: VecDeque<MediaChunk>,
    pub header_applied: bool,
    /// Last applied header, kept so a replacement sink can be initialized
    pub header: Option<MediaChunk>,
    /// Type negotiated with the sink
    pub mime: Option<String>,
    /// Chunks received from the transport
    pub received: u64,
}

impl PlaybackSession {
    fn new(stream_id: &str) -> Self {
        Self {
            stream_id: stream_id.to_string(),
            state: PlaybackState::Unattached,
            queue: VecDeque::new(),
            header_applied: false,
            header: None,
            mime: None,
            received: 0,
        }
    }
}

/// Statistics about a playback session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackStats {
    pub state: PlaybackState,
    pub queued: usize,
    pub received: u64,
    pub appended: u64,
    pub dropped: u64,
    pub evictions: u64,
    pub transport_errors: u64,
    pub header_applied: bool,
    /// Waiting for playback to advance before eviction can free space
    pub stalled: bool,
}

/// The operation outstanding against the sink
#[derive(Debug)]
enum InFlight {
    Append { chunk: MediaChunk, as_header: bool },
    Remove { end: f64 },
}

/// Consumer side of the pipeline
///
/// Queues incoming chunks and drains them into the sink one operation at a
/// time. Draining is driven by the sink's completion events, never by a
/// loop waiting on the sink.
pub struct PlaybackEngine {
    config: PlaybackConfig,
    sink: Box<dyn MediaSink>,
    session: PlaybackSession,
    in_flight: Option<InFlight>,
    draining: bool,
    stalled: bool,
    last_eviction_end: Option<f64>,
    /// Current chunk that arrived with the bootstrap replay, by sequence
    bootstrap_fallback: Option<(u64, Bytes)>,
    appended: u64,
    dropped: u64,
    evictions: u64,
    transport_errors: u64,
    errors: Vec<StreamError>,
}

impl PlaybackEngine {
    pub fn new(config: PlaybackConfig, stream_id: &str, sink: Box<dyn MediaSink>) -> Self {
        Self {
            config,
            sink,
            session: PlaybackSession::new(stream_id),
            in_flight: None,
            draining: false,
            stalled: false,
            last_eviction_end: None,
            bootstrap_fallback: None,
            appended: 0,
            dropped: 0,
            evictions: 0,
            transport_errors: 0,
            errors: Vec::new(),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.session.state
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn sink(&self) -> &dyn MediaSink {
        self.sink.as_ref()
    }

    /// Whether an append or remove is outstanding
    pub fn has_operation_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Errors reported since the last call
    pub fn take_errors(&mut self) -> Vec<StreamError> {
        std::mem::take(&mut self.errors)
    }

    pub fn stats(&self) -> PlaybackStats {
        PlaybackStats {
            state: self.session.state,
            queued: self.session.queue.len(),
            received: self.session.received,
            appended: self.appended,
            dropped: self.dropped,
            evictions: self.evictions,
            transport_errors: self.transport_errors,
            header_applied: self.session.header_applied,
            stalled: self.stalled,
        }
    }

    /// Start opening the sink
    pub fn attach(&mut self) {
        if self.session.state != PlaybackState::Unattached {
            warn!("Playback for {} already attached", self.session.stream_id);
            return;
        }

        info!(
            "Attaching playback for {} ({} sink)",
            self.session.stream_id,
            self.sink.name()
        );

        self.session.state = PlaybackState::Opening;

        if let Err(e) = self.sink.open() {
            error!("Failed to open sink: {}", e);
            self.errors.push(e.into());
            self.close_session();
        }
    }

    pub fn on_sink_event(&mut self, event: SinkEvent) {
        match event {
            SinkEvent::SourceOpen => self.on_sink_open(),
            SinkEvent::UpdateEnd => self.on_operation_complete(),
            SinkEvent::Error(reason) => self.on_operation_failed(&reason),
            SinkEvent::TimeUpdate(_) => self.on_playback_advanced(),
            SinkEvent::SourceClosed => self.on_sink_closed(),
        }
    }

    /// Negotiate a type with the freshly opened sink
    pub fn on_sink_open(&mut self) {
        if self.session.state != PlaybackState::Opening {
            debug!("Ignoring sink open in state {:?}", self.session.state);
            return;
        }

        let sink = &self.sink;
        let mime = match negotiate(&self.config.mime_preferences, |m| sink.is_type_supported(m)) {
            Ok(mime) => mime,
            Err(e) => {
                error!("No playable media type for {}: {}", self.session.stream_id, e);
                self.errors.push(e.into());
                self.close_session();
                return;
            }
        };

        if let Err(e) = self.sink.add_source_buffer(&mime) {
            error!("Failed to bind sink to {}: {}", mime, e);
            self.errors
                .push(NegotiationError::NoSupportedType(vec![mime]).into());
            self.close_session();
            return;
        }

        info!("Sink ready for {} ({})", self.session.stream_id, mime);

        self.session.mime = Some(mime);
        self.session.state = PlaybackState::Ready;
        self.drain();
    }

    /// Queue a chunk and try to drain
    ///
    /// Chunks that arrive before the sink is ready wait in the queue; chunks
    /// that arrive after close are dropped.
    pub fn on_chunk(&mut self, chunk: MediaChunk) {
        if self.session.state == PlaybackState::Closed {
            debug!("Dropping chunk {} for closed session", chunk.sequence);
            return;
        }

        self.session.received += 1;
        self.session.queue.push_back(chunk);
        self.drain();
    }

    /// Queue a relayed live chunk
    ///
    /// A viewer with nothing applied and nothing queued bootstraps from the
    /// replay instead of the current chunk. Chunks without a replay are
    /// skipped until one arrives.
    pub fn on_live_chunk(&mut self, live: LiveChunk) {
        if self.session.state == PlaybackState::Closed {
            debug!("Dropping live chunk for closed session");
            return;
        }

        let bootstrap = self.session.queue.is_empty()
            && !self.session.header_applied
            && !self.header_in_flight();

        let data = if bootstrap {
            info!(
                "Bootstrapping {} from {} byte replay",
                self.session.stream_id,
                live.complete_chunk.len()
            );
            live.complete_chunk
        } else {
            live.current_chunk.clone()
        };

        if data.is_empty() {
            return;
        }

        let sequence = self.session.received;
        if bootstrap && !live.current_chunk.is_empty() {
            self.bootstrap_fallback = Some((sequence, live.current_chunk));
        }

        self.on_chunk(MediaChunk::new(data, sequence, bootstrap));
    }

    /// Move chunks from the queue into the sink
    ///
    /// Issues at most one operation; the sink's completion re-enters here.
    pub fn drain(&mut self) {
        if self.draining {
            return;
        }

        self.draining = true;
        self.drain_queue();
        self.draining = false;
    }

    fn drain_queue(&mut self) {
        while self.can_append() {
            let Some(chunk) = self.session.queue.pop_front() else {
                return;
            };

            let as_header = !self.session.header_applied;

            match self.sink.append(chunk.data.clone()) {
                Ok(()) => {
                    debug!(
                        "Appending chunk {} ({} bytes, header={})",
                        chunk.sequence,
                        chunk.len(),
                        as_header
                    );
                    self.in_flight = Some(InFlight::Append { chunk, as_header });
                    self.session.state = PlaybackState::Draining;
                    return;
                }
                Err(AppendError::CapacityExceeded { needed, available })
                    if self.sink.buffered().is_empty() =>
                {
                    // Nothing to evict: this chunk can never fit
                    self.reject_oversized(chunk, needed, available);
                }
                Err(AppendError::CapacityExceeded { needed, available }) => {
                    warn!(
                        "Sink full ({} bytes needed, {} available), evicting old media",
                        needed, available
                    );
                    self.session.queue.push_front(chunk);
                    self.evict();
                    return;
                }
                Err(e @ (AppendError::Busy | AppendError::Closed)) => {
                    debug!("Sink cannot accept chunk {} yet: {}", chunk.sequence, e);
                    self.session.queue.push_front(chunk);
                    return;
                }
                Err(e) => {
                    warn!("Dropping chunk {}: {}", chunk.sequence, e);
                    self.dropped += 1;
                    self.errors.push(e.into());
                }
            }
        }
    }

    /// Substitute the bootstrap's current chunk, or drop the chunk
    fn reject_oversized(&mut self, chunk: MediaChunk, needed: usize, available: usize) {
        if let Some((sequence, current)) = self.bootstrap_fallback.take() {
            if sequence == chunk.sequence && current.len() < chunk.len() {
                warn!(
                    "Replay of {} bytes exceeds sink capacity, starting from the current chunk",
                    chunk.len()
                );
                self.session
                    .queue
                    .push_front(MediaChunk::new(current, sequence, false));
                return;
            }
        }

        warn!(
            "Dropping chunk {}: {} bytes exceeds sink capacity",
            chunk.sequence,
            chunk.len()
        );
        self.dropped += 1;
        self.errors
            .push(AppendError::CapacityExceeded { needed, available }.into());
    }

    fn can_append(&self) -> bool {
        self.session.state == PlaybackState::Ready
            && self.in_flight.is_none()
            && !self.stalled
            && !self.sink.is_updating()
            && !self.session.queue.is_empty()
    }

    fn header_in_flight(&self) -> bool {
        matches!(
            self.in_flight,
            Some(InFlight::Append {
                as_header: true,
                ..
            })
        )
    }

    /// Reclaim sink space by removing media behind the trailing window
    fn evict(&mut self) {
        let remove_end = self.sink.current_time() - self.config.eviction_window_secs;
        let has_old_media = self
            .sink
            .buffered()
            .iter()
            .any(|range| range.start < remove_end);
        let progressed = self
            .last_eviction_end
            .map_or(true, |previous| remove_end > previous);

        if remove_end <= 0.0 || !has_old_media || !progressed {
            warn!(
                "Nothing older than {}s behind playback to evict; waiting for playback to advance",
                self.config.eviction_window_secs
            );
            self.stalled = true;
            return;
        }

        match self.sink.remove(0.0, remove_end) {
            Ok(()) => {
                info!("Evicting buffered media before {:.1}s", remove_end);
                self.evictions += 1;
                self.last_eviction_end = Some(remove_end);
                self.in_flight = Some(InFlight::Remove { end: remove_end });
                self.session.state = PlaybackState::Draining;
            }
            Err(e) => {
                warn!("Failed to evict buffered media: {}", e);
                self.stalled = true;
                self.errors.push(e.into());
            }
        }
    }

    /// The outstanding operation completed
    pub fn on_operation_complete(&mut self) {
        match self.in_flight.take() {
            Some(InFlight::Append { chunk, as_header }) => {
                if as_header || chunk.is_header {
                    if !self.session.header_applied {
                        info!("Header applied for {}", self.session.stream_id);
                    }
                    self.session.header_applied = true;
                    self.session.header = Some(chunk);
                    self.bootstrap_fallback = None;
                }
                self.appended += 1;
            }
            Some(InFlight::Remove { end }) => {
                debug!("Evicted media before {:.1}s", end);
            }
            None => {
                debug!("Sink completion with no outstanding operation");
            }
        }

        if self.session.state == PlaybackState::Draining {
            self.session.state = PlaybackState::Ready;
        }

        self.drain();
    }

    /// The outstanding operation failed after the sink accepted it
    pub fn on_operation_failed(&mut self, reason: &str) {
        match self.in_flight.take() {
            Some(InFlight::Append { chunk, .. }) => {
                warn!("Sink rejected chunk {}: {}", chunk.sequence, reason);
                self.dropped += 1;
                self.errors
                    .push(AppendError::Malformed(reason.to_string()).into());
            }
            Some(InFlight::Remove { end }) => {
                warn!("Failed to evict media before {:.1}s: {}", end, reason);
            }
            None => {
                warn!("Sink error: {}", reason);
            }
        }

        if self.session.state == PlaybackState::Draining {
            self.session.state = PlaybackState::Ready;
        }

        self.drain();
    }

    /// Playback moved forward; evicted space may now be reclaimable
    pub fn on_playback_advanced(&mut self) {
        if self.stalled {
            debug!("Playback advanced, retrying stalled drain");
            self.stalled = false;
        }
        self.drain();
    }

    /// The sink closed on its own; the session ends with it
    pub fn on_sink_closed(&mut self) {
        if self.session.state == PlaybackState::Closed {
            return;
        }

        warn!("Sink closed for {}", self.session.stream_id);
        self.session.state = PlaybackState::Closed;
        self.session.queue.clear();
        self.in_flight = None;
    }

    /// Delivery failed; queued chunks are kept so draining can resume
    pub fn on_transport_error(&mut self, err: TransportError) {
        warn!(
            "Transport error for {} ({} chunks queued): {}",
            self.session.stream_id,
            self.session.queue.len(),
            err
        );
        self.transport_errors += 1;
        self.errors.push(err.into());
    }

    /// Replace the sink, re-applying the retained header first
    pub fn reset_sink(&mut self, sink: Box<dyn MediaSink>) {
        if matches!(
            self.session.state,
            PlaybackState::Closed | PlaybackState::Unattached
        ) {
            warn!("Cannot reset sink in state {:?}", self.session.state);
            return;
        }

        info!("Resetting sink for {}", self.session.stream_id);

        // The old sink is dropped without notifying so none of its events
        // can be mistaken for the new sink's
        self.sink = sink;
        self.in_flight = None;
        self.stalled = false;
        self.last_eviction_end = None;
        self.session.header_applied = false;
        self.session.mime = None;

        if let Some(header) = self.session.header.clone() {
            self.session.queue.push_front(header);
        }

        self.session.state = PlaybackState::Opening;

        if let Err(e) = self.sink.open() {
            error!("Failed to open replacement sink: {}", e);
            self.errors.push(e.into());
            self.close_session();
        }
    }

    /// Close the session and release the sink; idempotent
    pub fn detach(&mut self) {
        if self.session.state == PlaybackState::Closed {
            return;
        }

        info!(
            "Detaching playback for {} ({} chunks appended, {} dropped)",
            self.session.stream_id, self.appended, self.dropped
        );

        self.close_session();
    }

    fn close_session(&mut self) {
        self.session.state = PlaybackState::Closed;
        self.session.queue.clear();
        self.in_flight = None;
        self.stalled = false;
        self.sink.close();
    }
}
