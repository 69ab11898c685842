use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::AppendError;

/// Lifecycle of a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Closed,
    Open,
    Ended,
}

/// Asynchronous notification from a sink
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    /// The sink finished opening and accepts a source buffer
    SourceOpen,
    /// The outstanding append or remove completed
    UpdateEnd,
    /// The outstanding operation failed after it was accepted
    Error(String),
    /// Playback position moved
    TimeUpdate(f64),
    /// The sink was closed or ended
    SourceClosed,
}

pub type SinkEventSender = mpsc::UnboundedSender<SinkEvent>;

/// Buffered time span in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Buffered-media destination
///
/// At most one append or remove may be outstanding. Each accepted operation
/// is followed by exactly one `UpdateEnd` (or `Error`) on the sink's event
/// channel.
pub trait MediaSink: Send {
    /// Begin opening; `SinkEvent::SourceOpen` follows
    fn open(&mut self) -> Result<(), AppendError>;

    fn ready_state(&self) -> ReadyState;

    fn is_type_supported(&self, mime: &str) -> bool;

    /// Bind the sink to a negotiated container/codec type
    fn add_source_buffer(&mut self, mime: &str) -> Result<(), AppendError>;

    /// Whether an operation is outstanding
    fn is_updating(&self) -> bool;

    fn append(&mut self, data: Bytes) -> Result<(), AppendError>;

    /// Remove buffered media in `[start, end)` seconds
    fn remove(&mut self, start: f64, end: f64) -> Result<(), AppendError>;

    fn buffered(&self) -> Vec<TimeRange>;

    /// Playback position in seconds
    fn current_time(&self) -> f64;

    /// Release the backing resource; `SinkEvent::SourceClosed` follows
    fn close(&mut self);

    /// Get sink name for logging
    fn name(&self) -> &str;
}
