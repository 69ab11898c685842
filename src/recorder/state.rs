use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of the capture engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// No device held
    Idle,
    /// Waiting for the device
    Acquiring,
    /// Device held, preview live
    Ready,
    /// Encoder running, segments flowing
    Recording,
    /// Flushing the encoder and closing the session
    Stopping,
    /// Acquisition or encoding failed; retry with a fresh acquire
    Failed,
}

impl Default for RecordingState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Informational outcome of a capture operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CaptureStatus {
    Started { mime: String },
    AlreadyRecording,
    Stopped,
    /// The duration ceiling forced a stop
    CeilingReached { elapsed_secs: u64 },
    NotRecording,
    Archived { filename: String, size: u64 },
    ArchiveFailed { message: String },
}

/// One capture lifecycle, from `start` to `stop`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSession {
    pub stream_id: String,
    pub started_at: DateTime<Utc>,
    /// Whole seconds counted by the duration timer
    pub elapsed_secs: u64,
    pub max_duration_secs: u64,
    /// Negotiated container/codec type
    pub mime: String,
    /// Whether the header segment has gone out
    pub header_sent: bool,
    pub segments_emitted: u64,
    pub bytes_emitted: u64,
}

impl RecordingSession {
    pub fn new(stream_id: &str, mime: String, max_duration_secs: u64) -> Self {
        Self {
            stream_id: stream_id.to_string(),
            started_at: Utc::now(),
            elapsed_secs: 0,
            max_duration_secs,
            mime,
            header_sent: false,
            segments_emitted: 0,
            bytes_emitted: 0,
        }
    }

    pub fn ceiling_reached(&self) -> bool {
        self.elapsed_secs >= self.max_duration_secs
    }
}

/// Statistics about the capture engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderStats {
    pub state: RecordingState,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_secs: u64,
    pub segments_emitted: u64,
    pub bytes_emitted: u64,
    pub mime: Option<String>,
}
