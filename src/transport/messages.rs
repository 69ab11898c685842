use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::media::{LiveChunk, MediaChunk};

/// Every event exchanged between producer, relay and viewers
///
/// Serialized as JSON with the event name in the `event` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum StreamEvent {
    #[serde(rename = "recording-start")]
    RecordingStart(SessionMarker),

    #[serde(rename = "video-chunk")]
    VideoChunk(VideoChunkMessage),

    #[serde(rename = "recording-stopped")]
    RecordingStopped(SessionMarker),

    #[serde(rename = "recording-saved")]
    RecordingSaved(RecordingSavedMessage),

    #[serde(rename = "recording-error")]
    RecordingError(OutcomeErrorMessage),

    #[serde(rename = "cloudinary-failed")]
    CloudinaryFailed(OutcomeErrorMessage),

    #[serde(rename = "join-room")]
    JoinRoom(RoomMessage),

    #[serde(rename = "leave-room")]
    LeaveRoom(RoomMessage),

    #[serde(rename = "live-stream-video-chunk")]
    LiveStreamVideoChunk(LiveChunkMessage),

    #[serde(rename = "stream-chat")]
    StreamChat(ChatMessage),
}

impl StreamEvent {
    /// Event name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::RecordingStart(_) => "recording-start",
            StreamEvent::VideoChunk(_) => "video-chunk",
            StreamEvent::RecordingStopped(_) => "recording-stopped",
            StreamEvent::RecordingSaved(_) => "recording-saved",
            StreamEvent::RecordingError(_) => "recording-error",
            StreamEvent::CloudinaryFailed(_) => "cloudinary-failed",
            StreamEvent::JoinRoom(_) => "join-room",
            StreamEvent::LeaveRoom(_) => "leave-room",
            StreamEvent::LiveStreamVideoChunk(_) => "live-stream-video-chunk",
            StreamEvent::StreamChat(_) => "stream-chat",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, TransportError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Session begin/end marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMarker {
    pub stream_id: String,
    pub timestamp: String, // RFC3339 timestamp
}

impl SessionMarker {
    pub fn now(stream_id: &str) -> Self {
        Self {
            stream_id: stream_id.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// One media segment from the producer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoChunkMessage {
    pub stream_id: String,
    pub sequence: u64,
    pub is_header: bool,
    pub data: String, // Base64-encoded segment bytes
}

impl VideoChunkMessage {
    pub fn from_chunk(stream_id: &str, chunk: &MediaChunk) -> Self {
        Self {
            stream_id: stream_id.to_string(),
            sequence: chunk.sequence,
            is_header: chunk.is_header,
            data: base64::engine::general_purpose::STANDARD.encode(&chunk.data),
        }
    }

    pub fn to_chunk(&self) -> Result<MediaChunk, TransportError> {
        let data = base64::engine::general_purpose::STANDARD.decode(&self.data)?;
        Ok(MediaChunk::new(data, self.sequence, self.is_header))
    }
}

/// Archival succeeded on the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSavedMessage {
    pub stream_id: String,
    pub filename: String,
    pub size: u64,
}

/// Archival or upload failed on the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeErrorMessage {
    pub stream_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMessage {
    pub stream_id: String,
}

/// Segment fanned out to viewers, with the cumulative replay buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveChunkMessage {
    pub stream_id: String,
    pub current_chunk: String,  // Base64
    pub complete_chunk: String, // Base64
}

impl LiveChunkMessage {
    pub fn from_live_chunk(stream_id: &str, chunk: &LiveChunk) -> Self {
        let engine = base64::engine::general_purpose::STANDARD;
        Self {
            stream_id: stream_id.to_string(),
            current_chunk: engine.encode(&chunk.current_chunk),
            complete_chunk: engine.encode(&chunk.complete_chunk),
        }
    }

    pub fn to_live_chunk(&self) -> Result<LiveChunk, TransportError> {
        let engine = base64::engine::general_purpose::STANDARD;
        Ok(LiveChunk {
            current_chunk: engine.decode(&self.current_chunk)?.into(),
            complete_chunk: engine.decode(&self.complete_chunk)?.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub stream_id: String,
    pub message: String,
}
