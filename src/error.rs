//! Error taxonomy for the capture and playback pipeline
//!
//! Device and negotiation errors abort the current attempt. Append errors are
//! handled per chunk by the playback engine and never unwind a session.
//! Transport errors are surfaced while both engines keep their state.

use thiserror::Error;

/// Capture device acquisition or encoder failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("encoder failure: {0}")]
    Encoder(String),

    #[error("capture source not ready ({0})")]
    NotReady(String),

    #[error("capture device is held by an active session")]
    DeviceBusy,

    #[error("invalid recorder configuration: {0}")]
    Config(String),
}

/// No container/codec combination is supported on this side of the pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("no supported media type among {0:?}")]
    NoSupportedType(Vec<String>),
}

/// A sink rejected a specific append or remove operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppendError {
    /// Recoverable by evicting buffered media and retrying
    #[error("sink capacity exceeded ({needed} bytes needed, {available} available)")]
    CapacityExceeded { needed: usize, available: usize },

    /// The chunk is dropped and draining continues
    #[error("malformed or unexpected chunk: {0}")]
    Malformed(String),

    #[error("sink write failed: {0}")]
    Write(String),

    #[error("sink is closed")]
    Closed,

    #[error("sink is busy with another operation")]
    Busy,
}

/// Delivery or connection failure on the event transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("failed to publish to {subject}: {reason}")]
    Publish { subject: String, reason: String },

    #[error("failed to subscribe to {subject}: {reason}")]
    Subscribe { subject: String, reason: String },

    #[error("failed to encode or decode event: {0}")]
    Codec(String),

    #[error("transport is not open")]
    Closed,

    #[error("invalid stream id {0:?}: must be non-empty without '.', '*', '>' or whitespace")]
    InvalidStreamId(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Codec(err.to_string())
    }
}

impl From<base64::DecodeError> for TransportError {
    fn from(err: base64::DecodeError) -> Self {
        TransportError::Codec(err.to_string())
    }
}

/// Umbrella error for callers that drive a whole pipeline end
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error(transparent)]
    Append(#[from] AppendError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type StreamResult<T> = Result<T, StreamError>;
