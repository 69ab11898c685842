//! Capture/segmentation engine
//!
//! This module provides the producer side of the pipeline:
//! - Capture device acquisition and teardown
//! - Container/codec negotiation for the segment encoder
//! - Header tagging and in-order segment publishing
//! - The per-second duration timer and its hard ceiling

mod config;
mod engine;
mod state;

pub use config::RecorderConfig;
pub use engine::CaptureEngine;
pub use state::{CaptureStatus, RecorderStats, RecordingSession, RecordingState};
