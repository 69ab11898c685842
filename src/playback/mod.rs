//! Playback reassembly engine
//!
//! This module provides the consumer side of the pipeline:
//! - The `MediaSink` abstraction over a buffered-media destination
//! - A pending-chunk queue drained into the sink one operation at a time
//! - Header precedence, capacity eviction and drop-and-continue recovery
//! - `Viewer`, which wires the engine to a transport subscription

mod config;
mod engine;
pub mod file;
pub mod memory;
pub mod sink;
mod viewer;

pub use config::PlaybackConfig;
pub use engine::{PlaybackEngine, PlaybackSession, PlaybackState, PlaybackStats};
pub use file::FileSink;
pub use memory::{MemorySink, MemorySinkConfig};
pub use sink::{MediaSink, ReadyState, SinkEvent, SinkEventSender, TimeRange};
pub use viewer::Viewer;
